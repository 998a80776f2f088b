use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::game::room::Room;
use crate::server::session::Session;

/// Process-wide registries. Each map has its own lock; room state has its
/// own finer lock inside `Room`. None of these locks is ever held across
/// socket I/O.
pub struct AppState {
    /// Peer id -> session.
    pub sessions: Mutex<HashMap<String, Session>>,
    /// Room id -> live room.
    pub rooms: Mutex<HashMap<String, Arc<Room>>>,
    /// FIFO of peer ids waiting for a match.
    pub queue: Mutex<VecDeque<String>>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            sessions: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedState = Arc<AppState>;
