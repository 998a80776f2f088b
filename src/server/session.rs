use axum::extract::ws::Message;
use rand::Rng;
use tokio::sync::mpsc;

use crate::config::MAX_NAME_LEN;
use crate::protocol::messages::{ServerMessage, Side};

/// Outbound channel to a peer. Sends are best-effort; a closed channel
/// means the connection is gone and the frame is dropped.
pub type Tx = mpsc::UnboundedSender<Message>;

/// Per-peer record, created on connect and destroyed on disconnect.
pub struct Session {
    pub id: String,
    pub name: String,
    pub tx: Tx,
    /// Room registry key while matched.
    pub room: Option<String>,
    pub side: Option<Side>,
    /// Cleared by the keep-alive sweep, restored by pong.
    pub alive: bool,
}

impl Session {
    pub fn new(id: String, tx: Tx) -> Self {
        Session {
            id,
            name: "Player".to_string(),
            tx,
            room: None,
            side: None,
            alive: true,
        }
    }

    pub fn in_room(&self) -> bool {
        self.room.is_some()
    }
}

pub fn new_id() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

/// Serialize a frame onto a peer's outbound channel. Best-effort: a
/// closed channel means the peer is gone and the frame is dropped.
pub fn send(tx: &Tx, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let _ = tx.send(Message::Text(json.into()));
    }
}

/// Trim, cap at 16 characters, strip C0 controls and DEL; fall back to
/// "Player" when nothing printable remains.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .take(MAX_NAME_LEN)
        .filter(|c| !matches!(c, '\u{0000}'..='\u{001f}' | '\u{007f}'))
        .collect();
    if cleaned.is_empty() {
        "Player".to_string()
    } else {
        cleaned
    }
}
