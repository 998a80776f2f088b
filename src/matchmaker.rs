use std::collections::HashMap;

use rand::Rng;
use tracing::debug;

use crate::game::room::{launch_room, Seat};
use crate::server::session::Session;
use crate::state::SharedState;

/// Append a peer to the matchmaking queue. Returns the queue length
/// after the append, or None if the peer was already waiting.
pub async fn enqueue(state: &SharedState, session_id: &str) -> Option<usize> {
    let mut queue = state.queue.lock().await;
    if queue.iter().any(|q| q == session_id) {
        return None;
    }
    queue.push_back(session_id.to_string());
    Some(queue.len())
}

pub async fn remove(state: &SharedState, session_id: &str) {
    state.queue.lock().await.retain(|q| q != session_id);
}

/// Pair the two oldest queued peers while at least two are waiting.
/// Entries whose session vanished or acquired a room are discarded; a
/// surviving candidate returns to the queue head. The queue lock is
/// released before a room is constructed.
pub async fn try_pair(state: &SharedState) {
    loop {
        let (a, b) = {
            let mut queue = state.queue.lock().await;
            if queue.len() < 2 {
                return;
            }
            match (queue.pop_front(), queue.pop_front()) {
                (Some(a), Some(b)) => (a, b),
                _ => return,
            }
        };

        let (seat_a, seat_b) = {
            let sessions = state.sessions.lock().await;
            (seat_for(&sessions, &a), seat_for(&sessions, &b))
        };

        match (seat_a, seat_b) {
            (Some(sa), Some(sb)) => {
                // Initial matches assign sides by coin flip.
                let (top, bottom) = if rand::thread_rng().gen_bool(0.5) {
                    (sa, sb)
                } else {
                    (sb, sa)
                };
                launch_room(state, top, bottom).await;
            }
            (Some(_), None) => state.queue.lock().await.push_front(a),
            (None, Some(_)) => state.queue.lock().await.push_front(b),
            (None, None) => debug!("discarded two stale queue entries"),
        }
    }
}

fn seat_for(sessions: &HashMap<String, Session>, id: &str) -> Option<Seat> {
    let s = sessions.get(id)?;
    if s.in_room() {
        return None;
    }
    Some(Seat {
        session_id: s.id.clone(),
        name: s.name.clone(),
        tx: s.tx.clone(),
    })
}
