use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{COUNTDOWN_SECS, KEEPALIVE_INTERVAL_SECS};
use crate::game::room::{launch_room, RematchVote};
use crate::matchmaker;
use crate::protocol::messages::{ClientMessage, ServerMessage, KNOWN_TYPES};
use crate::server::session::{self, Session};
use crate::state::SharedState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = session::new_id();

    state
        .sessions
        .lock()
        .await
        .insert(id.clone(), Session::new(id.clone(), tx.clone()));
    session::send(&tx, &ServerMessage::Hello { id: id.clone() });
    info!(peer = %id, "peer connected");

    // Forward outbound frames from the channel to the socket. A Close
    // frame ends the connection once it has been flushed.
    let mut forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    // Receive inbound frames and dispatch them in arrival order.
    let recv_state = state.clone();
    let recv_id = id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => dispatch(&recv_state, &recv_id, &text).await,
                Message::Pong(_) => {
                    if let Some(s) = recv_state.sessions.lock().await.get_mut(&recv_id) {
                        s.alive = true;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half finishes first tears down the other.
    tokio::select! {
        _ = &mut forward_task => recv_task.abort(),
        _ = &mut recv_task => forward_task.abort(),
    }

    disconnect(&state, &id).await;
    info!(peer = %id, "peer disconnected");
}

/// Parse one inbound text frame. Malformed frames are dropped; an
/// unrecognized `type` earns an error reply.
async fn dispatch(state: &SharedState, id: &str, raw: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return;
    };
    if !value.is_object() {
        return;
    }
    match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(msg) => handle_message(state, id, msg).await,
        Err(_) => {
            let known = value
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| KNOWN_TYPES.contains(&t))
                .unwrap_or(false);
            if !known {
                reply(
                    state,
                    id,
                    &ServerMessage::Error {
                        message: "Unknown message type".to_string(),
                    },
                )
                .await;
            }
        }
    }
}

async fn handle_message(state: &SharedState, id: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinQueue { name } => {
            {
                let mut sessions = state.sessions.lock().await;
                let Some(s) = sessions.get_mut(id) else { return };
                if let Some(name) = name {
                    s.name = session::sanitize_name(&name);
                }
                if s.in_room() {
                    return;
                }
            }
            if let Some(queue_size) = matchmaker::enqueue(state, id).await {
                debug!(peer = %id, queue_size, "queued for a match");
                reply(state, id, &ServerMessage::Finding { queue_size }).await;
                matchmaker::try_pair(state).await;
            }
        }
        ClientMessage::CancelQueue => {
            matchmaker::remove(state, id).await;
            reply(state, id, &ServerMessage::QueueCancelled).await;
        }
        ClientMessage::Paddle { x } => {
            let Some((room_id, side)) = assignment_of(state, id).await else {
                return;
            };
            let room = state.rooms.lock().await.get(&room_id).cloned();
            if let Some(room) = room {
                room.state.lock().await.set_paddle(side, x);
            }
        }
        ClientMessage::RematchRequest => handle_rematch(state, id).await,
        ClientMessage::LeaveRoom => leave_current_room(state, id).await,
    }
}

async fn reply(state: &SharedState, id: &str, msg: &ServerMessage) {
    if let Some(s) = state.sessions.lock().await.get(id) {
        session::send(&s.tx, msg);
    }
}

async fn assignment_of(state: &SharedState, id: &str) -> Option<(String, crate::protocol::messages::Side)> {
    let sessions = state.sessions.lock().await;
    sessions.get(id).and_then(|s| s.room.clone().zip(s.side))
}

/// Record a rematch vote; when both sides agree, start the successor
/// room with swapped sides and retire this one.
async fn handle_rematch(state: &SharedState, id: &str) {
    let Some((room_id, side)) = assignment_of(state, id).await else {
        return;
    };
    let room = state.rooms.lock().await.get(&room_id).cloned();
    let Some(room) = room else { return };

    let outcome = room.state.lock().await.vote_rematch(side);
    if let RematchVote::Ready { top, bottom } = outcome {
        let successor = launch_room(state, top, bottom).await;
        successor.state.lock().await.broadcast(&ServerMessage::RematchStart {
            countdown: COUNTDOWN_SECS,
        });
        room.shutdown().await;
        state.rooms.lock().await.remove(&room_id);
        info!(old = %room_id, new = %successor.id, "rematch started");
    }
}

/// The shared leave path: `leaveRoom`, socket close, socket error and
/// keep-alive termination all converge here.
async fn leave_current_room(state: &SharedState, id: &str) {
    matchmaker::remove(state, id).await;

    let assignment = {
        let mut sessions = state.sessions.lock().await;
        match sessions.get_mut(id) {
            Some(s) => s.room.take().zip(s.side.take()),
            None => None,
        }
    };
    let Some((room_id, side)) = assignment else { return };

    let room = state.rooms.lock().await.get(&room_id).cloned();
    let Some(room) = room else { return };

    let empty = room.state.lock().await.drop_side(side);
    if empty {
        room.shutdown().await;
        state.rooms.lock().await.remove(&room_id);
        info!(room = %room_id, "room destroyed");
    }
}

async fn disconnect(state: &SharedState, id: &str) {
    leave_current_room(state, id).await;
    state.sessions.lock().await.remove(id);
}

/// Liveness sweep. Each round pings every peer and closes those that
/// never answered the previous round.
pub async fn keepalive_loop(state: SharedState) {
    let mut ticker = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        let mut sessions = state.sessions.lock().await;
        for s in sessions.values_mut() {
            if !s.alive {
                warn!(peer = %s.id, "missed keep-alive, closing");
                let _ = s.tx.send(Message::Close(None));
            } else {
                s.alive = false;
                let _ = s.tx.send(Message::Ping(Bytes::new()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HEARTS_START;
    use crate::protocol::messages::Side;
    use crate::state::AppState;
    use serde_json::Value;
    use std::sync::Arc;

    async fn fake_peer(
        state: &SharedState,
        name: &str,
    ) -> (String, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = session::new_id();
        let mut s = Session::new(id.clone(), tx);
        s.name = name.to_string();
        state.sessions.lock().await.insert(id.clone(), s);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    fn frames_of_type(frames: &[Value], ty: &str) -> Vec<Value> {
        frames.iter().filter(|f| f["type"] == ty).cloned().collect()
    }

    async fn paired_match(
        state: &SharedState,
    ) -> (
        String,
        String,
        mpsc::UnboundedReceiver<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let (a, rx_a) = fake_peer(state, "Alice").await;
        let (b, rx_b) = fake_peer(state, "Bob").await;
        dispatch(state, &a, r#"{"type":"joinQueue","name":"Alice"}"#).await;
        dispatch(state, &b, r#"{"type":"joinQueue","name":"Bob"}"#).await;
        (a, b, rx_a, rx_b)
    }

    async fn side_of(state: &SharedState, id: &str) -> Side {
        state.sessions.lock().await[id].side.expect("seated")
    }

    #[tokio::test]
    async fn unknown_type_earns_an_error_reply() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, mut rx_a) = fake_peer(&state, "Alice").await;

        dispatch(&state, &a, r#"{"type":"teleport"}"#).await;
        let frames = drain(&mut rx_a);
        let errors = frames_of_type(&frames, "error");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["message"], "Unknown message type");
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_silently() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, mut rx_a) = fake_peer(&state, "Alice").await;

        dispatch(&state, &a, "not json at all").await;
        dispatch(&state, &a, r#"[1,2,3]"#).await;
        dispatch(&state, &a, r#""just a string""#).await;
        // Recognized type with a broken payload is dropped, not errored.
        dispatch(&state, &a, r#"{"type":"paddle","x":"wide"}"#).await;

        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn join_and_cancel_queue_round_trip() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, mut rx_a) = fake_peer(&state, "Alice").await;

        dispatch(&state, &a, r#"{"type":"joinQueue","name":"  Ada  "}"#).await;
        let frames = drain(&mut rx_a);
        let finding = frames_of_type(&frames, "finding");
        assert_eq!(finding.len(), 1);
        assert_eq!(finding[0]["queueSize"], 1);
        assert_eq!(state.sessions.lock().await[&a].name, "Ada");

        // Re-joining while queued is a no-op.
        dispatch(&state, &a, r#"{"type":"joinQueue"}"#).await;
        assert!(frames_of_type(&drain(&mut rx_a), "finding").is_empty());

        dispatch(&state, &a, r#"{"type":"cancelQueue"}"#).await;
        let frames = drain(&mut rx_a);
        assert_eq!(frames_of_type(&frames, "queueCancelled").len(), 1);
        assert!(state.queue.lock().await.is_empty());

        // Cancelling again still acknowledges.
        dispatch(&state, &a, r#"{"type":"cancelQueue"}"#).await;
        assert_eq!(frames_of_type(&drain(&mut rx_a), "queueCancelled").len(), 1);
    }

    #[tokio::test]
    async fn paddle_input_reaches_the_room_clamped() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, b, _rx_a, _rx_b) = paired_match(&state).await;
        let side_a = side_of(&state, &a).await;

        dispatch(&state, &a, r#"{"type":"paddle","x":2.5}"#).await;
        dispatch(&state, &b, r#"{"type":"paddle","x":0.25}"#).await;

        let room_id = state.sessions.lock().await[&a].room.clone().unwrap();
        let room = state.rooms.lock().await[&room_id].clone();
        let st = room.state.lock().await;
        assert_eq!(*st.paddles.get(side_a), 1.0);
        assert_eq!(*st.paddles.get(side_a.opposite()), 0.25);
    }

    #[tokio::test]
    async fn disconnect_forfeits_a_live_match() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, b, _rx_a, mut rx_b) = paired_match(&state).await;
        let side_b = side_of(&state, &b).await;
        let room_id = state.sessions.lock().await[&a].room.clone().unwrap();

        disconnect(&state, &a).await;

        let frames = drain(&mut rx_b);
        let over = frames_of_type(&frames, "gameOver");
        assert_eq!(over.len(), 1);
        assert_eq!(over[0]["reason"], "disconnect");
        assert_eq!(
            over[0]["winner"],
            serde_json::to_value(side_b).unwrap()
        );
        assert_eq!(over[0]["hearts"]["top"], HEARTS_START);

        // The survivor keeps the room alive until it also leaves.
        assert!(state.rooms.lock().await.contains_key(&room_id));
        assert!(state.sessions.lock().await.get(&a).is_none());

        disconnect(&state, &b).await;
        assert!(state.rooms.lock().await.is_empty());
        assert!(state.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn leave_room_clears_the_assignment_but_keeps_the_session() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, _b, _rx_a, _rx_b) = paired_match(&state).await;

        dispatch(&state, &a, r#"{"type":"leaveRoom"}"#).await;

        let sessions = state.sessions.lock().await;
        assert!(sessions[&a].room.is_none());
        assert!(sessions[&a].side.is_none());
    }

    #[tokio::test]
    async fn mutual_rematch_swaps_sides_and_resets_hearts() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, b, mut rx_a, mut rx_b) = paired_match(&state).await;
        let (old_side_a, old_side_b) = (side_of(&state, &a).await, side_of(&state, &b).await);
        let old_room_id = state.sessions.lock().await[&a].room.clone().unwrap();

        // Finish the match, then both ask for a rematch.
        {
            let room = state.rooms.lock().await[&old_room_id].clone();
            let mut st = room.state.lock().await;
            st.players.get_mut(old_side_a).hearts = 0;
            st.end_game(Some(old_side_b), crate::protocol::messages::GameOverReason::Hearts);
        }
        drain(&mut rx_a);
        drain(&mut rx_b);

        dispatch(&state, &a, r#"{"type":"rematchRequest"}"#).await;
        assert_eq!(
            frames_of_type(&drain(&mut rx_b), "rematchOffered").len(),
            1
        );

        dispatch(&state, &b, r#"{"type":"rematchRequest"}"#).await;

        // Sides swapped, hearts reset, old room retired.
        assert_eq!(side_of(&state, &a).await, old_side_a.opposite());
        assert_eq!(side_of(&state, &b).await, old_side_b.opposite());
        let new_room_id = state.sessions.lock().await[&a].room.clone().unwrap();
        assert_ne!(new_room_id, old_room_id);

        let rooms = state.rooms.lock().await;
        assert!(!rooms.contains_key(&old_room_id));
        let new_room = rooms[&new_room_id].clone();
        drop(rooms);
        let st = new_room.state.lock().await;
        assert_eq!(st.hearts().top, HEARTS_START);
        assert_eq!(st.hearts().bottom, HEARTS_START);
        assert!(!st.votes.top && !st.votes.bottom);
        drop(st);

        for rx in [&mut rx_a, &mut rx_b] {
            let frames = drain(rx);
            assert_eq!(frames_of_type(&frames, "matchFound").len(), 1);
            let start = frames_of_type(&frames, "rematchStart");
            assert_eq!(start.len(), 1);
            assert_eq!(start[0]["countdown"], 3);
        }
    }

    #[tokio::test]
    async fn rematch_request_mid_match_is_ignored() {
        let state: SharedState = Arc::new(AppState::new());
        let (a, _b, _rx_a, mut rx_b) = paired_match(&state).await;
        let old_room_id = state.sessions.lock().await[&a].room.clone().unwrap();

        dispatch(&state, &a, r#"{"type":"rematchRequest"}"#).await;

        assert!(frames_of_type(&drain(&mut rx_b), "rematchOffered").is_empty());
        assert_eq!(
            state.sessions.lock().await[&a].room.clone().unwrap(),
            old_room_id
        );
    }
}
