use serde::{Deserialize, Serialize};

/// Half of the court a player defends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Top => Side::Bottom,
            Side::Bottom => Side::Top,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Countdown,
    Playing,
    Between,
    Gameover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOverReason {
    Hearts,
    Disconnect,
    Tie,
}

// ── Client → Server ──

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    JoinQueue {
        #[serde(default)]
        name: Option<String>,
    },
    CancelQueue,
    Paddle {
        x: f64,
    },
    RematchRequest,
    LeaveRoom,
}

/// `type` strings the dispatcher recognizes. Anything else earns an
/// `error` reply; a recognized type with a bad payload is dropped.
pub const KNOWN_TYPES: [&str; 5] = [
    "joinQueue",
    "cancelQueue",
    "paddle",
    "rematchRequest",
    "leaveRoom",
];

// ── Server → Client ──

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Hello {
        id: String,
    },
    Finding {
        queue_size: usize,
    },
    QueueCancelled,
    MatchFound {
        room_id: String,
        players: [PlayerInfo; 2],
        you: Side,
        countdown: u32,
    },
    State {
        t: u64,
        phase: Phase,
        ball: BallView,
        paddles: PaddlesView,
        hearts: Hearts,
        params: ParamsView,
        you: Side,
    },
    Score {
        hearts: Hearts,
        last_miss: Side,
    },
    GameOver {
        winner: Option<Side>,
        reason: GameOverReason,
        hearts: Hearts,
    },
    RematchOffered,
    RematchStart {
        countdown: u32,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Serialize, Clone)]
pub struct PlayerInfo {
    pub name: String,
    pub side: Side,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct BallView {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Serialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct PaddlesView {
    pub top_x: f64,
    pub bottom_x: f64,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct Hearts {
    pub top: u8,
    pub bottom: u8,
}

/// Derived court geometry echoed to clients so they can scale rendering.
#[derive(Debug, Serialize, Clone, Copy)]
pub struct ParamsView {
    #[serde(rename = "W")]
    pub w: f64,
    #[serde(rename = "H")]
    pub h: f64,
    pub r: f64,
    pub pw: f64,
    pub ph: f64,
}
