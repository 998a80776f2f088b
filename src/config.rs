// Court constants (abstract units, portrait orientation)
pub const WORLD_W: f64 = 900.0;
pub const WORLD_H: f64 = 1600.0;
pub const PADDLE_PADDING: f64 = 70.0; // distance from top/bottom edge to paddle center line
pub const PADDLE_WIDTH_FRAC: f64 = 0.28;
pub const PADDLE_HEIGHT_FRAC: f64 = 0.02;
pub const BALL_RADIUS_FRAC: f64 = 0.018;

// Ball speeds (units per second)
pub const INIT_BALL_SPEED: f64 = 780.0;
pub const MIN_BALL_SPEED: f64 = 100.0;
pub const MAX_BALL_SPEED: f64 = 1200.0;
pub const SPEED_UP: f64 = 1.03; // multiplier per paddle hit
pub const MAX_BOUNCE_ANGLE: f64 = 1.05; // radians from vertical
pub const SERVE_ANGLE_SPREAD: f64 = 0.4; // serve angle sampled in +/- this

// Match rules
pub const HEARTS_START: u8 = 3;
pub const COUNTDOWN_MS: u64 = 3000; // pre-serve freeze at room start / rematch
pub const BETWEEN_MS: u64 = 1500; // post-score freeze before next serve
pub const COUNTDOWN_SECS: u32 = 3; // advertised in matchFound / rematchStart

// Loop cadence
pub const TICK_RATE: u64 = 60; // physics integration, Hz
pub const SEND_RATE: u64 = 30; // state broadcast, Hz
pub const TICK_INTERVAL_MS: u64 = 1000 / TICK_RATE;
pub const SEND_INTERVAL_MS: u64 = 1000 / SEND_RATE;
pub const MAX_DT: f64 = 0.05; // clamp for the integration step, seconds

// Connections
pub const KEEPALIVE_INTERVAL_SECS: u64 = 30;
pub const MAX_NAME_LEN: usize = 16;
pub const DEFAULT_PORT: u16 = 3000;

// Helper: listen port from the environment
pub fn server_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}
