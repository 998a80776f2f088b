use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::*;
use crate::game::physics::{self, Ball, CourtParams};
use crate::protocol::messages::{
    BallView, GameOverReason, Hearts, PaddlesView, ParamsView, Phase, PlayerInfo, ServerMessage,
    Side,
};
use crate::server::session::{self, new_id, Tx};
use crate::state::SharedState;

/// A player's place in a room: identity snapshot plus outbound channel.
#[derive(Clone)]
pub struct Seat {
    pub session_id: String,
    pub name: String,
    pub tx: Tx,
}

/// One side of the court. `conn` is nulled on disconnect; the name
/// snapshot survives so final frames still carry it.
pub struct PlayerSlot {
    pub conn: Option<Seat>,
    pub name: String,
    pub hearts: u8,
}

impl PlayerSlot {
    fn seated(seat: Seat) -> Self {
        PlayerSlot {
            name: seat.name.clone(),
            conn: Some(seat),
            hearts: HEARTS_START,
        }
    }
}

/// Pair of values addressed by court side.
pub struct BySide<T> {
    pub top: T,
    pub bottom: T,
}

impl<T> BySide<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Top => &self.top,
            Side::Bottom => &self.bottom,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Top => &mut self.top,
            Side::Bottom => &mut self.bottom,
        }
    }
}

/// Outcome of a rematch vote.
pub enum RematchVote {
    /// Not in gameover, or the voter is in no position to ask.
    Ignored,
    /// Vote recorded; opponent notified and not yet agreed.
    Offered,
    /// Both agreed. Seats for the successor room, sides already swapped.
    Ready { top: Seat, bottom: Seat },
}

/// Authoritative match state. All mutation goes through the owning
/// `Room`'s mutex, one event handler at a time.
pub struct RoomState {
    pub id: String,
    pub players: BySide<PlayerSlot>,
    pub params: CourtParams,
    /// Normalized paddle centers in [0, 1].
    pub paddles: BySide<f64>,
    pub ball: Ball,
    pub phase: Phase,
    /// Side the next serve travels toward.
    pub serve_toward: Side,
    /// Meaningful only in countdown/between.
    pub next_phase_at: Instant,
    pub last_tick_at: Instant,
    pub votes: BySide<bool>,
    last_state_t: u64,
}

impl RoomState {
    pub fn new(id: String, top: Seat, bottom: Seat, rng: &mut impl Rng) -> Self {
        let now = Instant::now();
        RoomState {
            id,
            players: BySide {
                top: PlayerSlot::seated(top),
                bottom: PlayerSlot::seated(bottom),
            },
            params: CourtParams::derive(),
            paddles: BySide { top: 0.5, bottom: 0.5 },
            ball: Ball::centered(),
            phase: Phase::Countdown,
            serve_toward: if rng.gen_bool(0.5) { Side::Top } else { Side::Bottom },
            next_phase_at: now + Duration::from_millis(COUNTDOWN_MS),
            last_tick_at: now,
            votes: BySide { top: false, bottom: false },
            last_state_t: 0,
        }
    }

    pub fn hearts(&self) -> Hearts {
        Hearts {
            top: self.players.top.hearts,
            bottom: self.players.bottom.hearts,
        }
    }

    pub fn match_found(&self, you: Side) -> ServerMessage {
        ServerMessage::MatchFound {
            room_id: self.id.clone(),
            players: [
                PlayerInfo {
                    name: self.players.top.name.clone(),
                    side: Side::Top,
                },
                PlayerInfo {
                    name: self.players.bottom.name.clone(),
                    side: Side::Bottom,
                },
            ],
            you,
            countdown: COUNTDOWN_SECS,
        }
    }

    pub fn send_to(&self, side: Side, msg: &ServerMessage) {
        if let Some(seat) = &self.players.get(side).conn {
            session::send(&seat.tx, msg);
        }
    }

    pub fn broadcast(&self, msg: &ServerMessage) {
        self.send_to(Side::Top, msg);
        self.send_to(Side::Bottom, msg);
    }

    /// Clamp and apply a paddle input. Non-finite values are ignored.
    pub fn set_paddle(&mut self, side: Side, x: f64) {
        if !x.is_finite() {
            return;
        }
        *self.paddles.get_mut(side) = x.clamp(0.0, 1.0);
    }

    /// One step of the phase machine. Physics runs only in `playing`.
    pub fn tick(&mut self, now: Instant, rng: &mut impl Rng) {
        match self.phase {
            Phase::Countdown | Phase::Between => {
                if now >= self.next_phase_at {
                    self.phase = Phase::Playing;
                    self.serve_ball(rng);
                    self.last_tick_at = now;
                }
            }
            Phase::Playing => self.integrate(now),
            Phase::Gameover => {}
        }
    }

    fn serve_ball(&mut self, rng: &mut impl Rng) {
        let angle = rng.gen_range(-SERVE_ANGLE_SPREAD..=SERVE_ANGLE_SPREAD);
        physics::serve(&mut self.ball, self.serve_toward, angle);
    }

    fn integrate(&mut self, now: Instant) {
        let dt = now
            .duration_since(self.last_tick_at)
            .as_secs_f64()
            .min(MAX_DT);
        self.last_tick_at = now;
        if dt <= 0.0 {
            return;
        }

        self.ball.x += self.ball.vx * dt;
        self.ball.y += self.ball.vy * dt;
        physics::wall_reflect(&mut self.ball, &self.params);

        // Top paddle is tested before bottom.
        if self.ball.vy < 0.0 {
            let cx = self.paddles.top * WORLD_W;
            if physics::hits_paddle(&self.ball, &self.params, cx, self.params.top_y) {
                physics::bounce_off_paddle(&mut self.ball, Side::Top, cx, &self.params);
                return;
            }
        }
        if self.ball.vy > 0.0 {
            let cx = self.paddles.bottom * WORLD_W;
            if physics::hits_paddle(&self.ball, &self.params, cx, self.params.bottom_y) {
                physics::bounce_off_paddle(&mut self.ball, Side::Bottom, cx, &self.params);
                return;
            }
        }

        if self.ball.y + self.params.r < 0.0 {
            self.on_score(Side::Top, now);
        } else if self.ball.y - self.params.r > WORLD_H {
            self.on_score(Side::Bottom, now);
        }
    }

    /// A miss by `loser`: heart decrement, score event, and either the
    /// next serve window or the end of the match.
    pub fn on_score(&mut self, loser: Side, now: Instant) {
        if self.phase != Phase::Playing {
            return;
        }
        self.phase = Phase::Between;
        let slot = self.players.get_mut(loser);
        slot.hearts = slot.hearts.saturating_sub(1);
        let hearts = self.hearts();
        self.broadcast(&ServerMessage::Score {
            hearts,
            last_miss: loser,
        });
        debug!(room = %self.id, side = ?loser, "miss");

        if hearts.top == 0 && hearts.bottom == 0 {
            // Unreachable while misses decrement one heart; kept as a net.
            self.end_game(None, GameOverReason::Tie);
        } else if self.players.get(loser).hearts == 0 {
            self.end_game(Some(loser.opposite()), GameOverReason::Hearts);
        } else {
            self.serve_toward = loser;
            self.next_phase_at = now + Duration::from_millis(BETWEEN_MS);
            self.ball.reset_center();
        }
    }

    pub fn end_game(&mut self, winner: Option<Side>, reason: GameOverReason) {
        self.phase = Phase::Gameover;
        self.ball.vx = 0.0;
        self.ball.vy = 0.0;
        self.broadcast(&ServerMessage::GameOver {
            winner,
            reason,
            hearts: self.hearts(),
        });
        info!(room = %self.id, ?winner, ?reason, "game over");
    }

    /// Record a rematch vote from `side`.
    pub fn vote_rematch(&mut self, side: Side) -> RematchVote {
        if self.phase != Phase::Gameover {
            return RematchVote::Ignored;
        }
        *self.votes.get_mut(side) = true;
        if self.votes.top && self.votes.bottom {
            // Sides swap in the successor room.
            if let (Some(prev_top), Some(prev_bottom)) = (
                self.players.top.conn.clone(),
                self.players.bottom.conn.clone(),
            ) {
                return RematchVote::Ready {
                    top: prev_bottom,
                    bottom: prev_top,
                };
            }
        }
        self.send_to(side.opposite(), &ServerMessage::RematchOffered);
        RematchVote::Offered
    }

    /// `side` left or dropped. Forfeits a live match to the opponent and
    /// reports whether the room is now empty.
    pub fn drop_side(&mut self, side: Side) -> bool {
        if self.phase != Phase::Gameover && self.players.get(side.opposite()).conn.is_some() {
            self.end_game(Some(side.opposite()), GameOverReason::Disconnect);
        }
        self.players.get_mut(side).conn = None;
        *self.votes.get_mut(side) = false;
        self.players.top.conn.is_none() && self.players.bottom.conn.is_none()
    }

    pub fn state_frame(&self, you: Side, t: u64) -> ServerMessage {
        ServerMessage::State {
            t,
            phase: self.phase,
            ball: BallView {
                x: self.ball.x,
                y: self.ball.y,
            },
            paddles: PaddlesView {
                top_x: self.paddles.top,
                bottom_x: self.paddles.bottom,
            },
            hearts: self.hearts(),
            params: ParamsView {
                w: WORLD_W,
                h: WORLD_H,
                r: self.params.r,
                pw: self.params.pw,
                ph: self.params.ph,
            },
            you,
        }
    }

    /// Emit the per-side state frames. `t` is clamped so a wall-clock
    /// step backwards never shows up on the wire.
    pub fn broadcast_state(&mut self, wall_ms: u64) {
        let t = wall_ms.max(self.last_state_t);
        self.last_state_t = t;
        for side in [Side::Top, Side::Bottom] {
            if self.players.get(side).conn.is_some() {
                self.send_to(side, &self.state_frame(side, t));
            }
        }
    }
}

/// A live match: serialized state plus the two periodic loop handles.
pub struct Room {
    pub id: String,
    pub state: Mutex<RoomState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Room {
    /// Build a room with explicit side assignment. The initial match
    /// shuffles the pair before calling; a rematch passes the prior
    /// seats swapped.
    pub fn create(top: Seat, bottom: Seat, rng: &mut impl Rng) -> Arc<Room> {
        let id = new_id();
        let state = RoomState::new(id.clone(), top, bottom, rng);
        Arc::new(Room {
            id,
            state: Mutex::new(state),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the tick and broadcast loops. Each locks the room state for
    /// one step at a time, never across an await.
    pub async fn start_loops(self: Arc<Self>) {
        let room = self.clone();
        let tick_task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(TICK_INTERVAL_MS));
            loop {
                ticker.tick().await;
                let mut st = room.state.lock().await;
                st.tick(Instant::now(), &mut rand::thread_rng());
            }
        });

        let room = self.clone();
        let send_task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(SEND_INTERVAL_MS));
            loop {
                ticker.tick().await;
                let mut st = room.state.lock().await;
                st.broadcast_state(now_ms());
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(tick_task);
        tasks.push(send_task);
    }

    /// Stop both loops. Must run before the room leaves the registry.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

/// Construct a room for the two seats, register it, point the sessions at
/// it, announce the match, and start the loops.
pub async fn launch_room(state: &SharedState, top: Seat, bottom: Seat) -> Arc<Room> {
    let room = Room::create(top.clone(), bottom.clone(), &mut rand::thread_rng());
    state.rooms.lock().await.insert(room.id.clone(), room.clone());

    {
        let mut sessions = state.sessions.lock().await;
        if let Some(s) = sessions.get_mut(&top.session_id) {
            s.room = Some(room.id.clone());
            s.side = Some(Side::Top);
        }
        if let Some(s) = sessions.get_mut(&bottom.session_id) {
            s.room = Some(room.id.clone());
            s.side = Some(Side::Bottom);
        }
    }

    {
        let st = room.state.lock().await;
        st.send_to(Side::Top, &st.match_found(Side::Top));
        st.send_to(Side::Bottom, &st.match_found(Side::Bottom));
    }

    room.clone().start_loops().await;
    info!(room = %room.id, top = %top.name, bottom = %bottom.name, "match started");
    room
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
