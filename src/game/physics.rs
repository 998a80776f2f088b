use crate::config::*;
use crate::protocol::messages::Side;

/// Court geometry derived once from the world constants.
#[derive(Debug, Clone, Copy)]
pub struct CourtParams {
    pub pw: f64,
    pub ph: f64,
    pub r: f64,
    pub top_y: f64,
    pub bottom_y: f64,
}

impl CourtParams {
    pub fn derive() -> Self {
        CourtParams {
            pw: PADDLE_WIDTH_FRAC * WORLD_W,
            ph: PADDLE_HEIGHT_FRAC * WORLD_H,
            r: BALL_RADIUS_FRAC * WORLD_W,
            top_y: PADDLE_PADDING,
            bottom_y: WORLD_H - PADDLE_PADDING,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
}

impl Ball {
    /// Ball at rest in the center of the court, ready to be served.
    pub fn centered() -> Self {
        Ball {
            x: WORLD_W / 2.0,
            y: WORLD_H / 2.0,
            vx: 0.0,
            vy: 0.0,
            speed: INIT_BALL_SPEED,
        }
    }

    pub fn reset_center(&mut self) {
        *self = Ball::centered();
    }
}

/// Reflect the ball off the side walls, resolving any penetration.
pub fn wall_reflect(ball: &mut Ball, params: &CourtParams) {
    if ball.x - params.r <= 0.0 {
        ball.x = params.r;
        ball.vx = ball.vx.abs();
    } else if ball.x + params.r >= WORLD_W {
        ball.x = WORLD_W - params.r;
        ball.vx = -ball.vx.abs();
    }
}

/// Axis-aligned overlap test between the ball and a paddle centered at
/// (cx, cy).
pub fn hits_paddle(ball: &Ball, params: &CourtParams, cx: f64, cy: f64) -> bool {
    ball.y - params.r <= cy + params.ph / 2.0
        && ball.y + params.r >= cy - params.ph / 2.0
        && ball.x - params.r <= cx + params.pw / 2.0
        && ball.x + params.r >= cx - params.pw / 2.0
}

/// Deflect the ball off a paddle. The exit angle follows the contact
/// offset from the paddle center; speed picks up per hit, capped. The
/// vertical sign always points back into the court, so the next tick
/// moves the ball off the paddle without a position fixup.
pub fn bounce_off_paddle(ball: &mut Ball, side: Side, cx: f64, params: &CourtParams) {
    let rel = ((ball.x - cx) / (params.pw / 2.0)).clamp(-1.0, 1.0);
    let new_speed = (ball.speed * SPEED_UP).clamp(MIN_BALL_SPEED, MAX_BALL_SPEED);
    let theta = rel * MAX_BOUNCE_ANGLE;
    ball.vx = new_speed * theta.sin();
    let vy_mag = (new_speed * theta.cos()).abs();
    ball.vy = match side {
        Side::Top => vy_mag,
        Side::Bottom => -vy_mag,
    };
    ball.speed = new_speed;
}

/// Place the ball at center and launch it toward `toward` at `angle`
/// radians from vertical.
pub fn serve(ball: &mut Ball, toward: Side, angle: f64) {
    ball.reset_center();
    let dir = match toward {
        Side::Top => -1.0,
        Side::Bottom => 1.0,
    };
    ball.vx = INIT_BALL_SPEED * angle.sin();
    ball.vy = dir * INIT_BALL_SPEED * angle.cos();
    ball.speed = INIT_BALL_SPEED;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn center_strike_bounces_straight_up() {
        let params = CourtParams::derive();
        let cx = 0.5 * WORLD_W;
        let mut ball = Ball::centered();
        ball.x = cx;
        ball.vy = INIT_BALL_SPEED;
        bounce_off_paddle(&mut ball, Side::Bottom, cx, &params);

        assert!(close(ball.vx, 0.0));
        assert!(close(ball.vy, -INIT_BALL_SPEED * SPEED_UP));
        assert!(close(ball.speed, INIT_BALL_SPEED * SPEED_UP));
    }

    #[test]
    fn edge_strike_deflects_at_max_angle() {
        let params = CourtParams::derive();
        let cx = 0.5 * WORLD_W;
        let mut ball = Ball::centered();
        ball.x = cx + params.pw / 2.0;
        ball.vx = 10.0;
        ball.vy = INIT_BALL_SPEED;
        bounce_off_paddle(&mut ball, Side::Bottom, cx, &params);

        assert!(close(ball.vx / ball.speed, MAX_BOUNCE_ANGLE.sin()));
        assert!(ball.vy < 0.0);
    }

    #[test]
    fn top_paddle_always_sends_ball_down() {
        let params = CourtParams::derive();
        for frac in [0.0, 0.3, 0.97] {
            let cx = frac * WORLD_W;
            let mut ball = Ball::centered();
            ball.x = cx - params.pw / 4.0;
            ball.vy = -INIT_BALL_SPEED;
            bounce_off_paddle(&mut ball, Side::Top, cx, &params);
            assert!(ball.vy > 0.0);
        }
    }

    #[test]
    fn bounce_speed_is_capped() {
        let params = CourtParams::derive();
        let mut ball = Ball::centered();
        ball.speed = MAX_BALL_SPEED;
        let cx = ball.x;
        bounce_off_paddle(&mut ball, Side::Bottom, cx, &params);
        assert!(close(ball.speed, MAX_BALL_SPEED));
    }

    #[test]
    fn wall_reflection_resolves_penetration() {
        let params = CourtParams::derive();
        let mut ball = Ball::centered();
        ball.x = params.r - 5.0;
        ball.vx = -200.0;
        wall_reflect(&mut ball, &params);
        assert!(close(ball.x, params.r));
        assert!(ball.vx > 0.0);

        ball.x = WORLD_W - params.r + 5.0;
        ball.vx = 200.0;
        wall_reflect(&mut ball, &params);
        assert!(close(ball.x, WORLD_W - params.r));
        assert!(ball.vx < 0.0);
    }

    #[test]
    fn serve_direction_follows_target_side() {
        let mut ball = Ball::centered();
        serve(&mut ball, Side::Top, 0.2);
        assert!(ball.vy < 0.0);
        assert!(close(ball.x, WORLD_W / 2.0));
        assert!(close(ball.vx.hypot(ball.vy), INIT_BALL_SPEED));

        serve(&mut ball, Side::Bottom, -0.2);
        assert!(ball.vy > 0.0);
        assert!(ball.vx < 0.0);
    }
}
