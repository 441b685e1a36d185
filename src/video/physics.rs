//! Bouncing ball physics
//!
//! The ball moves in a straight line at constant speed and reflects off the
//! frame edges. Reflection flips the velocity component for the *next* step;
//! the current position is never pulled back into bounds, so it may overshoot
//! an edge by at most `speed * dt`.

use serde::Serialize;

use super::format::Resolution;

/// Default ball speed in pixels per second (both axes)
pub const DEFAULT_SPEED: f64 = 200.0;

/// Ball radius is this fraction of the smaller frame side
pub const RADIUS_DIVISOR: u32 = 10;

/// Mutable ball state owned by one frame source
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BallState {
    pub x: f64,
    pub y: f64,
    /// Signed horizontal velocity (pixels/sec)
    pub dx: f64,
    /// Signed vertical velocity (pixels/sec)
    pub dy: f64,
    pub radius: f64,
    pub width: u32,
    pub height: u32,
}

impl BallState {
    /// Initial state for a frame: ball tangent to the top-left corner,
    /// moving down and to the right.
    pub fn initial(resolution: Resolution) -> Self {
        let radius = (resolution.min_side() / RADIUS_DIVISOR) as f64;
        Self {
            x: radius,
            y: radius,
            dx: DEFAULT_SPEED,
            dy: DEFAULT_SPEED,
            radius,
            width: resolution.width,
            height: resolution.height,
        }
    }

    /// Advance the ball by `dt` seconds and reflect at the boundaries.
    pub fn update(&mut self, dt: f64) {
        self.x += self.dx * dt;
        self.y += self.dy * dt;

        if self.x <= self.radius || self.x >= self.width as f64 - self.radius {
            self.dx = -self.dx;
        }
        if self.y <= self.radius || self.y >= self.height as f64 - self.radius {
            self.dy = -self.dy;
        }
    }

    /// Largest absolute velocity component
    pub fn speed(&self) -> f64 {
        self.dx.abs().max(self.dy.abs())
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}
