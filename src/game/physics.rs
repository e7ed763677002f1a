//! Arena geometry, integration and body collision

use serde::Serialize;

use crate::util::time::REFERENCE_FPS;

/// Arena width in world units
pub const ARENA_WIDTH: f32 = 1024.0;
/// Fixed ground plane (top edge of a standing fighter)
pub const GROUND_Y: f32 = 400.0;
/// Downward acceleration applied while airborne (units/frame per second)
pub const GRAVITY: f32 = 50.0;
/// Fighter body size
pub const BODY_WIDTH: f32 = 80.0;
pub const BODY_HEIGHT: f32 = 180.0;
/// Positional push applied to each body when they overlap
pub const BODY_SEPARATION: f32 = 10.0;

/// Axis-aligned rectangle anchored at its top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Strict AABB overlap: touching edges do not count
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

/// Physics system for integrating fighter bodies
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance a position by one step of velocity.
    /// Velocities are per reference frame, so a 60 Hz step moves exactly `v`.
    pub fn integrate(x: f32, y: f32, vel_x: f32, vel_y: f32, dt: f32) -> (f32, f32) {
        let frames = dt * REFERENCE_FPS;
        (x + vel_x * frames, y + vel_y * frames)
    }

    /// Apply gravity to vertical velocity
    pub fn apply_gravity(vel_y: f32, grounded: bool, dt: f32) -> f32 {
        if grounded {
            vel_y
        } else {
            vel_y + GRAVITY * dt
        }
    }

    /// Keep a body of `width` fully inside the arena
    pub fn clamp_to_arena(x: f32, width: f32) -> f32 {
        x.clamp(0.0, ARENA_WIDTH - width)
    }

    /// Returns (y, landed) after resolving against the ground plane
    pub fn resolve_ground(y: f32) -> (f32, bool) {
        if y >= GROUND_Y {
            (GROUND_Y, true)
        } else {
            (y, false)
        }
    }

    /// Push two overlapping bodies apart along x.
    /// Returns the corrected (x1, x2); unchanged when they do not overlap.
    pub fn resolve_body_overlap(body1: &Rect, body2: &Rect) -> (f32, f32) {
        if !body1.intersects(body2) {
            return (body1.x, body2.x);
        }

        let (x1, x2) = if body1.x < body2.x {
            (body1.x - BODY_SEPARATION, body2.x + BODY_SEPARATION)
        } else {
            (body1.x + BODY_SEPARATION, body2.x - BODY_SEPARATION)
        };

        (
            Self::clamp_to_arena(x1, body1.width),
            Self::clamp_to_arena(x2, body2.width),
        )
    }

    /// True once a rectangle has left the arena horizontally
    pub fn is_out_of_arena(rect: &Rect) -> bool {
        rect.x + rect.width < 0.0 || rect.x > ARENA_WIDTH
    }
}
