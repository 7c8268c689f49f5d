use glam::Vec2;

/// Velocity decay per frame while the pointer is outside the surface.
pub const DECAY_OUT_OF_BOUNDS: f32 = 0.9;
/// Velocity decay per frame while the pointer is inside but not moving.
pub const DECAY_IDLE: f32 = 0.975;
/// Pull toward the instantaneous direction of motion per frame.
pub const VELOCITY_BLEND: f32 = 0.3;
/// Movement below this (normalized units) counts as stationary.
pub const MOVE_THRESHOLD: f32 = 0.01;

/// Pointer position and a smoothed direction of motion.
///
/// Positions are normalized to the surface, Y-up, in `[0, 1]`. The velocity is
/// a low-pass filtered *direction*: it is pulled toward the unit vector of the
/// latest movement and decays geometrically when the pointer rests or leaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputState {
    position: Vec2,
    previous: Vec2,
    in_bounds: bool,
    velocity: Vec2,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            position: Vec2::splat(0.5),
            previous: Vec2::splat(0.5),
            in_bounds: false,
            velocity: Vec2::ZERO,
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pointer sample in device pixels, measured from the top-left
    /// of a surface of `surface_size` device pixels.
    pub fn on_pointer_sample(&mut self, device: Vec2, surface_size: Vec2) {
        let size = surface_size.max(Vec2::ONE);
        let x = (device.x / size.x).clamp(0.0, 1.0);
        let y = 1.0 - (device.y / size.y).clamp(0.0, 1.0);

        self.previous = self.position;
        self.position = Vec2::new(x, y);
        self.in_bounds = true;
    }

    /// The pointer left the surface. Its last position is kept.
    pub fn on_pointer_leave(&mut self) {
        self.in_bounds = false;
    }

    /// Advance the smoothed velocity by one frame.
    ///
    /// Consumes the movement since the previous tick, so a pointer that sends
    /// no samples until the next tick reads as stationary.
    pub fn tick(&mut self) {
        if !self.in_bounds {
            self.velocity *= DECAY_OUT_OF_BOUNDS;
            return;
        }

        let delta = self.position - self.previous;
        let magnitude = delta.length();
        if magnitude > MOVE_THRESHOLD {
            self.velocity += (delta / magnitude - self.velocity) * VELOCITY_BLEND;
        } else {
            self.velocity *= DECAY_IDLE;
        }
        self.previous = self.position;
    }

    /// Drop all accumulated motion.
    pub fn reset_velocity(&mut self) {
        self.velocity = Vec2::ZERO;
    }

    /// Current position, normalized, Y-up.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Position at the previous tick (or previous sample within a frame).
    pub fn previous(&self) -> Vec2 {
        self.previous
    }

    pub fn in_bounds(&self) -> bool {
        self.in_bounds
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    /// Seed the smoothed velocity, e.g. when restoring state.
    pub fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity = velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: Vec2 = Vec2::new(200.0, 100.0);

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn samples_are_normalized_flipped_and_clamped() {
        let mut input = InputState::new();

        input.on_pointer_sample(Vec2::new(50.0, 25.0), SIZE);
        assert_eq!(input.position(), Vec2::new(0.25, 0.75));
        assert!(input.in_bounds());

        input.on_pointer_sample(Vec2::new(-10.0, 500.0), SIZE);
        assert_eq!(input.position(), Vec2::new(0.0, 0.0));
        assert_eq!(input.previous(), Vec2::new(0.25, 0.75));
    }

    #[test]
    fn leaving_keeps_position() {
        let mut input = InputState::new();
        input.on_pointer_sample(Vec2::new(20.0, 10.0), SIZE);
        input.on_pointer_leave();

        assert!(!input.in_bounds());
        assert_eq!(input.position(), Vec2::new(0.1, 0.9));
    }

    #[test]
    fn movement_pulls_toward_direction_not_magnitude() {
        let mut input = InputState::new();
        input.on_pointer_sample(Vec2::new(100.0, 50.0), SIZE);
        input.tick();
        input.on_pointer_sample(Vec2::new(180.0, 50.0), SIZE);
        input.tick();

        assert!(close(input.velocity().x, VELOCITY_BLEND));
        assert!(close(input.velocity().y, 0.0));
    }

    #[test]
    fn repeated_motion_converges_to_unit_direction() {
        let mut input = InputState::new();
        let mut x = 0.0;
        input.on_pointer_sample(Vec2::new(x, 50.0), SIZE);
        for _ in 0..60 {
            x += 3.0;
            input.on_pointer_sample(Vec2::new(x, 50.0), SIZE);
            input.tick();
        }
        assert!((input.velocity().length() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn stationary_pointer_decays_by_idle_factor() {
        let mut input = InputState::new();
        input.on_pointer_sample(Vec2::new(100.0, 50.0), SIZE);
        input.tick();
        input.set_velocity(Vec2::new(0.6, -0.8));

        let k = 12;
        for _ in 0..k {
            input.tick();
        }

        assert!(close(input.velocity().length(), DECAY_IDLE.powi(k)));
    }

    #[test]
    fn out_of_bounds_pointer_decays_faster() {
        let mut input = InputState::new();
        input.set_velocity(Vec2::new(0.0, 1.0));

        let k = 7;
        for _ in 0..k {
            input.tick();
        }

        assert!(close(input.velocity().length(), DECAY_OUT_OF_BOUNDS.powi(k)));
    }

    #[test]
    fn sub_threshold_jitter_counts_as_stationary() {
        let mut input = InputState::new();
        input.on_pointer_sample(Vec2::new(100.0, 50.0), SIZE);
        input.tick();
        input.set_velocity(Vec2::new(1.0, 0.0));

        input.on_pointer_sample(Vec2::new(101.0, 50.0), SIZE);
        input.tick();

        assert!(close(input.velocity().x, DECAY_IDLE));
    }
}
