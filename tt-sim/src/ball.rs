//! The ball as the simulation owns it: kinematic state plus a surface mark.

use serde::Serialize;

use crate::collision::{step_with_surfaces, Contact, Surface};
use crate::flight::step_simplified;
use crate::forces::AeroForces;
use crate::integrator::Euler;
use crate::types::{BallState, PhysicsParams, Vec3};

/// Ball with a decorative mark on its surface.
///
/// The mark is an offset from the center of length `radius`; it only exists
/// so a renderer can show the spin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ball {
    pub state: BallState,
    pub mark: Vec3,
}

impl Ball {
    pub fn new(state: BallState, radius: f64) -> Self {
        Self {
            state,
            mark: Vec3::UNIT_Y * radius,
        }
    }

    /// Full-physics step without surfaces.
    pub fn step(&mut self, params: &PhysicsParams, dt: f64) {
        let spin = self.state.spin;
        self.state = Euler::step(&self.state, &AeroForces::new(*params), dt);
        self.turn_mark(spin, params.radius, dt);
    }

    /// Closed-form step; never looks at surfaces.
    pub fn step_simplified(&mut self, params: &PhysicsParams, dt: f64) {
        let spin = self.state.spin;
        self.state = step_simplified(&self.state, params, dt);
        self.turn_mark(spin, params.radius, dt);
    }

    /// Full-physics step that bounces off `surfaces`; returns the contacts.
    pub fn step_with_surfaces(
        &mut self,
        params: &PhysicsParams,
        surfaces: &[Surface],
        dt: f64,
    ) -> Vec<Contact> {
        let spin_before = self.state.spin;
        let outcome = step_with_surfaces(&self.state, params, surfaces, dt);
        self.state = outcome.state;
        // Spin may jump at a contact; average keeps the mark continuous
        self.turn_mark((spin_before + self.state.spin) * 0.5, params.radius, dt);
        outcome.contacts
    }

    /// Mark position in world coordinates.
    pub fn mark_world(&self) -> Vec3 {
        self.state.pos + self.mark
    }

    fn turn_mark(&mut self, spin: Vec3, radius: f64, dt: f64) {
        let turned = self.mark.rotated(&(spin * dt)).normalized();
        self.mark = if turned == Vec3::ZERO {
            Vec3::UNIT_Y * radius
        } else {
            turned * radius
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_stays_on_surface() {
        let params = PhysicsParams::default();
        let mut ball = Ball::new(
            BallState::new(
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(3.0, 1.0, 0.0),
                Vec3::new(20.0, -80.0, 150.0),
            ),
            params.radius,
        );
        for _ in 0..500 {
            ball.step(&params, 0.002);
        }
        assert!(
            (ball.mark.magnitude() - params.radius).abs() < 1e-12,
            "mark drifted off the sphere: |mark| = {}",
            ball.mark.magnitude()
        );
    }

    #[test]
    fn test_mark_turns_with_spin() {
        let params = PhysicsParams::default();
        let mut ball = Ball::new(
            BallState::new(Vec3::ZERO, Vec3::ZERO, Vec3::new(0.0, 0.0, 100.0)),
            params.radius,
        );
        let before = ball.mark;
        ball.step(&params, 0.001);
        assert!(ball.mark.x < 0.0, "+Z spin turns the top of the ball toward -X");
        assert!((ball.mark - before).magnitude() > 0.0);
    }

    #[test]
    fn test_step_variants_agree_for_short_steps() {
        let params = PhysicsParams::default();
        let state = BallState::new(
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(5.0, 1.0, 0.3),
            Vec3::new(0.0, -20.0, -120.0),
        );
        let mut full = Ball::new(state, params.radius);
        let mut closed = Ball::new(state, params.radius);
        for _ in 0..100 {
            full.step(&params, 0.001);
            closed.step_simplified(&params, 0.001);
        }
        assert!((full.state.pos - closed.state.pos).magnitude() < 1e-3);
    }

    #[test]
    fn test_surface_step_reports_bounce() {
        let params = PhysicsParams::default();
        let floor = Surface::floor(crate::collision::SurfaceCoefficients::default().floor);
        let mut ball = Ball::new(BallState::at_rest(Vec3::new(3.0, 0.1, 0.0)), params.radius);
        let mut bounced = false;
        for _ in 0..200 {
            bounced |= !ball.step_with_surfaces(&params, &[floor], 0.002).is_empty();
        }
        assert!(bounced, "ball dropped near the floor should hit it");
        assert!(ball.state.pos.y >= 0.0);
    }
}
