//! Aerodynamic forces acting on the ball in flight.
//!
//! `AeroForces` is the `ForceModel` of a ball in flight:
//!
//! - **Gravity**: constant downward acceleration
//! - **Drag**: quadratic air resistance, `-D·|v|·v`
//! - **Magnus**: lift from spin, `lift·(v × ω)` with `lift = -magnus`
//! - **Spin decay**: `-K·ω·sqrt(|ω|)`
//!
//! ## The Magnus Effect
//!
//! ```text
//! Topspin (ball flying +X, spin around -Z):
//!     ↓ Magnus force pushes ball DOWN
//!     Ball dives faster than gravity alone
//!
//! Backspin (ball flying +X, spin around +Z):
//!     ↑ Magnus force pushes ball UP
//!     Ball "floats" and travels further
//! ```
//!
//! All coefficients are per unit mass, so the model returns accelerations.

use crate::integrator::{ForceModel, Rates};
use crate::types::{BallState, PhysicsParams, Vec3};

/// Complete force model for the ball in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct AeroForces {
    pub params: PhysicsParams,
}

impl AeroForces {
    pub fn new(params: PhysicsParams) -> Self {
        Self { params }
    }

    /// Force model with only gravity (for testing).
    pub fn gravity_only() -> Self {
        Self::new(PhysicsParams::vacuum())
    }

    fn gravity(&self) -> Vec3 {
        Vec3::new(0.0, -self.params.gravity, 0.0)
    }

    fn drag_acceleration(&self, state: &BallState) -> Vec3 {
        state.vel * (-self.params.drag * state.vel.magnitude())
    }

    fn magnus_acceleration(&self, state: &BallState) -> Vec3 {
        state.vel.cross(&state.spin) * self.params.lift()
    }

    fn spin_decay(&self, state: &BallState) -> Vec3 {
        state.spin * (-self.params.spin_damping * state.spin.magnitude().sqrt())
    }
}

impl ForceModel for AeroForces {
    fn rates(&self, state: &BallState) -> Rates {
        Rates {
            acceleration: self.magnus_acceleration(state) + self.drag_acceleration(state) + self.gravity(),
            spin_rate: self.spin_decay(state),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::Euler;
    use crate::types::constants;

    fn no_gravity() -> AeroForces {
        AeroForces::new(PhysicsParams {
            gravity: 0.0,
            ..PhysicsParams::default()
        })
    }

    #[test]
    fn test_gravity_only() {
        let forces = AeroForces::gravity_only();
        let state = BallState::new(Vec3::ZERO, Vec3::new(3.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 50.0));

        let acc = forces.rates(&state).acceleration;

        assert!(acc.x.abs() < constants::EPSILON);
        assert!((acc.y + constants::GRAVITY).abs() < constants::EPSILON);
        assert!(acc.z.abs() < constants::EPSILON);
        assert_eq!(forces.rates(&state).spin_rate, Vec3::ZERO);
    }

    #[test]
    fn test_drag_opposes_motion() {
        let forces = no_gravity();
        let state = BallState::new(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO);

        let acc = forces.rates(&state).acceleration;

        assert!(acc.x < 0.0, "Drag should oppose motion, got ax={}", acc.x);
        assert!((acc.x + forces.params.drag * 100.0).abs() < 1e-12, "drag is quadratic in speed");
        assert!(acc.y.abs() < constants::EPSILON);
    }

    #[test]
    fn test_topspin_curves_down() {
        let forces = no_gravity();
        // Flying +X, top of the ball moving forward: spin around -Z
        let state = BallState::new(
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -100.0),
        );

        let acc = forces.rates(&state).acceleration;

        assert!(acc.y < 0.0, "Topspin should curve down, got ay={}", acc.y);
    }

    #[test]
    fn test_backspin_curves_up() {
        let forces = no_gravity();
        let state = BallState::new(
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 100.0),
        );

        let acc = forces.rates(&state).acceleration;

        assert!(acc.y > 0.0, "Backspin should curve up, got ay={}", acc.y);
    }

    #[test]
    fn test_sidespin_curves_sideways() {
        let forces = no_gravity();
        let state = BallState::new(
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 100.0, 0.0),
        );

        let acc = forces.rates(&state).acceleration;

        assert!(acc.z.abs() > constants::EPSILON, "Sidespin should curve sideways");
    }

    #[test]
    fn test_spin_decays() {
        let forces = AeroForces::default();
        let mut state = BallState::new(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(5.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, -150.0),
        );
        let initial = state.spin.magnitude();
        for _ in 0..100 {
            state = Euler::step(&state, &forces, 0.002);
        }
        assert!(state.spin.magnitude() < initial, "Spin should decay in flight");
        assert!(state.spin.z < 0.0, "Decay must not flip the spin axis");
    }

    #[test]
    fn test_trajectory_with_topspin() {
        let forces_with_spin = AeroForces::default();
        let with_spin = BallState::new(
            Vec3::new(-1.2, 1.0, 0.0),
            Vec3::new(8.0, 2.0, 0.0),
            Vec3::new(0.0, 0.0, -300.0),
        );
        let no_spin = BallState {
            spin: Vec3::ZERO,
            ..with_spin
        };

        let dt = 0.001;
        let mut state_spin = with_spin;
        let mut state_nospin = no_spin;
        for _ in 0..200 {
            state_spin = Euler::step(&state_spin, &forces_with_spin, dt);
            state_nospin = Euler::step(&state_nospin, &forces_with_spin, dt);
        }

        assert!(
            state_spin.pos.y < state_nospin.pos.y,
            "Topspin ball should be lower: spin_y={}, nospin_y={}",
            state_spin.pos.y,
            state_nospin.pos.y
        );
    }
}
