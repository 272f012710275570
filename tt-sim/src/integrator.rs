//! Fixed-step integration of the ball's equations of motion.
//!
//! The full step is forward Euler with a second-order position term:
//!
//! ```text
//! 1. a = a(x, v, ω),  α = α(ω)
//! 2. x_new = x + v*dt + 0.5*a*dt²
//! 3. v_new = v + a*dt
//! 4. ω_new = ω + α*dt
//! ```
//!
//! The closed-form alternative for bounce-free intervals lives in `flight`.

use crate::types::{BallState, Vec3};

/// Time derivatives of velocity and spin at one ball state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub acceleration: Vec3,
    pub spin_rate: Vec3,
}

/// Something that knows how the ball accelerates.
pub trait ForceModel {
    fn rates(&self, state: &BallState) -> Rates;
}

/// Forward Euler, the authoritative ball physics.
pub struct Euler;

impl Euler {
    pub fn step<F: ForceModel>(state: &BallState, forces: &F, dt: f64) -> BallState {
        let Rates {
            acceleration,
            spin_rate,
        } = forces.rates(state);
        BallState {
            pos: state.pos + state.vel * dt + acceleration * (0.5 * dt * dt),
            vel: state.vel + acceleration * dt,
            spin: state.spin + spin_rate * dt,
        }
    }

    /// `count` steps of `dt` each.
    pub fn advance<F: ForceModel>(state: &BallState, forces: &F, dt: f64, count: usize) -> BallState {
        (0..count).fold(*state, |current, _| Self::step(&current, forces, dt))
    }
}
