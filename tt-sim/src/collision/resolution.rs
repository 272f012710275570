//! Collision resolution for the ball.
//!
//! A contact is a single instantaneous impulse in the frame of the surface:
//!
//! ```text
//! rel = v - v_surface                  relative velocity
//! vn  = (rel·n) n,  vt = rel - vn      normal / tangential split
//! u   = vt - R (ω × n)                 slip of the contact point
//! J   = -grip · u                      tangential impulse (per unit mass)
//!
//! v'  = v_surface + vt + J - e·vn
//! ω'  = ω + (J × n) / R
//! ```
//!
//! Incoming spin shows up in the slip: topspin on the table keeps the ball
//! running forward, backspin brakes it. A moving bat adds its own velocity
//! through `v_surface`, so brushing produces spin.
//!
//! The impulse is written once over [`Algebra`]: the physics evaluates it on
//! `f64` and the hit search records it symbolically.

use serde::{Deserialize, Serialize};

use crate::algebra::{Algebra, BallTerms, Numeric, Triple};
use crate::collision::{Contact, Surface};
use crate::types::BallState;

/// Impulse coefficients of one surface type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitCoefficients {
    /// Fraction of the contact slip removed by friction
    pub grip: f64,
    /// Coefficient of restitution along the normal
    pub restitution: f64,
}

impl HitCoefficients {
    pub const fn new(grip: f64, restitution: f64) -> Self {
        Self { grip, restitution }
    }
}

/// Coefficients for every surface in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceCoefficients {
    pub table: HitCoefficients,
    pub bat: HitCoefficients,
    pub floor: HitCoefficients,
    pub net: HitCoefficients,
}

impl Default for SurfaceCoefficients {
    fn default() -> Self {
        Self {
            table: HitCoefficients::new(0.25, 0.9),
            bat: HitCoefficients::new(0.3, 0.8),
            floor: HitCoefficients::new(0.3, 0.7),
            // Soft mesh: absorbs most of the normal speed
            net: HitCoefficients::new(0.5, 0.2),
        }
    }
}

/// Ball velocity and spin right after touching a surface.
///
/// `normal` must be a unit vector pointing toward the ball. Position is
/// returned unchanged.
pub fn process_hit<A: Algebra>(
    alg: &mut A,
    ball: &BallTerms<A::Scalar>,
    surface_velocity: Triple<A::Scalar>,
    normal: Triple<A::Scalar>,
    radius: f64,
    coeffs: &HitCoefficients,
) -> BallTerms<A::Scalar> {
    let rel = ball.vel.sub(alg, surface_velocity);
    let rel_n = rel.dot(alg, normal);
    let vn = normal.scale(alg, rel_n);
    let vt = rel.sub(alg, vn);

    let spin_cross = ball.spin.cross(alg, normal);
    let r = alg.constant(radius);
    let rolling = spin_cross.scale(alg, r);
    let slip = vt.sub(alg, rolling);
    let neg_grip = alg.constant(-coeffs.grip);
    let impulse = slip.scale(alg, neg_grip);

    let neg_e = alg.constant(-coeffs.restitution);
    let bounced = vn.scale(alg, neg_e);
    let vel = surface_velocity
        .add(alg, vt)
        .add(alg, impulse)
        .add(alg, bounced);

    let torque = impulse.cross(alg, normal);
    let inv_r = alg.constant(1.0 / radius);
    let spin_delta = torque.scale(alg, inv_r);
    let spin = ball.spin.add(alg, spin_delta);

    BallTerms {
        pos: ball.pos,
        vel,
        spin,
    }
}

impl Surface {
    /// Apply this surface's contact impulse to a ball touching it.
    pub fn resolve(&self, ball: &BallState, contact: &Contact, radius: f64) -> BallState {
        let terms = BallTerms::from(*ball);
        let hit = process_hit(
            &mut Numeric,
            &terms,
            self.vel.into(),
            contact.normal.into(),
            radius,
            &self.coeffs,
        );
        hit.into()
    }
}

// =============================================================================
// Tests
// =============================================================================
