//! Collision detection and resolution for the ball.
//!
//! This module handles:
//! - **Surfaces**: table, net, floor and the two bats as bounded planes
//! - **Detection**: finding when and where the ball touches a surface (swept sphere)
//! - **Resolution**: the spin-aware impulse applied at contact
//!
//! ## Swept Sphere Algorithm
//!
//! Instead of checking if the ball overlaps a surface (which fails at high speeds),
//! we check if the ball's trajectory intersects the surface during a timestep.
//!
//! ```text
//! Time t=0         Time t=dt
//!    ●────────────────●
//!    Ball            Ball
//!    start           end
//!         \    ↓
//!          \   Surface
//! ══════════╳═══════════
//!           └─ Collision point
//! ```
//!
//! This detects collisions regardless of ball speed or timestep size.

pub mod detection;
pub mod resolution;

pub use detection::*;
pub use resolution::*;

use crate::forces::AeroForces;
use crate::integrator::Euler;
use crate::types::{BallState, PhysicsParams};

/// Contacts resolved within a single step before the rest of the step is
/// integrated without further checks.
const MAX_CONTACTS_PER_STEP: usize = 4;

/// Ball state after a step together with every contact that happened in it.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub state: BallState,
    pub contacts: Vec<Contact>,
}

/// Advance the ball by `dt`, bouncing off every surface it meets on the way.
///
/// 1. Find the earliest contact among `surfaces` in the remaining time
/// 2. Integrate up to it and apply the contact impulse
/// 3. Continue with the remaining time
///
/// Contact times in the outcome are measured from the start of the step.
/// Moving surfaces (bats) are swept linearly along their velocity.
pub fn step_with_surfaces(
    state: &BallState,
    params: &PhysicsParams,
    surfaces: &[Surface],
    dt: f64,
) -> StepOutcome {
    let forces = AeroForces::new(*params);
    let mut current = *state;
    let mut elapsed = 0.0;
    let mut contacts = Vec::new();

    for _ in 0..MAX_CONTACTS_PER_STEP {
        let remaining = dt - elapsed;
        if remaining <= 0.0 {
            break;
        }

        let earliest = surfaces
            .iter()
            .map(|surface| surface.advanced(elapsed))
            .filter_map(|surface| {
                surface
                    .detect(&current, params.radius, remaining)
                    .map(|contact| (surface, contact))
            })
            .min_by(|a, b| a.1.time.total_cmp(&b.1.time));

        let Some((surface, contact)) = earliest else {
            break;
        };

        current = Euler::step(&current, &forces, contact.time);
        let at_contact = surface.advanced(contact.time);
        current = at_contact.resolve(&current, &contact, params.radius);
        elapsed += contact.time;

        contacts.push(Contact {
            time: elapsed,
            ..contact
        });
    }

    let remaining = dt - elapsed;
    if remaining > 0.0 {
        current = Euler::step(&current, &forces, remaining);
    }

    StepOutcome {
        state: current,
        contacts,
    }
}
