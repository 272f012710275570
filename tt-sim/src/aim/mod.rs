//! Moving the bat to a strike pose.
//!
//! An [`Aim`] combines three single-axis plans ([`AimCoord`]) along an
//! orthonormal basis built around the strike:
//!
//! - `x̂` points against the bat velocity at the strike
//! - `ŷ` is the velocity change still needed, made perpendicular to `x̂`
//! - `ẑ = x̂ × ŷ`
//!
//! Bat orientation (pitch, yaw) is interpolated linearly over the plan.
//! The aim only stores snapshots of the poses it connects, so it can be
//! handed between threads and agents freely.

pub mod coord;

pub use coord::{AimCoord, CoordPoint, CoordSolverKind};

use serde::{Deserialize, Serialize};

use crate::algebra::{Algebra, Numeric, Triple};
use crate::types::Vec3;

/// Below this length a basis candidate is considered degenerate.
const BASIS_EPSILON: f64 = 1e-6;

/// Motion limits of a striking agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLimits {
    /// Maximum acceleration per basis axis (m/s²)
    pub max_acceleration: f64,
    /// Optional cap on the bat speed (m/s)
    pub max_speed: Option<f64>,
    /// Planner used for strike moves
    pub solver: CoordSolverKind,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_acceleration: 60.0,
            max_speed: None,
            solver: CoordSolverKind::OptimalPath,
        }
    }
}

/// Bat pose at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BatPose {
    pub pos: Vec3,
    pub vel: Vec3,
    pub pitch: f64,
    pub yaw: f64,
    pub time: f64,
}

/// Where the bat should be at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AimSample {
    pub pos: Vec3,
    pub vel: Vec3,
    pub pitch: f64,
    pub yaw: f64,
}

/// Three-axis bang-bang plan from the current bat pose to a target pose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aim {
    basis: [Vec3; 3],
    coords: [AimCoord; 3],
    start: BatPose,
    target: BatPose,
    has_time_to_react: bool,
}

impl Aim {
    /// Plan a strike: reach `target` (position, velocity, orientation) at
    /// `target.time`.
    pub fn new(start: &BatPose, target: &BatPose, limits: &AgentLimits) -> Self {
        let basis = strike_basis(target.vel, target.vel - start.vel);
        Self::along(basis, limits.solver, start, target, limits)
    }

    /// Default plan: go to `rest` and wait there at rest until `until`.
    ///
    /// Uses the world axes, so it is defined even without a strike.
    pub fn ready(start: &BatPose, rest: Vec3, pitch: f64, yaw: f64, until: f64, limits: &AgentLimits) -> Self {
        let target = BatPose {
            pos: rest,
            vel: Vec3::ZERO,
            pitch,
            yaw,
            time: until.max(start.time),
        };
        Self::along(
            [Vec3::UNIT_X, Vec3::UNIT_Y, Vec3::UNIT_Z],
            CoordSolverKind::WaitPosition,
            start,
            &target,
            limits,
        )
    }

    fn along(
        basis: [Vec3; 3],
        kind: CoordSolverKind,
        start: &BatPose,
        target: &BatPose,
        limits: &AgentLimits,
    ) -> Self {
        let coords = basis.map(|axis| {
            kind.solve(
                CoordPoint::new(start.pos.dot(&axis), start.vel.dot(&axis), start.time),
                CoordPoint::new(target.pos.dot(&axis), target.vel.dot(&axis), target.time),
                limits.max_acceleration,
            )
        });

        let mut aim = Self {
            basis,
            coords,
            start: *start,
            target: *target,
            has_time_to_react: coords.iter().all(AimCoord::has_time_to_react),
        };
        if let Some(max_speed) = limits.max_speed {
            aim.has_time_to_react &= aim.peak_speed() <= max_speed;
        }
        aim
    }

    /// Bat pose the plan commands at simulation time `time`.
    pub fn sample(&self, time: f64) -> AimSample {
        let mut pos = Vec3::ZERO;
        let mut vel = Vec3::ZERO;
        for (axis, coord) in self.basis.iter().zip(&self.coords) {
            let (x, v) = coord.at(time);
            pos += *axis * x;
            vel += *axis * v;
        }

        let duration = self.target.time - self.start.time;
        let fraction = if duration > 0.0 {
            ((time - self.start.time) / duration).clamp(0.0, 1.0)
        } else {
            1.0
        };

        AimSample {
            pos,
            vel,
            pitch: self.start.pitch + (self.target.pitch - self.start.pitch) * fraction,
            yaw: self.start.yaw + (self.target.yaw - self.start.yaw) * fraction,
        }
    }

    /// Commanded acceleration (world frame) at `time`.
    pub fn force_at(&self, time: f64) -> Vec3 {
        self.basis
            .iter()
            .zip(&self.coords)
            .fold(Vec3::ZERO, |acc, (axis, coord)| acc + *axis * coord.acceleration_at(time))
    }

    /// Summed acceleration magnitude over the axes, a measure of effort.
    pub fn force_coefficient(&self) -> f64 {
        self.coords.iter().map(AimCoord::force_coefficient).sum()
    }

    /// Upper bound on the bat speed along the plan.
    pub fn peak_speed(&self) -> f64 {
        self.coords
            .iter()
            .map(|c| c.peak_speed() * c.peak_speed())
            .sum::<f64>()
            .sqrt()
    }

    pub fn has_time_to_react(&self) -> bool {
        self.has_time_to_react
    }

    pub fn basis(&self) -> &[Vec3; 3] {
        &self.basis
    }

    pub fn coords(&self) -> &[AimCoord; 3] {
        &self.coords
    }

    pub fn start(&self) -> &BatPose {
        &self.start
    }

    pub fn target(&self) -> &BatPose {
        &self.target
    }
}

/// Unit direction of a bat face with `pitch` and `yaw` held by the agent on
/// `side`. At zero angles it faces the net.
pub fn bat_direction<A: Algebra>(alg: &mut A, pitch: A::Scalar, yaw: A::Scalar, side: f64) -> Triple<A::Scalar> {
    let sin_pitch = alg.sin(pitch);
    let cos_pitch = alg.cos(pitch);
    let sin_yaw = alg.sin(yaw);
    let cos_yaw = alg.cos(yaw);
    let along = alg.mul(cos_pitch, cos_yaw);
    let x = alg.scale(along, -side);
    let z = alg.mul(cos_pitch, sin_yaw);
    Triple::new(x, sin_pitch, z)
}

pub fn bat_normal(pitch: f64, yaw: f64, side: f64) -> Vec3 {
    bat_direction(&mut Numeric, pitch, yaw, side).to_vec3()
}

/// Orthonormal basis for a strike with bat velocity `strike_vel` that needs
/// a velocity change `delta_vel`. Degenerate inputs fall back to world axes.
fn strike_basis(strike_vel: Vec3, delta_vel: Vec3) -> [Vec3; 3] {
    let x = if strike_vel.magnitude() > BASIS_EPSILON {
        -strike_vel.normalized()
    } else {
        Vec3::UNIT_X
    };

    let perpendicular = |v: Vec3| v - x * v.dot(&x);
    let y = [delta_vel, Vec3::UNIT_Y, Vec3::UNIT_Z]
        .into_iter()
        .map(perpendicular)
        .find(|candidate| candidate.magnitude() > BASIS_EPSILON)
        .map(|candidate| candidate.normalized())
        .unwrap_or(Vec3::UNIT_Y);

    [x, y, x.cross(&y)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(pos: Vec3, vel: Vec3, time: f64) -> BatPose {
        BatPose {
            pos,
            vel,
            pitch: 0.0,
            yaw: 0.0,
            time,
        }
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let cases = [
            (Vec3::new(3.0, 1.0, 0.5), Vec3::new(3.0, 1.0, 0.5)),
            (Vec3::new(3.0, 1.0, 0.5), Vec3::new(0.0, 2.0, 0.0)),
            (Vec3::new(0.0, 4.0, 0.0), Vec3::new(0.0, 4.0, 0.0)),
            (Vec3::ZERO, Vec3::ZERO),
        ];
        for (strike, delta) in cases {
            let [x, y, z] = strike_basis(strike, delta);
            for (a, b) in [(x, y), (y, z), (x, z)] {
                assert!(a.dot(&b).abs() < 1e-12, "axes must be orthogonal: {:?}", (x, y, z));
            }
            for axis in [x, y, z] {
                assert!((axis.magnitude() - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_bat_normal_faces_the_net() {
        let left = bat_normal(0.0, 0.0, -1.0);
        assert!((left - Vec3::UNIT_X).magnitude() < 1e-15);
        let right = bat_normal(0.0, 0.0, 1.0);
        assert!((right + Vec3::UNIT_X).magnitude() < 1e-15);

        let open = bat_normal(0.4, -0.2, -1.0);
        assert!(open.y > 0.0, "positive pitch opens the face upward");
        assert!((open.magnitude() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_strike_reaches_target() {
        let limits = AgentLimits::default();
        let start = pose(Vec3::new(-1.6, 1.0, 0.1), Vec3::ZERO, 0.0);
        let target = BatPose {
            pitch: 0.3,
            yaw: -0.1,
            ..pose(Vec3::new(-1.4, 1.05, 0.0), Vec3::new(3.0, 1.0, 0.2), 0.3)
        };
        let aim = Aim::new(&start, &target, &limits);

        assert!(aim.has_time_to_react());
        let at_start = aim.sample(0.0);
        let at_end = aim.sample(0.3);
        assert!((at_start.pos - start.pos).magnitude() < 1e-9);
        assert!((at_end.pos - target.pos).magnitude() < 1e-9, "end {:?}", at_end.pos);
        assert!((at_end.vel - target.vel).magnitude() < 1e-9);
        assert!((at_end.pitch - 0.3).abs() < 1e-12 && (at_end.yaw + 0.1).abs() < 1e-12);

        let halfway = aim.sample(0.15);
        assert!((halfway.pitch - 0.15).abs() < 1e-12, "orientation is interpolated linearly");
    }

    #[test]
    fn test_infeasible_reach() {
        let limits = AgentLimits::default();
        // Two meters in a tenth of a second
        let start = pose(Vec3::new(-1.6, 1.0, 0.0), Vec3::ZERO, 0.0);
        let target = pose(Vec3::new(0.4, 1.0, 0.0), Vec3::new(3.0, 0.0, 0.0), 0.1);
        let aim = Aim::new(&start, &target, &limits);

        assert!(!aim.has_time_to_react());
        assert!(
            aim.coords().iter().any(|c| !c.has_time_to_react()),
            "an axis must report the shortfall"
        );
    }

    #[test]
    fn test_speed_cap_makes_plan_infeasible() {
        let start = pose(Vec3::new(-1.6, 1.0, 0.0), Vec3::ZERO, 0.0);
        let target = pose(Vec3::new(-1.2, 1.0, 0.0), Vec3::new(4.0, 0.0, 0.0), 0.5);

        let free = Aim::new(&start, &target, &AgentLimits::default());
        assert!(free.has_time_to_react());

        let capped = Aim::new(
            &start,
            &target,
            &AgentLimits {
                max_speed: Some(2.0),
                ..AgentLimits::default()
            },
        );
        assert!(!capped.has_time_to_react(), "target speed alone exceeds the cap");
    }

    #[test]
    fn test_ready_waits_at_rest() {
        let limits = AgentLimits::default();
        let start = pose(Vec3::new(-1.0, 0.9, 0.3), Vec3::new(1.0, 0.0, -0.5), 2.0);
        let rest = Vec3::new(-1.6, 1.0, 0.0);
        let aim = Aim::ready(&start, rest, 0.0, 0.0, 4.0, &limits);

        assert!(aim.has_time_to_react());
        let late = aim.sample(3.9);
        assert!((late.pos - rest).magnitude() < 1e-9);
        assert_eq!(late.vel, Vec3::ZERO);
    }

    #[test]
    fn test_force_sums_axis_pushes() {
        let limits = AgentLimits::default();
        let start = pose(Vec3::ZERO, Vec3::ZERO, 0.0);
        let target = pose(Vec3::new(0.5, 0.2, 0.0), Vec3::new(2.0, 0.0, 0.0), 0.4);
        let aim = Aim::new(&start, &target, &limits);

        let force = aim.force_at(0.001);
        let expected: f64 = aim
            .coords()
            .iter()
            .map(|c| c.acceleration_at(0.001).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!((force.magnitude() - expected).abs() < 1e-9);
        assert!(aim.force_coefficient() > 0.0);
    }
}
