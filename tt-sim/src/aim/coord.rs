//! Time-optimal motion along one axis under bounded acceleration.
//!
//! Every plan is a bang-bang profile with an optional coast in the middle:
//!
//! ```text
//! accel      c1·a ┌──────┐
//!                 │      │            ┌──────┐
//!               0 ┘      └────────────┘      │ c2·a
//!                 |<tau1>|<-- coast -->|<tau2>|
//!                 t0                          t1
//! ```
//!
//! With `T = t1 - t0`, `Δv = v1 - v0` and `D = x1 - x0 - v0·T` (the distance
//! left after coasting at the start velocity), matching both endpoints is a
//! linear equation in `tau1` when both pushes share a sign and a quadratic in
//! `tau2` when they oppose. The first sign pattern with a feasible solution
//! (`tau1, tau2 >= 0`, `tau1 + tau2 <= T`) wins.

use serde::{Deserialize, Serialize};

/// Relative slack accepted on the feasibility checks.
const FEASIBILITY_TOLERANCE: f64 = 1e-12;
/// Durations shorter than this cannot be planned.
const MIN_DURATION: f64 = 1e-9;
/// Headroom over the minimal-effort acceleration so the coast-free
/// solution stays on the feasible side of rounding.
const MIN_EFFORT_MARGIN: f64 = 1e-9;

/// Which planner builds an [`AimCoord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordSolverKind {
    /// Full acceleration, sign patterns `(s,s)`, `(1,-1)`, `(-1,1)`
    Basic,
    /// Smallest acceleration that still arrives on time
    #[default]
    OptimalPath,
    /// Reach the target position at rest as soon as possible, then wait
    WaitPosition,
}

impl CoordSolverKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "basic" => Some(CoordSolverKind::Basic),
            "optimal_path" => Some(CoordSolverKind::OptimalPath),
            "wait_position" => Some(CoordSolverKind::WaitPosition),
            _ => None,
        }
    }

    /// Plan a move from `start` to `end` with at most `max_acceleration`.
    pub fn solve(self, start: CoordPoint, end: CoordPoint, max_acceleration: f64) -> AimCoord {
        match self {
            CoordSolverKind::Basic => AimCoord::bang_bang(self, start, end, max_acceleration),
            CoordSolverKind::OptimalPath => AimCoord::optimal_path(start, end, max_acceleration),
            CoordSolverKind::WaitPosition => AimCoord::wait_position(start, end, max_acceleration),
        }
    }
}

/// Position and velocity at an instant along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordPoint {
    pub pos: f64,
    pub vel: f64,
    pub time: f64,
}

impl CoordPoint {
    pub fn new(pos: f64, vel: f64, time: f64) -> Self {
        Self { pos, vel, time }
    }
}

/// Single-axis motion plan. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AimCoord {
    kind: CoordSolverKind,
    start: CoordPoint,
    end: CoordPoint,
    tau1: f64,
    tau2: f64,
    c1: f64,
    c2: f64,
    acceleration: f64,
    has_time_to_react: bool,
}

impl AimCoord {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    fn bang_bang(kind: CoordSolverKind, start: CoordPoint, end: CoordPoint, accel: f64) -> Self {
        let duration = end.time - start.time;
        if !(duration > MIN_DURATION) || !(accel > 0.0) {
            return Self::fallback(kind, start, end);
        }

        let dv = end.vel - start.vel;
        let s = sign(dv);
        let patterns = match kind {
            CoordSolverKind::OptimalPath => [(1.0, -1.0), (-1.0, 1.0), (s, s)],
            _ => [(s, s), (1.0, -1.0), (-1.0, 1.0)],
        };

        for (c1, c2) in patterns {
            if let Some((tau1, tau2)) = switch_times(c1, c2, accel, start, end) {
                return Self {
                    kind,
                    start,
                    end,
                    tau1,
                    tau2,
                    c1,
                    c2,
                    acceleration: accel,
                    has_time_to_react: true,
                };
            }
        }
        Self::fallback(kind, start, end)
    }

    fn optimal_path(start: CoordPoint, end: CoordPoint, max_accel: f64) -> Self {
        let kind = CoordSolverKind::OptimalPath;
        let duration = end.time - start.time;
        if !(duration > MIN_DURATION) {
            return Self::fallback(kind, start, end);
        }
        match min_effort_acceleration(start, end) {
            Some(a) if a == 0.0 => Self {
                kind,
                start,
                end,
                tau1: 0.0,
                tau2: 0.0,
                c1: 1.0,
                c2: -1.0,
                acceleration: 0.0,
                has_time_to_react: true,
            },
            Some(a) if a.abs() <= max_accel => {
                let accel = (a.abs() * (1.0 + MIN_EFFORT_MARGIN)).min(max_accel.max(a.abs()));
                Self::bang_bang(kind, start, end, accel)
            }
            _ => Self::fallback(kind, start, end),
        }
    }

    fn wait_position(start: CoordPoint, end: CoordPoint, accel: f64) -> Self {
        let kind = CoordSolverKind::WaitPosition;
        let end = CoordPoint { vel: 0.0, ..end };
        let duration = end.time - start.time;
        if !(accel > 0.0) {
            return Self::fallback(kind, start, end);
        }

        let dx = end.pos - start.pos;
        let v0 = start.vel;
        // Overshoot beyond the stopping distance decides the first push
        let c = sign(dx - v0 * v0.abs() / (2.0 * accel));
        let peak = c * (c * accel * dx + v0 * v0 / 2.0).max(0.0).sqrt();
        let tau1 = ((peak - v0) / (c * accel)).max(0.0);
        let tau2 = (peak / (c * accel)).max(0.0);

        Self {
            kind,
            start,
            end,
            tau1,
            tau2,
            c1: c,
            c2: -c,
            acceleration: accel,
            has_time_to_react: tau1 + tau2 <= duration * (1.0 + FEASIBILITY_TOLERANCE),
        }
    }

    /// Minimal-effort plan without a coast. It still matches both endpoints,
    /// but at an acceleration the agent does not have.
    fn fallback(kind: CoordSolverKind, start: CoordPoint, end: CoordPoint) -> Self {
        let duration = (end.time - start.time).max(0.0);
        let (tau1, tau2, c, accel) = match min_effort_acceleration(start, end) {
            Some(a) if a != 0.0 && duration > MIN_DURATION => {
                let u = (end.vel - start.vel) / a;
                ((duration + u) / 2.0, (duration - u) / 2.0, sign(a), a.abs())
            }
            _ => (0.0, 0.0, 1.0, 0.0),
        };

        Self {
            kind,
            start,
            end,
            tau1,
            tau2,
            c1: c,
            c2: -c,
            acceleration: accel,
            has_time_to_react: false,
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Position and velocity at absolute time `time`, clamped to the plan.
    pub fn at(&self, time: f64) -> (f64, f64) {
        let duration = self.duration();
        let dt = (time - self.start.time).clamp(0.0, duration.max(0.0));
        let a = self.acceleration;

        if dt <= self.tau1 {
            let x = self.start.pos + self.start.vel * dt + self.c1 * a * dt * dt / 2.0;
            return (x, self.start.vel + self.c1 * a * dt);
        }

        if self.kind == CoordSolverKind::WaitPosition {
            let (peak_x, peak_v) = self.end_of_first_push();
            let s = dt - self.tau1;
            if s <= self.tau2 {
                return (peak_x + peak_v * s + self.c2 * a * s * s / 2.0, peak_v + self.c2 * a * s);
            }
            return (self.end.pos, 0.0);
        }

        if dt >= duration - self.tau2 {
            // Anchored at the end so the plan lands exactly on target
            let r = duration - dt;
            let x = self.end.pos - self.end.vel * r + self.c2 * a * r * r / 2.0;
            return (x, self.end.vel - self.c2 * a * r);
        }

        let (x, v) = self.end_of_first_push();
        (x + v * (dt - self.tau1), v)
    }

    /// Signed acceleration commanded at absolute time `time`.
    pub fn acceleration_at(&self, time: f64) -> f64 {
        let dt = time - self.start.time;
        if dt < 0.0 || dt > self.duration() {
            return 0.0;
        }
        let second_push = match self.kind {
            CoordSolverKind::WaitPosition => dt > self.tau1 && dt <= self.tau1 + self.tau2,
            _ => dt >= self.duration() - self.tau2,
        };
        if dt <= self.tau1 {
            self.c1 * self.acceleration
        } else if second_push {
            self.c2 * self.acceleration
        } else {
            0.0
        }
    }

    pub fn duration(&self) -> f64 {
        self.end.time - self.start.time
    }

    /// Shortest time in which the move itself could be completed.
    pub fn min_move_time(&self) -> f64 {
        (self.tau1 + self.duration() - self.tau2) / 2.0
    }

    /// Magnitude of the acceleration the plan uses.
    pub fn force_coefficient(&self) -> f64 {
        self.acceleration
    }

    /// Largest speed reached anywhere on the plan.
    pub fn peak_speed(&self) -> f64 {
        let (_, coast) = self.end_of_first_push();
        self.start.vel.abs().max(self.end.vel.abs()).max(coast.abs())
    }

    pub fn has_time_to_react(&self) -> bool {
        self.has_time_to_react
    }

    pub fn kind(&self) -> CoordSolverKind {
        self.kind
    }

    pub fn start(&self) -> CoordPoint {
        self.start
    }

    pub fn end(&self) -> CoordPoint {
        self.end
    }

    pub fn tau1(&self) -> f64 {
        self.tau1
    }

    pub fn tau2(&self) -> f64 {
        self.tau2
    }

    /// Signs of the two pushes
    pub fn signs(&self) -> (f64, f64) {
        (self.c1, self.c2)
    }

    fn end_of_first_push(&self) -> (f64, f64) {
        let a = self.c1 * self.acceleration;
        let t = self.tau1;
        (
            self.start.pos + self.start.vel * t + a * t * t / 2.0,
            self.start.vel + a * t,
        )
    }
}

fn sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Switch durations for the sign pattern `(c1, c2)`, if feasible.
fn switch_times(c1: f64, c2: f64, accel: f64, start: CoordPoint, end: CoordPoint) -> Option<(f64, f64)> {
    let duration = end.time - start.time;
    let dv = end.vel - start.vel;
    let gap = end.pos - start.pos - start.vel * duration;
    let eps = FEASIBILITY_TOLERANCE * duration.max(1.0);

    let admissible = |tau1: f64, tau2: f64| {
        (tau1 >= -eps && tau2 >= -eps && tau1 + tau2 <= duration + eps)
            .then(|| (tau1.max(0.0), tau2.max(0.0)))
    };

    if c1 == c2 {
        let total = dv.abs() / accel;
        if (duration - total).abs() < eps {
            return None;
        }
        let tau1 = (gap / (c1 * accel) - total * total / 2.0) / (duration - total);
        return admissible(tau1, total - tau1);
    }

    // tau2² - (T - d)·tau2 - (d·T - d²/2 - D/(c1·a)) = 0
    let d = dv / (c1 * accel);
    let b = -(duration - d);
    let c = -(d * duration - d * d / 2.0 - gap / (c1 * accel));
    let disc = b * b - 4.0 * c;
    if disc < 0.0 {
        return None;
    }
    let root = disc.sqrt();
    [(-b - root) / 2.0, (-b + root) / 2.0]
        .into_iter()
        .find_map(|tau2| admissible(tau2 + d, tau2))
}

/// Smallest signed acceleration that matches both endpoints with no coast.
///
/// Solves `A²T² + A(2ΔvT - 4D) - Δv² = 0` and keeps roots whose velocity
/// change fits in the interval (`|Δv/A| <= T`).
fn min_effort_acceleration(start: CoordPoint, end: CoordPoint) -> Option<f64> {
    let duration = end.time - start.time;
    if !(duration > MIN_DURATION) {
        return None;
    }
    let dv = end.vel - start.vel;
    let gap = end.pos - start.pos - start.vel * duration;

    let qa = duration * duration;
    let qb = 2.0 * dv * duration - 4.0 * gap;
    let qc = -dv * dv;
    let root = (qb * qb - 4.0 * qa * qc).max(0.0).sqrt();

    let mut best: Option<f64> = None;
    for a in [(-qb + root) / (2.0 * qa), (-qb - root) / (2.0 * qa)] {
        if a == 0.0 {
            if dv == 0.0 && gap.abs() < 1e-15 {
                return Some(0.0);
            }
            continue;
        }
        if (dv / a).abs() <= duration * (1.0 + FEASIBILITY_TOLERANCE)
            && best.map_or(true, |b| a.abs() < b.abs())
        {
            best = Some(a);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const KINDS: [CoordSolverKind; 2] = [CoordSolverKind::Basic, CoordSolverKind::OptimalPath];

    fn assert_endpoints(plan: &AimCoord, start: CoordPoint, end: CoordPoint) {
        let scale = 1.0_f64
            .max(end.pos.abs())
            .max(end.vel.abs())
            .max(plan.force_coefficient() * plan.duration().powi(2));
        let (x0, v0) = plan.at(start.time);
        let (x1, v1) = plan.at(end.time);
        let err = (x0 - start.pos)
            .abs()
            .max((v0 - start.vel).abs())
            .max((x1 - end.pos).abs())
            .max((v1 - end.vel).abs());
        assert!(
            err <= 1e-9 * scale,
            "{:?} plan misses its endpoints by {}: {:?} -> {:?}",
            plan.kind(),
            err,
            start,
            end
        );
    }

    #[test]
    fn test_round_trip_random_inputs() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..5000 {
            let start = CoordPoint::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0), 0.0);
            let end = CoordPoint::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(0.05..2.0),
            );
            let accel = rng.gen_range(0.5..50.0);
            for kind in KINDS {
                let plan = kind.solve(start, end, accel);
                assert_endpoints(&plan, start, end);
                assert!(plan.tau1() >= 0.0 && plan.tau2() >= 0.0);
                if plan.has_time_to_react() {
                    assert!(plan.tau1() + plan.tau2() <= plan.duration() * (1.0 + 1e-9));
                    assert!(
                        plan.force_coefficient() <= accel * (1.0 + 1e-9),
                        "feasible plan must respect the acceleration bound"
                    );
                }
            }
        }
    }

    #[test]
    fn test_start_time_offset() {
        let start = CoordPoint::new(0.2, 0.0, 10.0);
        let end = CoordPoint::new(0.9, 1.0, 10.5);
        for kind in KINDS {
            let plan = kind.solve(start, end, 40.0);
            assert!(plan.has_time_to_react());
            assert_endpoints(&plan, start, end);
        }
    }

    #[test]
    fn test_profile_is_continuous() {
        let start = CoordPoint::new(-0.5, 0.3, 0.0);
        let end = CoordPoint::new(0.4, -0.8, 0.6);
        for kind in KINDS {
            let plan = kind.solve(start, end, 20.0);
            let mut previous = plan.at(0.0);
            let steps = 6000;
            for i in 1..=steps {
                let t = 0.6 * i as f64 / steps as f64;
                let current = plan.at(t);
                assert!(
                    (current.0 - previous.0).abs() < 1e-3 && (current.1 - previous.1).abs() < 0.01,
                    "{:?} jumps at t={}: {:?} -> {:?}",
                    kind,
                    t,
                    previous,
                    current
                );
                previous = current;
            }
        }
    }

    #[test]
    fn test_optimal_path_force_decreases_with_time() {
        let start = CoordPoint::new(0.0, 0.0, 0.0);
        let mut previous = f64::INFINITY;
        for duration in [0.2, 0.3, 0.5, 1.0, 2.0] {
            let plan = CoordSolverKind::OptimalPath.solve(start, CoordPoint::new(1.0, 0.0, duration), 1e3);
            let force = plan.force_coefficient();
            assert!(
                (force - 4.0 / (duration * duration)).abs() < 1e-6 * force,
                "rest-to-rest effort should be 4D/T², got {} at T={}",
                force,
                duration
            );
            assert!(force <= previous, "force must not grow with more time");
            previous = force;
        }
    }

    #[test]
    fn test_too_little_time_is_infeasible() {
        // 1m from rest to rest needs T >= 2·sqrt(1/a)
        let accel = 4.0;
        let start = CoordPoint::new(0.0, 0.0, 0.0);
        let enough = CoordPoint::new(1.0, 0.0, 1.05);
        let short = CoordPoint::new(1.0, 0.0, 0.95);
        for kind in KINDS {
            assert!(kind.solve(start, enough, accel).has_time_to_react());
            let plan = kind.solve(start, short, accel);
            assert!(!plan.has_time_to_react(), "{:?} should not make it", kind);
            // Still an exact plan, just too demanding
            assert_endpoints(&plan, start, short);
            assert!(plan.force_coefficient() > accel);
        }
    }

    #[test]
    fn test_zero_duration_is_infeasible() {
        let point = CoordPoint::new(0.0, 0.0, 1.0);
        let plan = CoordSolverKind::Basic.solve(point, CoordPoint::new(0.5, 0.0, 1.0), 10.0);
        assert!(!plan.has_time_to_react());
    }

    #[test]
    fn test_stationary_target_needs_no_force() {
        let start = CoordPoint::new(0.3, 0.5, 0.0);
        let end = CoordPoint::new(0.8, 0.5, 1.0);
        let plan = CoordSolverKind::OptimalPath.solve(start, end, 10.0);
        assert!(plan.has_time_to_react());
        assert_eq!(plan.force_coefficient(), 0.0);
        assert_endpoints(&plan, start, end);
    }

    #[test]
    fn test_wait_position_arrives_and_waits() {
        let start = CoordPoint::new(0.0, 1.0, 0.0);
        let target = CoordPoint::new(-0.5, 2.0, 2.0);
        let plan = CoordSolverKind::WaitPosition.solve(start, target, 10.0);

        assert!(plan.has_time_to_react());
        assert_eq!(plan.end().vel, 0.0, "waiting ends at rest");
        let arrival = plan.tau1() + plan.tau2();
        assert!(arrival < 2.0);
        let (x, v) = plan.at(arrival);
        assert!((x + 0.5).abs() < 1e-9 && v.abs() < 1e-9, "arrives at rest: {} {}", x, v);
        assert_eq!(plan.at(1.9), (-0.5, 0.0));
        assert_eq!(plan.at(0.0), (0.0, 1.0));
    }

    #[test]
    fn test_peak_speed_covers_coast() {
        let plan = CoordSolverKind::Basic.solve(
            CoordPoint::new(0.0, 0.0, 0.0),
            CoordPoint::new(2.0, 0.0, 2.0),
            10.0,
        );
        let (_, coast) = plan.at(1.0);
        assert!((plan.peak_speed() - coast.abs()).abs() < 1e-12);
        assert!(plan.peak_speed() > 1.0, "must outrun the average speed");
    }

    #[test]
    fn test_solver_names_match_config() {
        for kind in [CoordSolverKind::Basic, CoordSolverKind::OptimalPath, CoordSolverKind::WaitPosition] {
            let name = serde_yaml::to_string(&kind).expect("serialise");
            assert_eq!(CoordSolverKind::from_name(name.trim()), Some(kind), "{}", name);
        }
        assert_eq!(CoordSolverKind::from_name("fastest"), None);
    }
}
