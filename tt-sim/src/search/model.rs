//! Symbolic model of a stroke and the flight that follows it.
//!
//! Two sub-models share one [`ExprGraph`]:
//!
//! - [`HitModel`] maps the six decision variables to the ball state right
//!   after the strike, reading the incoming ball from the hit window through
//!   lookup tables.
//! - [`FlightModel`] maps a flight start state `s` and a flight time `T` to
//!   the ball state at `T`, plus that state after a table bounce.
//!
//! Event times (landing, net crossing, apex) are not closed-form, so the
//! search finds them numerically and differentiates through them with the
//! partials exported here.

use crate::aim::{bat_direction, BatPose};
use crate::algebra::{Algebra, BallTerms, Triple};
use crate::collision::{process_hit, HitCoefficients};
use crate::error::SearchError;
use crate::expr::{EvalContext, ExprGraph, ExprId, VarId};
use crate::flight::simplified_flight;
use crate::search::HitWindow;
use crate::strategy::{Interval, StrokeRanges};
use crate::types::{BallState, PhysicsParams, Vec3};

/// Number of decision variables.
pub const DECISIONS: usize = 6;
/// Number of ball state components.
pub const STATE: usize = 9;

/// Component indices into `BallState::to_array`.
pub const POS_X: usize = 0;
pub const POS_Y: usize = 1;
pub const POS_Z: usize = 2;
pub const VEL_X: usize = 3;
pub const VEL_Y: usize = 4;

/// d(post-hit state)/d(decision)
pub type HitJacobian = [[f64; DECISIONS]; STATE];
/// d(state)/d(state)
pub type StateJacobian = [[f64; STATE]; STATE];

const DECISION_NAMES: [&str; DECISIONS] = ["timing", "speed", "pitch", "yaw", "vpitch", "vyaw"];
const STATE_NAMES: [&str; STATE] = ["px", "py", "pz", "vx", "vy", "vz", "wx", "wy", "wz"];

/// Numeric result of the strike for one decision vector.
#[derive(Debug, Clone, Copy)]
pub struct HitEval {
    pub hit_time: f64,
    pub post_hit: BallState,
    pub jacobian: HitJacobian,
    /// Bat pose the aim has to reach
    pub strike: BatPose,
}

/// Decision variables to post-hit ball state.
#[derive(Debug, Clone)]
pub struct HitModel {
    decision: [VarId; DECISIONS],
    hit_time: ExprId,
    ball_pos: [ExprId; 3],
    normal: [ExprId; 3],
    bat_vel: [ExprId; 3],
    pitch: ExprId,
    yaw: ExprId,
    post_hit: [ExprId; STATE],
    jacobian: [[ExprId; DECISIONS]; STATE],
    radius: f64,
}

fn interval_expr(graph: &mut ExprGraph, interval: Interval, u: ExprId) -> ExprId {
    let width = graph.constant(interval.width());
    let min = graph.constant(interval.min);
    let span = graph.mul(width, u);
    graph.add(min, span)
}

impl HitModel {
    pub fn build(
        graph: &mut ExprGraph,
        window: &HitWindow,
        ranges: &StrokeRanges,
        side: f64,
        params: &PhysicsParams,
        bat: &HitCoefficients,
    ) -> Result<Self, SearchError> {
        let decision = DECISION_NAMES.map(|name| graph.variable(name));
        let u = decision.map(|var| graph.var(var));

        // Strike time inside the window
        let fraction = interval_expr(graph, ranges.timing, u[0]);
        let span = graph.constant(window.last_time() - window.first_time());
        let offset = graph.mul(span, fraction);
        let first = graph.constant(window.first_time());
        let hit_time = graph.add(first, offset);

        // Incoming ball at the strike
        let mut incoming = Vec::with_capacity(STATE);
        for table in window.component_tables()? {
            let id = graph.add_table(table);
            incoming.push(graph.lookup(id, hit_time));
        }
        let incoming: [ExprId; STATE] = incoming
            .try_into()
            .map_err(|_| SearchError::NoHittableWindow)?;
        let ball = BallTerms::from_array(incoming);

        let speed = interval_expr(graph, ranges.speed, u[1]);
        let pitch = interval_expr(graph, ranges.pitch, u[2]);
        let yaw = interval_expr(graph, ranges.yaw, u[3]);
        let vpitch = interval_expr(graph, ranges.vpitch, u[4]);
        let vyaw = interval_expr(graph, ranges.vyaw, u[5]);

        let normal = bat_direction(graph, pitch, yaw, side);
        let swing_pitch = graph.add(pitch, vpitch);
        let swing_yaw = graph.add(yaw, vyaw);
        let swing = bat_direction(graph, swing_pitch, swing_yaw, side);
        let bat_vel = swing.scale(graph, speed);

        let post = process_hit(graph, &ball, bat_vel, normal, params.radius, bat);
        let post_hit = post.to_array();

        let mut jacobian = [[post_hit[0]; DECISIONS]; STATE];
        for (row, &component) in jacobian.iter_mut().zip(&post_hit) {
            for (cell, &var) in row.iter_mut().zip(&decision) {
                *cell = graph.derivative(component, var);
            }
        }

        tracing::debug!(nodes = graph.len(), "hit model built");

        Ok(Self {
            decision,
            hit_time,
            ball_pos: ball.pos.to_array(),
            normal: normal.to_array(),
            bat_vel: bat_vel.to_array(),
            pitch,
            yaw,
            post_hit,
            jacobian,
            radius: params.radius,
        })
    }

    pub fn evaluate(&self, graph: &ExprGraph, ctx: &mut EvalContext, u: &[f64; DECISIONS]) -> HitEval {
        for (&var, &value) in self.decision.iter().zip(u) {
            ctx.set(graph, var, value);
        }

        let post_hit = BallState::from_array(&self.post_hit.map(|id| ctx.eval(graph, id)));
        let jacobian = self.jacobian.map(|row| row.map(|id| ctx.eval(graph, id)));

        let vec = |ctx: &mut EvalContext, ids: [ExprId; 3]| {
            let [x, y, z] = ids.map(|id| ctx.eval(graph, id));
            Vec3::new(x, y, z)
        };
        let ball_pos = vec(ctx, self.ball_pos);
        let normal = vec(ctx, self.normal);
        let bat_vel = vec(ctx, self.bat_vel);
        let hit_time = ctx.eval(graph, self.hit_time);

        HitEval {
            hit_time,
            post_hit,
            jacobian,
            strike: BatPose {
                pos: ball_pos - normal * self.radius,
                vel: bat_vel,
                pitch: ctx.eval(graph, self.pitch),
                yaw: ctx.eval(graph, self.yaw),
                time: hit_time,
            },
        }
    }
}

/// Value and partial derivatives of one flight output at `(s, T)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partials {
    pub value: f64,
    pub ds: [f64; STATE],
    pub dt: f64,
}

/// Flight start state and duration to the state at landing.
#[derive(Debug, Clone)]
pub struct FlightModel {
    state: [VarId; STATE],
    time: VarId,
    flight: Derivatives,
    bounce: Derivatives,
}

#[derive(Debug, Clone)]
struct Derivatives {
    value: [ExprId; STATE],
    ds: [[ExprId; STATE]; STATE],
    dt: [ExprId; STATE],
}

impl Derivatives {
    fn build(graph: &mut ExprGraph, value: [ExprId; STATE], state: &[VarId; STATE], time: VarId) -> Self {
        let mut ds = [[value[0]; STATE]; STATE];
        for (row, &component) in ds.iter_mut().zip(&value) {
            for (cell, &var) in row.iter_mut().zip(state) {
                *cell = graph.derivative(component, var);
            }
        }
        let dt = value.map(|component| graph.derivative(component, time));
        Self { value, ds, dt }
    }

    fn partials(&self, graph: &ExprGraph, ctx: &mut EvalContext, component: usize) -> Partials {
        Partials {
            value: ctx.eval(graph, self.value[component]),
            ds: self.ds[component].map(|id| ctx.eval(graph, id)),
            dt: ctx.eval(graph, self.dt[component]),
        }
    }
}

impl FlightModel {
    pub fn build(graph: &mut ExprGraph, params: &PhysicsParams, table: &HitCoefficients) -> Self {
        let state = STATE_NAMES.map(|name| graph.variable(name));
        let time = graph.variable("t");

        let start = BallTerms::from_array(state.map(|var| graph.var(var)));
        let t = graph.var(time);
        let landed = simplified_flight(graph, params, &start, t);

        let up = Triple::from_vec3(graph, Vec3::UNIT_Y);
        let still = Triple::splat(graph, 0.0);
        let bounced = process_hit(graph, &landed, still, up, params.radius, table);

        let flight = Derivatives::build(graph, landed.to_array(), &state, time);
        let bounce = Derivatives::build(graph, bounced.to_array(), &state, time);

        tracing::debug!(nodes = graph.len(), "flight model built");

        Self {
            state,
            time,
            flight,
            bounce,
        }
    }

    /// Point subsequent evaluations at start state `start` and time `t`.
    pub fn set_point(&self, graph: &ExprGraph, ctx: &mut EvalContext, start: &BallState, t: f64) {
        for (&var, value) in self.state.iter().zip(start.to_array()) {
            ctx.set(graph, var, value);
        }
        ctx.set(graph, self.time, t);
    }

    /// Flight output `component` at the current point.
    pub fn flight(&self, graph: &ExprGraph, ctx: &mut EvalContext, component: usize) -> Partials {
        self.flight.partials(graph, ctx, component)
    }

    /// Post-bounce output `component` at the current point.
    pub fn bounce(&self, graph: &ExprGraph, ctx: &mut EvalContext, component: usize) -> Partials {
        self.bounce.partials(graph, ctx, component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Numeric;
    use crate::collision::{Surface, SurfaceCoefficients};
    use crate::search::{SearchSettings, WindowQuery};
    use crate::strategy::StrategyKind;
    use crate::types::TableState;

    fn serve_window(params: &PhysicsParams, table: &TableState) -> HitWindow {
        let settings = SearchSettings::default();
        let ball = BallState::at_rest(Vec3::new(-1.55, table.surface_y() + 0.3, 0.1));
        let query = WindowQuery {
            params,
            table,
            table_surface: Surface::table(table, SurfaceCoefficients::default().table),
            settings: &settings,
            side: -1.0,
            serve: true,
        };
        HitWindow::sample(&ball, 0.0, &query).expect("window")
    }

    #[test]
    fn test_hit_model_matches_numeric_strike() {
        let params = PhysicsParams::default();
        let table = TableState::default();
        let coeffs = SurfaceCoefficients::default();
        let window = serve_window(&params, &table);
        let ranges = StrategyKind::Balanced.strategy().serve;

        let mut graph = ExprGraph::new();
        let model = HitModel::build(&mut graph, &window, &ranges, -1.0, &params, &coeffs.bat).expect("model");
        let mut ctx = EvalContext::new(&graph);
        let u = [0.5, 0.3, 0.4, 0.6, 0.5, 0.2];
        let eval = model.evaluate(&graph, &mut ctx, &u);

        // Same strike done by hand
        let hit_time = window.first_time() + (window.last_time() - window.first_time()) * ranges.timing.lerp(u[0]);
        let incoming = window.state_at(hit_time);
        let (pitch, yaw) = (ranges.pitch.lerp(u[2]), ranges.yaw.lerp(u[3]));
        let normal = crate::aim::bat_normal(pitch, yaw, -1.0);
        let swing = crate::aim::bat_normal(pitch + ranges.vpitch.lerp(u[4]), yaw + ranges.vyaw.lerp(u[5]), -1.0);
        let bat_vel = swing * ranges.speed.lerp(u[1]);
        let expected: BallState = process_hit(
            &mut Numeric,
            &incoming.into(),
            bat_vel.into(),
            normal.into(),
            params.radius,
            &coeffs.bat,
        )
        .into();

        assert!((eval.hit_time - hit_time).abs() < 1e-12);
        for (a, b) in eval.post_hit.to_array().iter().zip(expected.to_array()) {
            assert!((a - b).abs() < 1e-9, "post-hit {} vs {}", a, b);
        }
        assert!((eval.strike.pos - (incoming.pos - normal * params.radius)).magnitude() < 1e-12);
        assert!(eval.post_hit.vel.x > 0.0, "the serve leaves toward the net");
    }

    #[test]
    fn test_hit_jacobian_matches_finite_differences() {
        let params = PhysicsParams::default();
        let table = TableState::default();
        let coeffs = SurfaceCoefficients::default();
        let window = serve_window(&params, &table);
        let ranges = StrategyKind::Balanced.strategy().serve;

        let mut graph = ExprGraph::new();
        let model = HitModel::build(&mut graph, &window, &ranges, -1.0, &params, &coeffs.bat).expect("model");
        let mut ctx = EvalContext::new(&graph);
        // Timing chosen mid-segment so the lookup slope is well defined
        let u = [0.4531, 0.3, 0.4, 0.6, 0.5, 0.2];
        let base = model.evaluate(&graph, &mut ctx, &u);

        let h = 1e-7;
        for j in 1..DECISIONS {
            let mut shifted = u;
            shifted[j] += h;
            let moved = model.evaluate(&graph, &mut ctx, &shifted).post_hit.to_array();
            for (i, value) in moved.iter().enumerate() {
                let numeric = (value - base.post_hit.to_array()[i]) / h;
                let analytic = base.jacobian[i][j];
                assert!(
                    (numeric - analytic).abs() < 1e-4 * (1.0 + analytic.abs()),
                    "d{}/du{}: {} vs {}",
                    i,
                    j,
                    analytic,
                    numeric
                );
            }
        }
    }

    #[test]
    fn test_flight_partials_match_finite_differences() {
        let params = PhysicsParams::default();
        let coeffs = SurfaceCoefficients::default();
        let mut graph = ExprGraph::new();
        let model = FlightModel::build(&mut graph, &params, &coeffs.table);
        let mut ctx = EvalContext::new(&graph);

        let start = BallState::new(
            Vec3::new(-1.4, 1.0, 0.1),
            Vec3::new(4.0, 1.5, -0.3),
            Vec3::new(5.0, 20.0, -60.0),
        );
        let t = 0.35;
        model.set_point(&graph, &mut ctx, &start, t);
        let base = model.flight(&graph, &mut ctx, POS_Y);

        let numeric: BallState =
            simplified_flight(&mut Numeric, &params, &start.into(), t).into();
        assert!((base.value - numeric.pos.y).abs() < 1e-12);

        let h = 1e-6;
        model.set_point(&graph, &mut ctx, &start, t + h);
        let later = model.flight(&graph, &mut ctx, POS_Y).value;
        assert!(((later - base.value) / h - base.dt).abs() < 1e-4);

        let mut shifted = start;
        shifted.vel.x += h;
        model.set_point(&graph, &mut ctx, &shifted, t);
        let faster = model.flight(&graph, &mut ctx, POS_Y).value;
        assert!(((faster - base.value) / h - base.ds[VEL_X]).abs() < 1e-4);
    }

    #[test]
    fn test_bounce_reflects_vertical_speed() {
        let params = PhysicsParams::default();
        let coeffs = SurfaceCoefficients::default();
        let mut graph = ExprGraph::new();
        let model = FlightModel::build(&mut graph, &params, &coeffs.table);
        let mut ctx = EvalContext::new(&graph);

        let start = BallState::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO);
        model.set_point(&graph, &mut ctx, &start, 0.3);
        let before = model.flight(&graph, &mut ctx, VEL_Y).value;
        let after = model.bounce(&graph, &mut ctx, VEL_Y).value;
        assert!(before < 0.0);
        assert!((after + coeffs.table.restitution * before).abs() < 1e-12);
    }
}
