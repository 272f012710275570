//! Hit search: choosing a stroke that lands the ball in play.
//!
//! A stroke is six numbers in `[0, 1]` (timing, bat speed, face pitch and
//! yaw, swing pitch and yaw), mapped through the striker's
//! [`StrokeRanges`](crate::strategy::StrokeRanges). For a candidate stroke
//! the model predicts the ball's flight, reads a handful of metrics
//! (landing spot, height over the net, apex) and scores how far each sits
//! outside its target band. The search is a damped Newton iteration on
//! that score, with exact gradients from the expression graph.
//!
//! ```text
//! prepare ─► HitWindow ─► HitModel + FlightModel ─► SearchProblem
//! search  ─► random u ─► evaluate ─► step ─► ... ─► HitPlan
//! ```

pub mod events;
pub mod model;
pub mod window;

pub use events::{EventFinder, FlightEvents, Metric};
pub use model::{FlightModel, HitEval, HitModel, DECISIONS};
pub use window::{HitWindow, WindowSample, WindowQuery};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::aim::{AgentLimits, Aim, BatPose};
use crate::collision::{Surface, SurfaceCoefficients};
use crate::config::SimConfig;
use crate::error::SearchError;
use crate::expr::{EvalContext, ExprGraph};
use crate::game::{GameState, State};
use crate::types::{BallState, PhysicsParams, TableState, Vec2};

// =============================================================================
// Settings
// =============================================================================

/// Numerical knobs of the hit search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Sampling tick of the hit window (s)
    pub sample_dt: f64,
    /// How far ahead the hit window is searched (s)
    pub horizon: f64,
    /// Ball clearance above the table required to strike (m)
    pub min_hit_clearance: f64,
    /// Minimum distance from the net plane to strike (m)
    pub min_hit_distance: f64,
    /// Longest flight considered when looking for the landing (s)
    pub landing_horizon: f64,
    /// Coarse scan step of the event finder (s)
    pub scan_step: f64,
    pub bisection_tolerance: f64,
    pub max_iterations: usize,
    /// Largest change of any decision variable per iteration
    pub max_step: f64,
    /// Restarts from fresh random starts before giving up
    pub max_attempts: usize,
    /// Objective of a stroke whose ball never lands
    pub no_landing_penalty: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            sample_dt: 0.002,
            horizon: 2.0,
            min_hit_clearance: 0.02,
            min_hit_distance: 0.1,
            landing_horizon: 3.0,
            scan_step: 0.01,
            bisection_tolerance: 1e-9,
            max_iterations: 100,
            max_step: 0.1,
            max_attempts: 30,
            no_landing_penalty: 1e3,
        }
    }
}

/// Allowed range for one metric, with the distance that counts as one unit
/// of violation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub min: f64,
    pub max: f64,
    pub scale: f64,
}

impl Band {
    pub fn new(min: f64, max: f64, scale: f64) -> Self {
        Self { min, max, scale }
    }

    /// Pull both ends inward by `fraction` of the scale.
    pub fn shrunk(&self, fraction: f64) -> Self {
        let margin = fraction * self.scale;
        Self::new(self.min + margin, self.max - margin, self.scale)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Scaled violation and its derivative with respect to `value`.
    pub fn residual(&self, value: f64) -> (f64, f64) {
        if value < self.min {
            ((self.min - value) / self.scale, -1.0 / self.scale)
        } else if value > self.max {
            ((value - self.max) / self.scale, 1.0 / self.scale)
        } else {
            (0.0, 0.0)
        }
    }
}

/// Where a good stroke sends the ball.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetBands {
    /// Closest landing to the net (m)
    pub near_margin: f64,
    /// Closest landing to the end line (m)
    pub far_margin: f64,
    pub depth_scale: f64,
    /// Closest landing to a side line (m)
    pub side_margin: f64,
    pub side_scale: f64,
    /// Gap between the ball and the net top (m)
    pub net_clearance: f64,
    pub net_scale: f64,
    /// Highest apex above the table (m)
    pub max_apex: f64,
    pub apex_scale: f64,
    /// Inward shift of every band in the objective, in units of its scale
    pub shrink: f64,
}

impl Default for TargetBands {
    fn default() -> Self {
        Self {
            near_margin: 0.25,
            far_margin: 0.2,
            depth_scale: 0.3,
            side_margin: 0.15,
            side_scale: 0.3,
            net_clearance: 0.04,
            net_scale: 0.1,
            max_apex: 0.6,
            apex_scale: 0.3,
            shrink: 0.15,
        }
    }
}

impl TargetBands {
    /// Landing distance from the net, measured into the half it lands on.
    pub fn depth(&self, table: &TableState) -> Band {
        Band::new(self.near_margin, table.half_length - self.far_margin, self.depth_scale)
    }

    pub fn side(&self, table: &TableState) -> Band {
        let limit = table.half_width - self.side_margin;
        Band::new(-limit, limit, self.side_scale)
    }

    pub fn net(&self, table: &TableState, radius: f64) -> Band {
        Band::new(
            table.net_top_y() + radius + self.net_clearance,
            f64::INFINITY,
            self.net_scale,
        )
    }

    pub fn apex(&self, table: &TableState) -> Band {
        Band::new(f64::NEG_INFINITY, table.surface_y() + self.max_apex, self.apex_scale)
    }
}

// =============================================================================
// Results
// =============================================================================

/// What the model expects the ball to do after the stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// Landing on the receiver's half
    pub landing: Vec2,
    /// Serve bounce on the server's own half
    pub first_bounce: Option<Vec2>,
    pub net_height: Option<f64>,
    pub apex: f64,
    /// Simulation time of the landing
    pub landing_time: f64,
}

/// An accepted stroke.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitPlan {
    pub aim: Aim,
    pub decision: [f64; DECISIONS],
    pub iterations: usize,
    pub hit_time: f64,
    pub post_hit: BallState,
    pub prediction: Prediction,
}

/// One scored decision vector.
#[derive(Debug, Clone, Copy)]
pub struct Evaluation {
    pub objective: f64,
    pub gradient: [f64; DECISIONS],
    /// Every metric inside its exact band
    pub accepted: bool,
    pub hit: HitEval,
    pub prediction: Option<Prediction>,
}

// =============================================================================
// Problem
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Bands {
    depth: Band,
    side: Band,
    net: Band,
    apex: Band,
    shrink: f64,
}

/// The part of a game snapshot a prepared problem depends on.
///
/// Two requests with equal keys share the hit window and the start pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotKey {
    pub agent: usize,
    pub game_state: GameState,
    pub ball: BallState,
    pub start: BatPose,
}

impl SnapshotKey {
    pub fn of(state: &State, agent: usize) -> Self {
        Self {
            agent,
            game_state: state.game_state(),
            ball: state.ball().state,
            start: state.agent(agent).pose(state.time()),
        }
    }
}

/// Everything fixed for one stroke decision: the window, the compiled
/// models and the striker's situation.
#[derive(Debug, Clone)]
pub struct SearchProblem {
    key: SnapshotKey,
    graph: ExprGraph,
    ctx: EvalContext,
    hit: HitModel,
    flight: FlightModel,
    window: HitWindow,
    agent: usize,
    side: f64,
    serve: bool,
    start: BatPose,
    limits: AgentLimits,
    params: PhysicsParams,
    settings: SearchSettings,
    landing_height: f64,
    bands: Bands,
}

impl SearchProblem {
    pub fn window(&self) -> &HitWindow {
        &self.window
    }

    pub fn agent(&self) -> usize {
        self.agent
    }

    /// Snapshot this problem was prepared from.
    pub fn key(&self) -> &SnapshotKey {
        &self.key
    }

    pub fn is_serve(&self) -> bool {
        self.serve
    }

    /// Bat pose the strike plan starts from.
    pub fn start_pose(&self) -> &BatPose {
        &self.start
    }

    pub fn graph_size(&self) -> usize {
        self.graph.len()
    }

    /// Score the decision vector `u`.
    pub fn evaluate(&mut self, u: &[f64; DECISIONS]) -> Result<Evaluation, SearchError> {
        let hit = self.hit.evaluate(&self.graph, &mut self.ctx, u);
        if !hit.post_hit.is_finite() || hit.jacobian.iter().flatten().any(|d| !d.is_finite()) {
            return Err(SearchError::NumericalDivergence("post-hit state"));
        }

        let finder = EventFinder {
            model: &self.flight,
            graph: &self.graph,
            params: &self.params,
            settings: &self.settings,
            landing_height: self.landing_height,
        };
        let bands = self.bands;
        let no_landing = Evaluation {
            objective: self.settings.no_landing_penalty,
            gradient: [0.0; DECISIONS],
            accepted: false,
            hit,
            prediction: None,
        };

        // Metrics paired with their bands, gradients against the post-hit state
        let mut metrics = Vec::with_capacity(6);
        let mut flight_start = hit.post_hit;
        let mut after_bounce = None;
        let mut first_bounce = None;
        let mut elapsed = 0.0;

        if self.serve {
            let Some(first) = finder.analyze(&mut self.ctx, &hit.post_hit)? else {
                return Ok(no_landing);
            };
            metrics.push((bands.depth, first.landing_x.scaled(self.side)));
            metrics.push((bands.side, first.landing_z));

            let (bounced, jacobian) = finder.bounce(&mut self.ctx, &hit.post_hit, &first)?;
            first_bounce = Some(Vec2::new(first.landing_x.value, first.landing_z.value));
            elapsed = first.landing_time;
            flight_start = bounced;
            after_bounce = Some(jacobian);
        }

        let Some(flight) = finder.analyze(&mut self.ctx, &flight_start)? else {
            return Ok(no_landing);
        };
        let to_hit = |metric: Metric| match &after_bounce {
            Some(jacobian) => metric.chained(jacobian),
            None => metric,
        };

        metrics.push((bands.depth, to_hit(flight.landing_x.scaled(-self.side))));
        metrics.push((bands.side, to_hit(flight.landing_z)));
        metrics.push((
            bands.net,
            flight.net_height.map_or(Metric::constant(-1.0), to_hit),
        ));
        metrics.push((bands.apex, to_hit(flight.apex)));

        let mut objective = 0.0;
        let mut gradient = [0.0; DECISIONS];
        let mut accepted = true;
        for (band, metric) in &metrics {
            accepted &= band.contains(metric.value);
            let (residual, slope) = band.shrunk(bands.shrink).residual(metric.value);
            objective += residual * residual;
            if residual == 0.0 {
                continue;
            }
            for (j, g) in gradient.iter_mut().enumerate() {
                let dm_du: f64 = metric
                    .grad
                    .iter()
                    .zip(&hit.jacobian)
                    .map(|(dm, row)| dm * row[j])
                    .sum();
                *g += 2.0 * residual * slope * dm_du;
            }
        }

        Ok(Evaluation {
            objective,
            gradient,
            accepted,
            hit,
            prediction: Some(Prediction {
                landing: Vec2::new(flight.landing_x.value, flight.landing_z.value),
                first_bounce,
                net_height: flight.net_height.map(|m| m.value),
                apex: flight.apex.value,
                landing_time: hit.hit_time + elapsed + flight.landing_time,
            }),
        })
    }
}

// =============================================================================
// Searcher
// =============================================================================

/// Runs hit searches against one scene configuration.
#[derive(Debug, Clone)]
pub struct HitSearcher {
    params: PhysicsParams,
    table: TableState,
    coefficients: SurfaceCoefficients,
    settings: SearchSettings,
    bands: TargetBands,
}

impl HitSearcher {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            params: config.physics,
            table: config.table,
            coefficients: config.coefficients,
            settings: config.search,
            bands: config.bands,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Sample the hit window for `agent` and compile the stroke model.
    pub fn prepare(&self, state: &State, agent: usize) -> Result<SearchProblem, SearchError> {
        let striker = state.agent(agent);
        let side = striker.side();
        let serve = state.game_state() == GameState::Serving;
        let ball = state.ball().state;

        let query = WindowQuery {
            params: &self.params,
            table: &self.table,
            table_surface: Surface::table(&self.table, self.coefficients.table),
            settings: &self.settings,
            side,
            serve,
        };
        let window = HitWindow::sample(&ball, state.time(), &query)?;
        let ranges = striker.strategy().ranges(serve, ball.pos.x.abs(), &self.table);

        let mut graph = ExprGraph::new();
        let hit = HitModel::build(&mut graph, &window, &ranges, side, &self.params, &self.coefficients.bat)?;
        let flight = FlightModel::build(&mut graph, &self.params, &self.coefficients.table);
        let ctx = EvalContext::new(&graph);

        tracing::debug!(
            agent,
            serve,
            samples = window.len(),
            first = window.first_time(),
            last = window.last_time(),
            nodes = graph.len(),
            "search problem prepared"
        );

        Ok(SearchProblem {
            key: SnapshotKey::of(state, agent),
            graph,
            ctx,
            hit,
            flight,
            window,
            agent,
            side,
            serve,
            start: striker.pose(state.time()),
            limits: striker.limits(),
            params: self.params,
            settings: self.settings,
            landing_height: self.table.surface_y() + self.params.radius,
            bands: Bands {
                depth: self.bands.depth(&self.table),
                side: self.bands.side(&self.table),
                net: self.bands.net(&self.table, self.params.radius),
                apex: self.bands.apex(&self.table),
                shrink: self.bands.shrink,
            },
        })
    }

    /// One attempt from a random starting stroke.
    pub fn search<R: Rng + ?Sized>(&self, problem: &mut SearchProblem, rng: &mut R) -> Result<HitPlan, SearchError> {
        let mut u = [0.0; DECISIONS];
        for value in u.iter_mut() {
            *value = rng.gen::<f64>();
        }

        let mut evaluation = problem.evaluate(&u)?;
        let reachable = Aim::new(&problem.start, &evaluation.hit.strike, &problem.limits);
        if !reachable.has_time_to_react() {
            return Err(SearchError::Infeasible);
        }

        let mut iterations = 0;
        loop {
            if !evaluation.objective.is_finite() {
                return Err(SearchError::NumericalDivergence("objective"));
            }

            if evaluation.accepted {
                if let Some(prediction) = evaluation.prediction {
                    let aim = Aim::new(&problem.start, &evaluation.hit.strike, &problem.limits);
                    if !aim.has_time_to_react() {
                        return Err(SearchError::Infeasible);
                    }
                    return Ok(HitPlan {
                        aim,
                        decision: u,
                        iterations,
                        hit_time: evaluation.hit.hit_time,
                        post_hit: evaluation.hit.post_hit,
                        prediction,
                    });
                }
            }

            if iterations >= self.settings.max_iterations {
                return Err(SearchError::Exhausted { iterations });
            }

            let norm_sq: f64 = evaluation.gradient.iter().map(|g| g * g).sum();
            if !(norm_sq > 0.0) || !norm_sq.is_finite() {
                return Err(SearchError::Stalled);
            }

            // Newton step toward a zero of the objective, capped per variable
            let factor = -evaluation.objective / norm_sq;
            let mut step = evaluation.gradient.map(|g| g * factor);
            let largest = step.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
            if largest > self.settings.max_step {
                let shrink = self.settings.max_step / largest;
                step = step.map(|s| s * shrink);
            }
            for (value, delta) in u.iter_mut().zip(step) {
                *value = (*value + delta).clamp(0.0, 1.0);
            }

            evaluation = problem.evaluate(&u)?;
            iterations += 1;
        }
    }

    /// Prepare once, then retry soft failures from fresh random starts.
    pub fn search_with_restarts<R: Rng + ?Sized>(
        &self,
        state: &State,
        agent: usize,
        rng: &mut R,
        attempts: usize,
    ) -> Result<HitPlan, SearchError> {
        let mut problem = self.prepare(state, agent)?;
        let mut last = SearchError::Exhausted { iterations: 0 };

        for attempt in 0..attempts {
            match self.search(&mut problem, rng) {
                Ok(plan) => {
                    tracing::info!(
                        agent,
                        attempt,
                        iterations = plan.iterations,
                        hit_time = plan.hit_time,
                        landing_x = plan.prediction.landing.x,
                        landing_z = plan.prediction.landing.z,
                        "hit plan found"
                    );
                    return Ok(plan);
                }
                Err(err) if err.is_soft() => {
                    tracing::debug!(agent, attempt, error = %err, "search attempt failed");
                    last = err;
                }
                Err(err) => return Err(err),
            }
        }

        tracing::warn!(agent, attempts, error = %last, "no hit plan");
        Err(last)
    }
}
