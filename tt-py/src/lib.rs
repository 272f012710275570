//! Python bindings for the tt-sim table tennis core.
//!
//! Provides a simple Python API:
//!
//! ```python
//! from tt_rally import Simulation, init_logging
//!
//! init_logging("info")
//! sim = Simulation(strategies=("attacking", "defensive"), seed=3)
//! sim.serve(0)
//!
//! while sim.game_state() != "failed":
//!     sim.step()
//!     pos = sim.ball_position()
//!     print(f"Ball at ({pos.x}, {pos.y}, {pos.z})")
//! print(sim.score())
//! ```

use std::sync::Arc;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing_subscriber::EnvFilter;

use tt_sim::aim::{CoordPoint, CoordSolverKind};
use tt_sim::collision::SurfaceKind;
use tt_sim::types::Vec3 as CoreVec3;
use tt_sim::{ConfigLoader, HitPlan, HitSearcher, SearchWorker, SimConfig, State, Strategy};

/// 3D vector for positions, velocities, etc.
#[pyclass]
#[derive(Clone, Copy)]
pub struct Vec3 {
    #[pyo3(get, set)]
    pub x: f64,
    #[pyo3(get, set)]
    pub y: f64,
    #[pyo3(get, set)]
    pub z: f64,
}

#[pymethods]
impl Vec3 {
    #[new]
    fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn __repr__(&self) -> String {
        format!("Vec3({:.4}, {:.4}, {:.4})", self.x, self.y, self.z)
    }

    fn magnitude(&self) -> f64 {
        CoreVec3::from(*self).magnitude()
    }

    fn to_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }
}

impl From<CoreVec3> for Vec3 {
    fn from(v: CoreVec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vec3> for CoreVec3 {
    fn from(v: Vec3) -> Self {
        CoreVec3::new(v.x, v.y, v.z)
    }
}

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Install a `tracing` subscriber filtered by `filter` (e.g. "debug" or
/// "tt_sim::search=debug"). `RUST_LOG` wins when set.
#[pyfunction]
#[pyo3(signature = (filter = "info"))]
fn init_logging(filter: &str) -> PyResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(value_error)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

/// Plan a single-axis bat move and describe it.
#[pyfunction]
#[pyo3(signature = (start, end, max_acceleration = 60.0, solver = "optimal_path"))]
fn plan_axis(
    py: Python<'_>,
    start: (f64, f64, f64),
    end: (f64, f64, f64),
    max_acceleration: f64,
    solver: &str,
) -> PyResult<PyObject> {
    let kind = CoordSolverKind::from_name(solver)
        .ok_or_else(|| PyValueError::new_err(format!("unknown solver: {}", solver)))?;
    let coord = kind.solve(
        CoordPoint::new(start.0, start.1, start.2),
        CoordPoint::new(end.0, end.1, end.2),
        max_acceleration,
    );
    let (c1, c2) = coord.signs();

    let dict = PyDict::new(py);
    dict.set_item("tau1", coord.tau1())?;
    dict.set_item("tau2", coord.tau2())?;
    dict.set_item("c1", c1)?;
    dict.set_item("c2", c2)?;
    dict.set_item("acceleration", coord.force_coefficient())?;
    dict.set_item("duration", coord.duration())?;
    dict.set_item("min_move_time", coord.min_move_time())?;
    dict.set_item("peak_speed", coord.peak_speed())?;
    dict.set_item("has_time_to_react", coord.has_time_to_react())?;
    Ok(dict.into_any().unbind())
}

/// A rally between two autonomous agents.
///
/// Each agent plans its strokes on its own background thread; `step` only
/// collects finished plans and advances the physics.
#[pyclass]
pub struct Simulation {
    config: Arc<SimConfig>,
    state: State,
    workers: [SearchWorker; 2],
    /// Stroke number each agent last asked a plan for
    requested: [Option<u32>; 2],
    generations: [u64; 2],
    plans: [Option<HitPlan>; 2],
    stroke: u32,
}

#[pymethods]
impl Simulation {
    /// Create a simulation.
    ///
    /// `config_dir` points at a directory with `default.yaml` and
    /// `strategies/`; without it the built-in defaults are used.
    #[new]
    #[pyo3(signature = (strategies = None, config_dir = None, seed = 0))]
    fn new(strategies: Option<(String, String)>, config_dir: Option<String>, seed: u64) -> PyResult<Self> {
        let loader = ConfigLoader::new(config_dir.as_deref().unwrap_or("config"));
        let config = match &config_dir {
            Some(_) => loader.load("default").map_err(value_error)?,
            None => SimConfig::default(),
        };
        let [first, second] = match strategies {
            Some((a, b)) => [a, b],
            None => config.strategies.clone(),
        };
        let load = |name: &str| -> PyResult<Arc<Strategy>> {
            Ok(Arc::new(loader.load_strategy(name).map_err(value_error)?))
        };
        let strategies = [load(&first)?, load(&second)?];

        let config = Arc::new(config);
        let searcher = HitSearcher::new(&config);
        let spawn = |index: u64| {
            SearchWorker::spawn(&format!("agent{}", index), searcher.clone(), seed.wrapping_add(index))
                .map_err(|e| PyRuntimeError::new_err(e.to_string()))
        };
        let workers = [spawn(0)?, spawn(1)?];

        Ok(Self {
            state: State::new(Arc::clone(&config), strategies),
            config,
            workers,
            requested: [None, None],
            generations: [0, 0],
            plans: [None, None],
            stroke: 0,
        })
    }

    /// Toss a new ball for `server` (0 or 1).
    fn serve(&mut self, server: usize) -> PyResult<()> {
        if server > 1 {
            return Err(PyValueError::new_err("server must be 0 or 1"));
        }
        for worker in &self.workers {
            worker.stop_searching();
        }
        self.state.reset_for_serve(server);
        self.requested = [None, None];
        self.plans = [None, None];
        self.stroke = 0;
        self.request_strike();
        Ok(())
    }

    /// Advance one simulation tick.
    fn step(&mut self) {
        self.collect_plans();
        let contacts = self.state.step(self.config.time_step);
        if contacts.iter().any(|c| matches!(c.kind, SurfaceKind::Bat(_))) {
            self.stroke += 1;
        }
        self.request_strike();
    }

    /// Run multiple ticks at once (more efficient).
    fn step_n(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Current simulation time in seconds.
    #[getter]
    fn time(&self) -> f64 {
        self.state.time()
    }

    #[getter]
    fn time_step(&self) -> f64 {
        self.config.time_step
    }

    fn game_state(&self) -> &'static str {
        self.state.game_state().name()
    }

    fn score(&self) -> (u32, u32) {
        let [a, b] = self.state.score();
        (a, b)
    }

    fn point_winner(&self) -> Option<usize> {
        self.state.point_winner()
    }

    fn ball_position(&self) -> Vec3 {
        self.state.ball().state.pos.into()
    }

    fn ball_velocity(&self) -> Vec3 {
        self.state.ball().state.vel.into()
    }

    /// Ball spin in rad/s.
    fn ball_spin(&self) -> Vec3 {
        self.state.ball().state.spin.into()
    }

    /// Surface mark in world coordinates, for drawing the spin.
    fn ball_mark(&self) -> Vec3 {
        self.state.ball().mark_world().into()
    }

    fn agent_position(&self, index: usize) -> PyResult<Vec3> {
        Ok(self.agent(index)?.pos().into())
    }

    fn agent_normal(&self, index: usize) -> PyResult<Vec3> {
        Ok(self.agent(index)?.normal().into())
    }

    /// Predicted landing `(x, z)` of the agent's current plan.
    fn predicted_landing(&self, index: usize) -> PyResult<Option<(f64, f64)>> {
        self.agent(index)?;
        Ok(self.plans[index]
            .as_ref()
            .map(|plan| (plan.prediction.landing.x, plan.prediction.landing.z)))
    }

    /// Get current state as dict for easy inspection.
    fn state_dict(&self, py: Python<'_>) -> PyResult<PyObject> {
        let ball = self.state.ball();
        let dict = PyDict::new(py);
        dict.set_item("time", self.state.time())?;
        dict.set_item("game_state", self.state.game_state().name())?;
        dict.set_item("score", self.score())?;
        dict.set_item("point_winner", self.state.point_winner())?;
        dict.set_item("expected_hitter", self.state.expected_hitter())?;
        dict.set_item("ball_pos", Vec3::from(ball.state.pos).to_tuple())?;
        dict.set_item("ball_vel", Vec3::from(ball.state.vel).to_tuple())?;
        dict.set_item("ball_spin", Vec3::from(ball.state.spin).to_tuple())?;
        dict.set_item("ball_mark", Vec3::from(ball.mark_world()).to_tuple())?;

        let agents = pyo3::types::PyList::empty(py);
        for agent in self.state.agents() {
            let entry = PyDict::new(py);
            entry.set_item("side", agent.side())?;
            entry.set_item("strategy", agent.strategy().name.as_str())?;
            entry.set_item("pos", Vec3::from(agent.pos()).to_tuple())?;
            entry.set_item("vel", Vec3::from(agent.vel()).to_tuple())?;
            entry.set_item("normal", Vec3::from(agent.normal()).to_tuple())?;
            entry.set_item("pitch", agent.pitch())?;
            entry.set_item("yaw", agent.yaw())?;
            entry.set_item("has_aim", agent.aim().is_some())?;
            agents.append(entry)?;
        }
        dict.set_item("agents", agents)?;
        Ok(dict.into_any().unbind())
    }
}

impl Simulation {
    fn agent(&self, index: usize) -> PyResult<&tt_sim::Agent> {
        self.state
            .agents()
            .get(index)
            .ok_or_else(|| PyValueError::new_err(format!("no agent {}", index)))
    }

    // Hand finished plans to their agents
    fn collect_plans(&mut self) {
        for index in 0..2 {
            let Some(outcome) = self.workers[index].poll() else {
                continue;
            };
            if outcome.generation != self.generations[index] {
                continue;
            }
            match outcome.result {
                Ok(plan) => {
                    self.state.agent_mut(index).set_aim(plan.aim.clone());
                    self.plans[index] = Some(plan);
                }
                Err(err) => {
                    tracing::debug!(agent = index, error = %err, "falling back to ready position");
                    let aim = self.state.ready_aim(index);
                    self.state.agent_mut(index).set_aim(aim);
                    self.plans[index] = None;
                }
            }
        }
    }

    // Ask the next striker for a plan, once per stroke
    fn request_strike(&mut self) {
        let Some(striker) = self.state.striker() else {
            return;
        };
        if self.requested[striker] == Some(self.stroke) {
            return;
        }
        self.requested[striker] = Some(self.stroke);
        self.generations[striker] = self.workers[striker].start_searching(&self.state, striker, true);
    }
}

/// Python module definition.
#[pymodule]
fn tt_rally(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Vec3>()?;
    m.add_class::<Simulation>()?;
    m.add_function(wrap_pyfunction!(plan_axis, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    Ok(())
}
