//! # TT Sim
//!
//! Decision and physics core for autonomous table tennis agents.
//!
//! ## Architecture
//!
//! - `types`: Core data structures (Vec3, Vec2, ball, table, physics parameters)
//! - `complex`: Complex exponential integral
//! - `expr`: Expression graph with memoised symbolic derivatives
//! - `algebra`: One interface over numbers and expression graphs
//! - `forces` / `integrator`: Aerodynamic forces and the explicit step
//! - `flight`: Closed-form flight between bounces
//! - `ball`: The simulated ball with its surface mark
//! - `collision`: Surfaces, swept detection and the contact impulse
//! - `aim`: Time-optimal bat motion (single axis and 3D)
//! - `strategy`: Play styles as decision-variable ranges
//! - `search`: Stroke optimisation against landing and clearance targets
//! - `game`: Rally state machine, agents and scoring
//! - `worker`: Background search thread per agent
//! - `config`: YAML scene and strategy loader
//! - `error`: Error types
//!
//! ## Example
//!
//! ```ignore
//! let config = Arc::new(ConfigLoader::new("config").load("default")?);
//! let strategy = Arc::new(StrategyKind::Balanced.strategy());
//! let mut state = State::new(config.clone(), [strategy.clone(), strategy]);
//! let searcher = HitSearcher::new(&config);
//!
//! state.request_aim(0, &searcher, &mut rng)?;
//! while state.game_state() != GameState::Failed {
//!     state.step(config.time_step);
//! }
//! ```

pub mod aim;
pub mod algebra;
pub mod ball;
pub mod collision;
pub mod complex;
pub mod config;
pub mod error;
pub mod expr;
pub mod flight;
pub mod forces;
pub mod game;
pub mod integrator;
pub mod search;
pub mod strategy;
pub mod types;
pub mod worker;

pub use aim::{AgentLimits, Aim, AimCoord, BatPose, CoordSolverKind};
pub use config::{ConfigLoader, SimConfig};
pub use error::{ConfigError, SearchError};
pub use game::{Agent, GameState, State};
pub use search::{HitPlan, HitSearcher};
pub use strategy::{Strategy, StrategyKind};
pub use worker::{SearchOutcome, SearchWorker};
