//! Rally state: the ball, two agents and the rules that judge contacts.
//!
//! [`State::step`] advances the ball against the table, net, floor and both
//! bats, then feeds every contact through the [`GameState`] machine:
//!
//! ```text
//! Serving ──server bat──► Served ──own half──► FlyingToTable ──far half──► FlyingToBat
//!                                                    ▲                         │
//!                                                    └──── expected bat ───────┘
//! any other contact, the floor or the net ──► Failed
//! ```

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::aim::{bat_normal, AgentLimits, Aim, BatPose};
use crate::ball::Ball;
use crate::collision::{Contact, Surface, SurfaceKind};
use crate::config::SimConfig;
use crate::error::SearchError;
use crate::search::{HitPlan, HitSearcher};
use crate::strategy::Strategy;
use crate::types::{BallState, Vec3};

/// Radius of the round bat face (m).
pub const BAT_RADIUS: f64 = 0.085;

/// Where the rally stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    /// Ball tossed, waiting for the server's bat
    Serving,
    /// Served, must bounce on the server's half first
    Served,
    /// Must bounce on the expected hitter's half
    FlyingToTable,
    /// Bounced, waiting for the expected hitter's bat
    FlyingToBat,
    /// Rally over
    Failed,
}

impl GameState {
    pub fn name(self) -> &'static str {
        match self {
            GameState::Serving => "serving",
            GameState::Served => "served",
            GameState::FlyingToTable => "flying_to_table",
            GameState::FlyingToBat => "flying_to_bat",
            GameState::Failed => "failed",
        }
    }
}

/// Placement of the ball and bats at the start of a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    /// Toss distance from the net (m)
    pub distance: f64,
    /// Toss height above the table (m)
    pub toss_height: f64,
    /// Toss offset across the table (m)
    pub lateral: f64,
    /// Server's bat relative to the ball; `x` points to the server's end line
    pub bat_offset: Vec3,
    /// Waiting spot, distance from the net (m)
    pub ready_distance: f64,
    /// Waiting spot, height above the table (m)
    pub ready_height: f64,
    /// Time allowed to get back to the waiting spot after a stroke (s)
    pub recovery_time: f64,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            distance: 1.55,
            toss_height: 0.3,
            lateral: 0.1,
            bat_offset: Vec3::new(0.1, -0.05, 0.0),
            ready_distance: 1.7,
            ready_height: 0.2,
            recovery_time: 0.5,
        }
    }
}

// =============================================================================
// Agent
// =============================================================================

/// One player: a bat that follows its current aim.
#[derive(Debug, Clone)]
pub struct Agent {
    side: f64,
    strategy: Arc<Strategy>,
    limits: AgentLimits,
    pos: Vec3,
    vel: Vec3,
    pitch: f64,
    yaw: f64,
    aim: Option<Aim>,
}

impl Agent {
    /// Agent defending the half with sign `side`.
    pub fn new(side: f64, strategy: Arc<Strategy>, limits: AgentLimits, pos: Vec3) -> Self {
        Self {
            side,
            strategy,
            limits,
            pos,
            vel: Vec3::ZERO,
            pitch: 0.0,
            yaw: 0.0,
            aim: None,
        }
    }

    pub fn side(&self) -> f64 {
        self.side
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn limits(&self) -> AgentLimits {
        self.limits
    }

    pub fn pos(&self) -> Vec3 {
        self.pos
    }

    pub fn vel(&self) -> Vec3 {
        self.vel
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    /// Unit normal of the bat face.
    pub fn normal(&self) -> Vec3 {
        bat_normal(self.pitch, self.yaw, self.side)
    }

    pub fn pose(&self, time: f64) -> BatPose {
        BatPose {
            pos: self.pos,
            vel: self.vel,
            pitch: self.pitch,
            yaw: self.yaw,
            time,
        }
    }

    pub fn aim(&self) -> Option<&Aim> {
        self.aim.as_ref()
    }

    /// Replace the current plan.
    pub fn set_aim(&mut self, aim: Aim) {
        self.aim = Some(aim);
    }

    pub fn clear_aim(&mut self) {
        self.aim = None;
    }

    fn place(&mut self, pos: Vec3) {
        self.pos = pos;
        self.vel = Vec3::ZERO;
        self.pitch = 0.0;
        self.yaw = 0.0;
        self.aim = None;
    }

    /// Move the bat to where the aim wants it at `time`.
    fn follow(&mut self, time: f64) {
        if let Some(aim) = &self.aim {
            let sample = aim.sample(time);
            self.pos = sample.pos;
            self.vel = sample.vel;
            self.pitch = sample.pitch;
            self.yaw = sample.yaw;
        }
    }

    fn surface(&self, index: usize, config: &SimConfig) -> Surface {
        Surface::bat(
            index,
            self.pos,
            self.vel,
            self.normal(),
            BAT_RADIUS,
            config.coefficients.bat,
        )
    }
}

// =============================================================================
// State
// =============================================================================

/// Everything that changes during a point.
#[derive(Debug, Clone)]
pub struct State {
    config: Arc<SimConfig>,
    ball: Ball,
    agents: [Agent; 2],
    time: f64,
    game_state: GameState,
    expected_hitter: usize,
    last_hitter: Option<usize>,
    score: [u32; 2],
    point_winner: Option<usize>,
}

impl State {
    /// Agent 0 plays from `x < 0`, agent 1 from `x > 0`. Agent 0 serves first.
    pub fn new(config: Arc<SimConfig>, strategies: [Arc<Strategy>; 2]) -> Self {
        let [first, second] = strategies;
        let limits = config.agent;
        let ball = Ball::new(BallState::default(), config.physics.radius);
        let mut state = Self {
            agents: [
                Agent::new(-1.0, first, limits, Vec3::ZERO),
                Agent::new(1.0, second, limits, Vec3::ZERO),
            ],
            config,
            ball,
            time: 0.0,
            game_state: GameState::Serving,
            expected_hitter: 0,
            last_hitter: None,
            score: [0, 0],
            point_winner: None,
        };
        state.reset_for_serve(0);
        state
    }

    /// Toss a new ball for `server` and put both bats in place. Score and
    /// time carry over.
    pub fn reset_for_serve(&mut self, server: usize) {
        let server = server.min(1);
        let serve = self.config.serve;
        let table = &self.config.table;
        let side = self.agents[server].side;

        let toss = Vec3::new(side * serve.distance, table.surface_y() + serve.toss_height, serve.lateral);
        self.ball = Ball::new(BallState::at_rest(toss), self.config.physics.radius);

        let offset = Vec3::new(side * serve.bat_offset.x, serve.bat_offset.y, serve.bat_offset.z);
        self.agents[server].place(toss + offset);
        let receiver = 1 - server;
        let ready = self.ready_position(receiver);
        self.agents[receiver].place(ready);

        self.game_state = GameState::Serving;
        self.expected_hitter = server;
        self.last_hitter = None;
        self.point_winner = None;

        tracing::debug!(server, time = self.time, "point reset for serve");
    }

    /// Advance by `dt`: move the ball, judge its contacts, move the bats.
    pub fn step(&mut self, dt: f64) -> Vec<Contact> {
        let config = Arc::clone(&self.config);
        let surfaces = [
            Surface::table(&config.table, config.coefficients.table),
            Surface::net(&config.table, config.coefficients.net),
            Surface::floor(config.coefficients.floor),
            self.agents[0].surface(0, &config),
            self.agents[1].surface(1, &config),
        ];

        let contacts = self.ball.step_with_surfaces(&config.physics, &surfaces, dt);
        self.time += dt;

        if !self.ball.state.is_finite() {
            tracing::error!(time = self.time, state = ?self.ball.state, "ball physics diverged");
            self.game_state = GameState::Failed;
            self.point_winner = None;
            return contacts;
        }

        for contact in &contacts {
            self.judge(contact);
        }

        for index in 0..2 {
            self.recover(index);
            self.agents[index].follow(self.time);
        }
        contacts
    }

    /// Plan a stroke for `agent` right now and hand it the aim.
    ///
    /// On failure the agent falls back to waiting at its ready spot.
    pub fn request_aim<R: Rng + ?Sized>(
        &mut self,
        agent: usize,
        searcher: &HitSearcher,
        rng: &mut R,
    ) -> Result<HitPlan, SearchError> {
        let attempts = searcher.settings().max_attempts;
        match searcher.search_with_restarts(self, agent, rng, attempts) {
            Ok(plan) => {
                self.agents[agent].set_aim(plan.aim.clone());
                Ok(plan)
            }
            Err(err) => {
                let aim = self.ready_aim(agent);
                self.agents[agent].set_aim(aim);
                Err(err)
            }
        }
    }

    /// Agent that has to play the ball next, if any.
    pub fn striker(&self) -> Option<usize> {
        match self.game_state {
            GameState::Serving | GameState::FlyingToTable | GameState::FlyingToBat => Some(self.expected_hitter),
            GameState::Served => Some(1 - self.expected_hitter),
            GameState::Failed => None,
        }
    }

    /// Plan that brings `agent` back to its waiting spot.
    pub fn ready_aim(&self, agent: usize) -> Aim {
        let rest = self.ready_position(agent);
        let pose = self.agents[agent].pose(self.time);
        Aim::ready(
            &pose,
            rest,
            0.0,
            0.0,
            self.time + self.config.serve.recovery_time,
            &self.agents[agent].limits,
        )
    }

    pub fn ready_position(&self, agent: usize) -> Vec3 {
        let serve = &self.config.serve;
        Vec3::new(
            self.agents[agent].side * serve.ready_distance,
            self.config.table.surface_y() + serve.ready_height,
            0.0,
        )
    }

    // Once a strike has passed, head back to the waiting spot.
    fn recover(&mut self, index: usize) {
        let finished = self.agents[index]
            .aim
            .as_ref()
            .is_some_and(|aim| self.time >= aim.target().time && aim.target().vel != Vec3::ZERO);
        if finished {
            let aim = self.ready_aim(index);
            self.agents[index].set_aim(aim);
        }
    }

    fn judge(&mut self, contact: &Contact) {
        let from = self.game_state;
        if from == GameState::Failed {
            return;
        }
        let expected = self.expected_hitter;
        let on_half = |agent: usize, state: &Self| contact.point.x * state.agents[agent].side > 0.0;

        let next = match (from, contact.kind) {
            (_, SurfaceKind::Floor | SurfaceKind::Net) => None,
            (GameState::Serving, SurfaceKind::Bat(i)) if i == expected => {
                self.last_hitter = Some(i);
                Some(GameState::Served)
            }
            (GameState::Served, SurfaceKind::Table) if on_half(expected, self) => {
                self.expected_hitter = 1 - expected;
                Some(GameState::FlyingToTable)
            }
            (GameState::FlyingToTable, SurfaceKind::Table) if on_half(expected, self) => {
                Some(GameState::FlyingToBat)
            }
            (GameState::FlyingToBat, SurfaceKind::Bat(i)) if i == expected => {
                self.last_hitter = Some(i);
                self.expected_hitter = 1 - i;
                Some(GameState::FlyingToTable)
            }
            _ => None,
        };

        match next {
            Some(to) => {
                tracing::debug!(from = from.name(), to = to.name(), contact = ?contact.kind, "rally transition");
                self.game_state = to;
            }
            None => self.fail(contact),
        }
    }

    fn fail(&mut self, contact: &Contact) {
        // A bat touching the ball out of turn loses the point. Otherwise
        // whoever sent the ball is at fault until it reaches the expected half.
        let at_fault = match (contact.kind, self.game_state, self.last_hitter) {
            (SurfaceKind::Bat(toucher), _, _) => toucher,
            (_, GameState::Served | GameState::FlyingToTable, Some(hitter)) => hitter,
            _ => self.expected_hitter,
        };
        let winner = 1 - at_fault;
        self.score[winner] += 1;
        self.point_winner = Some(winner);

        tracing::info!(
            from = self.game_state.name(),
            contact = ?contact.kind,
            winner,
            score = ?self.score,
            "point over"
        );
        self.game_state = GameState::Failed;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn agent(&self, index: usize) -> &Agent {
        &self.agents[index]
    }

    pub fn agent_mut(&mut self, index: usize) -> &mut Agent {
        &mut self.agents[index]
    }

    pub fn agents(&self) -> &[Agent; 2] {
        &self.agents
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    pub fn expected_hitter(&self) -> usize {
        self.expected_hitter
    }

    pub fn last_hitter(&self) -> Option<usize> {
        self.last_hitter
    }

    pub fn score(&self) -> [u32; 2] {
        self.score
    }

    pub fn point_winner(&self) -> Option<usize> {
        self.point_winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyKind;

    fn state() -> State {
        let strategy = Arc::new(StrategyKind::Balanced.strategy());
        State::new(Arc::new(SimConfig::default()), [strategy.clone(), strategy])
    }

    fn contact(kind: SurfaceKind, x: f64) -> Contact {
        Contact {
            kind,
            time: 0.0,
            point: Vec3::new(x, 0.76, 0.0),
            normal: Vec3::UNIT_Y,
        }
    }

    #[test]
    fn test_reset_places_ball_and_bats() {
        let state = state();
        let ball = state.ball().state;
        assert_eq!(state.game_state(), GameState::Serving);
        assert!((ball.pos - Vec3::new(-1.55, 1.06, 0.1)).magnitude() < 1e-12);
        assert_eq!(ball.vel, Vec3::ZERO);

        let server = state.agent(0);
        assert!((server.pos() - Vec3::new(-1.65, 1.01, 0.1)).magnitude() < 1e-12);
        assert!(state.agent(1).pos().x > 0.0, "receiver waits on its own half");
        assert_eq!(state.striker(), Some(0));
    }

    #[test]
    fn test_full_rally_transitions() {
        let mut state = state();
        state.judge(&contact(SurfaceKind::Bat(0), -1.6));
        assert_eq!(state.game_state(), GameState::Served);
        assert_eq!(state.striker(), Some(1));

        state.judge(&contact(SurfaceKind::Table, -0.8));
        assert_eq!(state.game_state(), GameState::FlyingToTable);
        assert_eq!(state.expected_hitter(), 1);

        state.judge(&contact(SurfaceKind::Table, 0.9));
        assert_eq!(state.game_state(), GameState::FlyingToBat);

        state.judge(&contact(SurfaceKind::Bat(1), 1.6));
        assert_eq!(state.game_state(), GameState::FlyingToTable);
        assert_eq!(state.expected_hitter(), 0);
        assert_eq!(state.last_hitter(), Some(1));
        assert_eq!(state.point_winner(), None);
    }

    #[test]
    fn test_serve_landing_on_far_half_loses_point() {
        let mut state = state();
        state.judge(&contact(SurfaceKind::Bat(0), -1.6));
        state.judge(&contact(SurfaceKind::Table, 0.7));
        assert_eq!(state.game_state(), GameState::Failed);
        assert_eq!(state.point_winner(), Some(1), "server did not bounce on its own half");
        assert_eq!(state.score(), [0, 1]);
    }

    #[test]
    fn test_double_bounce_is_receiver_fault() {
        let mut state = state();
        for c in [
            contact(SurfaceKind::Bat(0), -1.6),
            contact(SurfaceKind::Table, -0.8),
            contact(SurfaceKind::Table, 0.9),
            contact(SurfaceKind::Table, 1.2),
        ] {
            state.judge(&c);
        }
        assert_eq!(state.game_state(), GameState::Failed);
        assert_eq!(state.point_winner(), Some(0));
    }

    #[test]
    fn test_volley_before_bounce_is_receiver_fault() {
        let mut state = state();
        state.judge(&contact(SurfaceKind::Bat(0), -1.6));
        state.judge(&contact(SurfaceKind::Table, -0.8));
        assert_eq!(state.game_state(), GameState::FlyingToTable);

        // Receiver takes the ball out of the air over its own half
        state.judge(&contact(SurfaceKind::Bat(1), 0.5));
        assert_eq!(state.game_state(), GameState::Failed);
        assert_eq!(state.point_winner(), Some(0), "volley gives the point to the server");
        assert_eq!(state.score(), [1, 0]);
    }

    #[test]
    fn test_double_hit_is_hitter_fault() {
        let mut state = state();
        state.judge(&contact(SurfaceKind::Bat(0), -1.6));
        state.judge(&contact(SurfaceKind::Bat(0), -1.55));
        assert_eq!(state.point_winner(), Some(1));
    }

    #[test]
    fn test_missed_toss_and_net_faults() {
        let mut state = state();
        state.judge(&contact(SurfaceKind::Table, -1.5));
        assert_eq!(state.point_winner(), Some(1), "server let the toss drop");

        state.reset_for_serve(1);
        state.judge(&contact(SurfaceKind::Bat(1), 1.6));
        state.judge(&contact(SurfaceKind::Table, 0.8));
        state.judge(&contact(SurfaceKind::Net, 0.0));
        assert_eq!(state.point_winner(), Some(0), "ball into the net is the hitter's fault");
        assert_eq!(state.score(), [1, 1]);

        // Contacts after the point is over change nothing
        state.judge(&contact(SurfaceKind::Floor, 2.0));
        assert_eq!(state.score(), [1, 1]);
    }

    #[test]
    fn test_untouched_toss_fails_on_step() {
        let mut state = state();
        let mut contacts = Vec::new();
        for _ in 0..200 {
            contacts.extend(state.step(0.002));
        }
        assert!(
            contacts.iter().any(|c| c.kind == SurfaceKind::Table),
            "toss falls on the table"
        );
        assert_eq!(state.game_state(), GameState::Failed);
        assert_eq!(state.point_winner(), Some(1));
        assert!((state.time() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_divergence_ends_point_without_winner() {
        let mut state = state();
        state.ball.state.vel = Vec3::new(f64::NAN, 0.0, 0.0);
        state.step(0.002);
        assert_eq!(state.game_state(), GameState::Failed);
        assert_eq!(state.point_winner(), None);
        assert_eq!(state.score(), [0, 0]);
    }

    #[test]
    fn test_agent_follows_aim() {
        let mut state = state();
        let target = state.ready_position(0);
        let aim = state.ready_aim(0);
        state.agent_mut(0).set_aim(aim);
        for _ in 0..300 {
            state.step(0.002);
        }
        assert!((state.agent(0).pos() - target).magnitude() < 1e-6);
        assert_eq!(state.agent(0).vel(), Vec3::ZERO);
    }
}
