//! Flight events and their sensitivities.
//!
//! Event times are found numerically on the closed-form trajectory: a coarse
//! scan for the first sign change, then bisection. The derivative of a
//! quantity `m` read at an event time `T*(s)` defined by `g(s, T*) = 0`
//! follows from the implicit function theorem:
//!
//! ```text
//! dm/ds = ∂m/∂s - ∂m/∂T · (∂g/∂s) / (∂g/∂T)
//! ```

use crate::algebra::Numeric;
use crate::error::SearchError;
use crate::expr::{EvalContext, ExprGraph};
use crate::flight::simplified_flight;
use crate::search::model::{FlightModel, Partials, StateJacobian, POS_X, POS_Y, POS_Z, STATE, VEL_Y};
use crate::search::SearchSettings;
use crate::types::{BallState, PhysicsParams};

/// `|∂g/∂T|` below this makes an event time ill-defined.
const MIN_EVENT_RATE: f64 = 1e-12;

/// A scalar outcome and its gradient with respect to a flight start state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub value: f64,
    pub grad: [f64; STATE],
}

impl Metric {
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            grad: [0.0; STATE],
        }
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self {
            value: self.value * k,
            grad: self.grad.map(|g| g * k),
        }
    }

    /// Re-express the gradient against an earlier state, given
    /// `jacobian[i][j] = d(later_i)/d(earlier_j)`.
    pub fn chained(&self, jacobian: &StateJacobian) -> Self {
        let mut grad = [0.0; STATE];
        for (g, row) in self.grad.iter().zip(jacobian) {
            for (out, d) in grad.iter_mut().zip(row) {
                *out += g * d;
            }
        }
        Self {
            value: self.value,
            grad,
        }
    }
}

/// Everything the search reads from one flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightEvents {
    /// Flight time to the landing
    pub landing_time: f64,
    pub landing_x: Metric,
    pub landing_z: Metric,
    /// Ball height when crossing the net plane, if it does
    pub net_height: Option<Metric>,
    pub apex: Metric,
    landing_time_grad: [f64; STATE],
}

/// Shared inputs of the event finders.
pub struct EventFinder<'a> {
    pub model: &'a FlightModel,
    pub graph: &'a ExprGraph,
    pub params: &'a PhysicsParams,
    pub settings: &'a SearchSettings,
    /// Height of the ball center when touching the table
    pub landing_height: f64,
}

impl EventFinder<'_> {
    fn trajectory(&self, start: &BallState) -> impl Fn(f64) -> BallState + '_ {
        let terms = (*start).into();
        move |t| simplified_flight(&mut Numeric, self.params, &terms, t).into()
    }

    /// Find the landing and read every flight metric from `start`.
    ///
    /// `Ok(None)` when the ball does not come down within the horizon.
    pub fn analyze(&self, ctx: &mut EvalContext, start: &BallState) -> Result<Option<FlightEvents>, SearchError> {
        let settings = self.settings;
        let at = self.trajectory(start);

        let Some(landing_time) = descending_crossing(
            |t| at(t).pos.y - self.landing_height,
            settings.landing_horizon,
            settings.scan_step,
            settings.bisection_tolerance,
        ) else {
            return Ok(None);
        };

        self.model.set_point(self.graph, ctx, start, landing_time);
        let height = self.model.flight(self.graph, ctx, POS_Y);
        let landing_time_grad = event_time_gradient(&height)?;
        let landing_x = self.read_at_event(ctx, POS_X, &landing_time_grad);
        let landing_z = self.read_at_event(ctx, POS_Z, &landing_time_grad);

        // Net plane is only crossed when the ball changes halves
        let net_height = if start.pos.x * landing_x.value < 0.0 {
            match first_sign_change(
                |t| at(t).pos.x,
                landing_time,
                settings.scan_step,
                settings.bisection_tolerance,
            ) {
                Some(t) => Some(self.metric_at(ctx, start, t, POS_X, POS_Y)?),
                None => None,
            }
        } else {
            None
        };

        let apex = if start.vel.y > 0.0 {
            match first_sign_change(
                |t| at(t).vel.y,
                landing_time,
                settings.scan_step,
                settings.bisection_tolerance,
            ) {
                Some(t) => self.metric_at(ctx, start, t, VEL_Y, POS_Y)?,
                None => start_height(start),
            }
        } else {
            start_height(start)
        };

        Ok(Some(FlightEvents {
            landing_time,
            landing_x,
            landing_z,
            net_height,
            apex,
            landing_time_grad,
        }))
    }

    /// Ball state right after the landing bounce and its Jacobian against
    /// the flight start state.
    pub fn bounce(
        &self,
        ctx: &mut EvalContext,
        start: &BallState,
        events: &FlightEvents,
    ) -> Result<(BallState, StateJacobian), SearchError> {
        self.model.set_point(self.graph, ctx, start, events.landing_time);
        let mut values = [0.0; STATE];
        let mut jacobian = [[0.0; STATE]; STATE];
        for (component, (value, row)) in values.iter_mut().zip(jacobian.iter_mut()).enumerate() {
            let p = self.model.bounce(self.graph, ctx, component);
            *value = p.value;
            *row = total_gradient(&p, &events.landing_time_grad).grad;
        }

        let state = BallState::from_array(&values);
        if !state.is_finite() || jacobian.iter().flatten().any(|d| !d.is_finite()) {
            return Err(SearchError::NumericalDivergence("table bounce"));
        }
        Ok((state, jacobian))
    }

    fn read_at_event(&self, ctx: &mut EvalContext, component: usize, time_grad: &[f64; STATE]) -> Metric {
        let p = self.model.flight(self.graph, ctx, component);
        total_gradient(&p, time_grad)
    }

    /// Read `component` at the root of `event` found at time `t`.
    fn metric_at(
        &self,
        ctx: &mut EvalContext,
        start: &BallState,
        t: f64,
        event: usize,
        component: usize,
    ) -> Result<Metric, SearchError> {
        self.model.set_point(self.graph, ctx, start, t);
        let condition = self.model.flight(self.graph, ctx, event);
        let time_grad = event_time_gradient(&condition)?;
        Ok(self.read_at_event(ctx, component, &time_grad))
    }
}

fn start_height(start: &BallState) -> Metric {
    let mut grad = [0.0; STATE];
    grad[POS_Y] = 1.0;
    Metric {
        value: start.pos.y,
        grad,
    }
}

/// dT*/ds for the event `condition(s, T*) = 0`.
fn event_time_gradient(condition: &Partials) -> Result<[f64; STATE], SearchError> {
    if !(condition.dt.abs() > MIN_EVENT_RATE) {
        return Err(SearchError::NumericalDivergence("event time"));
    }
    Ok(condition.ds.map(|d| -d / condition.dt))
}

fn total_gradient(p: &Partials, time_grad: &[f64; STATE]) -> Metric {
    let mut grad = p.ds;
    for (g, dt) in grad.iter_mut().zip(time_grad) {
        *g += p.dt * dt;
    }
    Metric { value: p.value, grad }
}

/// Bisect `[lo, hi]` where `f` changes sign, down to `tolerance`.
fn bisect(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64, tolerance: f64) -> f64 {
    let positive_low = f(lo) > 0.0;
    while hi - lo > tolerance {
        let mid = 0.5 * (lo + hi);
        if (f(mid) > 0.0) == positive_low {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// First time in `(step, horizon]` where `f` goes from positive to
/// non-positive.
///
/// The scan starts one step in, so a ball resting on the level at `t = 0`
/// is not reported.
pub fn descending_crossing(f: impl Fn(f64) -> f64, horizon: f64, step: f64, tolerance: f64) -> Option<f64> {
    let mut t = step;
    let mut before = f(t);
    while t < horizon {
        let next = (t + step).min(horizon);
        let after = f(next);
        if before > 0.0 && after <= 0.0 {
            return Some(bisect(&f, t, next, tolerance));
        }
        t = next;
        before = after;
    }
    None
}

/// First sign change of `f` on `[0, horizon]`.
pub fn first_sign_change(f: impl Fn(f64) -> f64, horizon: f64, step: f64, tolerance: f64) -> Option<f64> {
    let mut t = 0.0;
    let mut before = f(t);
    while t < horizon {
        let next = (t + step).min(horizon);
        let after = f(next);
        if (before > 0.0) != (after > 0.0) {
            return Some(bisect(&f, t, next, tolerance));
        }
        t = next;
        before = after;
    }
    None
}
