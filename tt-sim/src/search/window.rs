//! The stretch of the incoming trajectory where the ball can be struck.

use crate::collision::{step_with_surfaces, Surface, SurfaceKind};
use crate::error::SearchError;
use crate::expr::PointTable;
use crate::search::SearchSettings;
use crate::types::{BallState, PhysicsParams, TableState};

/// Ball state at one sampled instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    pub time: f64,
    pub state: BallState,
}

/// First contiguous run of hittable samples, in simulation time.
#[derive(Debug, Clone, PartialEq)]
pub struct HitWindow {
    samples: Vec<WindowSample>,
}

/// What the window sampler needs to know about the stroke.
#[derive(Debug, Clone, Copy)]
pub struct WindowQuery<'a> {
    pub params: &'a PhysicsParams,
    pub table: &'a TableState,
    pub table_surface: Surface,
    pub settings: &'a SearchSettings,
    /// -1 or +1, the half of the table the striker defends
    pub side: f64,
    pub serve: bool,
}

impl HitWindow {
    /// Follow the ball with full physics and table bounces from `start_time`
    /// and keep the first run of samples where it can be struck.
    ///
    /// A sample is hittable when the ball is clear of the table, on the
    /// striker's side of the net, and (outside of a serve) has already
    /// bounced on the striker's half.
    pub fn sample(ball: &BallState, start_time: f64, query: &WindowQuery<'_>) -> Result<Self, SearchError> {
        let settings = query.settings;
        let min_height = query.table.surface_y() + query.params.radius + settings.min_hit_clearance;
        let surfaces = [query.table_surface];

        let mut state = *ball;
        let mut elapsed = 0.0;
        let mut bounced = false;
        let mut samples = Vec::new();

        while elapsed < settings.horizon {
            let outcome = step_with_surfaces(&state, query.params, &surfaces, settings.sample_dt);
            state = outcome.state;
            elapsed += settings.sample_dt;

            if !state.is_finite() {
                return Err(SearchError::NumericalDivergence("hit window"));
            }
            bounced |= outcome
                .contacts
                .iter()
                .any(|c| c.kind == SurfaceKind::Table && c.point.x * query.side > 0.0);

            let hittable = state.pos.y > min_height
                && state.pos.x * query.side > settings.min_hit_distance
                && (query.serve || bounced);

            if hittable {
                samples.push(WindowSample {
                    time: start_time + elapsed,
                    state,
                });
            } else if !samples.is_empty() {
                break;
            }
        }

        if samples.is_empty() {
            return Err(SearchError::NoHittableWindow);
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[WindowSample] {
        &self.samples
    }

    pub fn first_time(&self) -> f64 {
        self.samples.first().map_or(0.0, |s| s.time)
    }

    pub fn last_time(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.time)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One piecewise-linear table per state component, over time.
    pub fn component_tables(&self) -> Result<Vec<PointTable>, SearchError> {
        let times: Vec<f64> = self.samples.iter().map(|s| s.time).collect();
        (0..9)
            .map(|component| {
                let values = self.samples.iter().map(|s| s.state.to_array()[component]).collect();
                PointTable::new(times.clone(), values).ok_or(SearchError::NoHittableWindow)
            })
            .collect()
    }

    /// Linear interpolation of the sampled states.
    pub fn state_at(&self, time: f64) -> BallState {
        let Some(first) = self.samples.first() else {
            return BallState::default();
        };
        if time <= first.time {
            return first.state;
        }
        for pair in self.samples.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time {
                let w = (time - a.time) / (b.time - a.time);
                return BallState::new(
                    a.state.pos.lerp(&b.state.pos, w),
                    a.state.vel.lerp(&b.state.vel, w),
                    a.state.spin.lerp(&b.state.spin, w),
                );
            }
        }
        self.samples[self.samples.len() - 1].state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::SurfaceCoefficients;
    use crate::types::Vec3;

    fn query<'a>(
        params: &'a PhysicsParams,
        table: &'a TableState,
        settings: &'a SearchSettings,
        serve: bool,
    ) -> WindowQuery<'a> {
        WindowQuery {
            params,
            table,
            table_surface: Surface::table(table, SurfaceCoefficients::default().table),
            settings,
            side: -1.0,
            serve,
        }
    }

    #[test]
    fn test_serve_toss_window() {
        let params = PhysicsParams::default();
        let table = TableState::default();
        let settings = SearchSettings::default();
        let ball = BallState::at_rest(Vec3::new(-1.55, table.surface_y() + 0.3, 0.1));

        let window = HitWindow::sample(&ball, 5.0, &query(&params, &table, &settings, true))
            .expect("a tossed ball is hittable while it falls");

        assert!((window.first_time() - 5.002).abs() < 1e-9, "window starts at the first tick");
        // Falls ~0.26m before dropping below the clearance height
        let fall = window.last_time() - 5.0;
        assert!(fall > 0.2 && fall < 0.25, "window length {}", fall);
        for sample in window.samples() {
            assert!(sample.state.pos.y > table.surface_y() + params.radius + 0.02);
        }
    }

    #[test]
    fn test_rally_window_needs_bounce_on_own_half() {
        let params = PhysicsParams::default();
        let table = TableState::default();
        let settings = SearchSettings::default();
        let ball = BallState::new(
            Vec3::new(1.0, table.surface_y() + 0.3, 0.1),
            Vec3::new(-5.0, 0.5, -0.2),
            Vec3::new(0.0, 0.0, 30.0),
        );

        let window = HitWindow::sample(&ball, 0.0, &query(&params, &table, &settings, false))
            .expect("incoming ball bounces and rises on the striker's half");

        // The first samples are after the bounce, not on the way in
        let first = window.samples()[0].state;
        assert!(first.pos.x < -0.1);
        let bounce_time = window.first_time();
        assert!(bounce_time > 0.2, "sampling should skip the approach, got {}", bounce_time);
    }

    #[test]
    fn test_ball_leaving_gives_no_window() {
        let params = PhysicsParams::default();
        let table = TableState::default();
        let settings = SearchSettings::default();
        // Flying away from the striker
        let ball = BallState::new(Vec3::new(0.5, 1.0, 0.0), Vec3::new(5.0, 1.0, 0.0), Vec3::ZERO);

        let result = HitWindow::sample(&ball, 0.0, &query(&params, &table, &settings, false));
        assert_eq!(result, Err(SearchError::NoHittableWindow));
    }

    #[test]
    fn test_component_tables_interpolate_samples() {
        let params = PhysicsParams::default();
        let table = TableState::default();
        let settings = SearchSettings::default();
        let ball = BallState::at_rest(Vec3::new(-1.55, table.surface_y() + 0.3, 0.1));
        let window = HitWindow::sample(&ball, 0.0, &query(&params, &table, &settings, true))
            .expect("window");

        let tables = window.component_tables().expect("tables");
        let mid = 0.5 * (window.first_time() + window.last_time());
        let state = window.state_at(mid).to_array();
        for (component, table) in tables.iter().enumerate() {
            assert!((table.value(mid) - state[component]).abs() < 1e-12);
        }
    }
}
