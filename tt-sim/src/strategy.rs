//! Play styles as plain data.
//!
//! A [`Strategy`] only bounds the six decision variables of the hit search;
//! the search maps each variable from `[0, 1]` into the matching
//! [`Interval`]. Built-in styles come from [`StrategyKind`], custom ones can
//! be loaded from YAML through [`crate::config::ConfigLoader`].

use serde::{Deserialize, Serialize};

use crate::types::TableState;

/// Closed range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Map `u ∈ [0, 1]` onto the interval.
    pub fn lerp(&self, u: f64) -> f64 {
        self.min + (self.max - self.min) * u
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.min * factor, self.max * factor)
    }
}

/// Bounds for one kind of stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeRanges {
    /// Bat speed at impact (m/s)
    pub speed: Interval,
    /// Bat face pitch (rad), positive opens the face upward
    pub pitch: Interval,
    /// Bat face yaw (rad)
    pub yaw: Interval,
    /// Pitch of the swing direction relative to the face (rad)
    pub vpitch: Interval,
    /// Yaw of the swing direction relative to the face (rad)
    pub vyaw: Interval,
    /// Fraction of the hittable window at which to strike
    pub timing: Interval,
}

/// A complete play style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub rally: StrokeRanges,
    pub serve: StrokeRanges,
}

impl Strategy {
    /// Ranges for the next stroke.
    ///
    /// Serves from closer to the net than the end of `table` get a
    /// proportionally slower bat, down to 75% of the nominal range.
    pub fn ranges(&self, serve: bool, ball_distance: f64, table: &TableState) -> StrokeRanges {
        if !serve {
            return self.rally;
        }
        let factor = (ball_distance / table.half_length).clamp(0.75, 1.0);
        StrokeRanges {
            speed: self.serve.speed.scaled(factor),
            ..self.serve
        }
    }
}

/// Built-in play styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Balanced,
    Attacking,
    Defensive,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Balanced,
        StrategyKind::Attacking,
        StrategyKind::Defensive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Balanced => "balanced",
            StrategyKind::Attacking => "attacking",
            StrategyKind::Defensive => "defensive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn strategy(self) -> Strategy {
        let serve = StrokeRanges {
            speed: Interval::new(1.0, 4.0),
            pitch: Interval::new(-0.9, 0.1),
            yaw: Interval::new(-0.3, 0.3),
            vpitch: Interval::new(-0.4, 0.4),
            vyaw: Interval::new(-0.2, 0.2),
            timing: Interval::new(0.2, 0.8),
        };

        let rally = match self {
            StrategyKind::Balanced => StrokeRanges {
                speed: Interval::new(1.5, 6.0),
                pitch: Interval::new(-0.6, 0.6),
                yaw: Interval::new(-0.4, 0.4),
                vpitch: Interval::new(-0.5, 0.5),
                vyaw: Interval::new(-0.3, 0.3),
                timing: Interval::new(0.2, 0.8),
            },
            // Faster, flatter, earlier
            StrategyKind::Attacking => StrokeRanges {
                speed: Interval::new(2.5, 7.5),
                pitch: Interval::new(-0.7, 0.3),
                yaw: Interval::new(-0.45, 0.45),
                vpitch: Interval::new(-0.6, 0.4),
                vyaw: Interval::new(-0.3, 0.3),
                timing: Interval::new(0.1, 0.6),
            },
            StrategyKind::Defensive => StrokeRanges {
                speed: Interval::new(1.2, 4.5),
                pitch: Interval::new(-0.3, 0.8),
                yaw: Interval::new(-0.3, 0.3),
                vpitch: Interval::new(-0.3, 0.6),
                vyaw: Interval::new(-0.2, 0.2),
                timing: Interval::new(0.4, 0.95),
            },
        };

        Strategy {
            name: self.name().to_string(),
            rally,
            serve,
        }
    }
}

impl From<StrategyKind> for Strategy {
    fn from(kind: StrategyKind) -> Self {
        kind.strategy()
    }
}
