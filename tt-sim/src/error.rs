//! Error types.

use std::fmt;

/// Why a hit search produced no plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    /// The ball never enters a reachable, legal region
    NoHittableWindow,
    /// The bat cannot reach the strike pose in time
    Infeasible,
    /// Iteration cap reached without meeting every target band
    Exhausted { iterations: usize },
    /// The gradient vanished or is not finite
    Stalled,
    /// A model quantity diverged
    NumericalDivergence(&'static str),
    /// The background worker is gone
    WorkerStopped,
}

impl SearchError {
    /// Failures worth retrying from another random start.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            SearchError::Infeasible
                | SearchError::Exhausted { .. }
                | SearchError::Stalled
                | SearchError::NumericalDivergence(_)
        )
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::NoHittableWindow => write!(f, "No hittable window"),
            SearchError::Infeasible => write!(f, "Strike pose cannot be reached in time"),
            SearchError::Exhausted { iterations } => {
                write!(f, "No plan after {} iterations", iterations)
            }
            SearchError::Stalled => write!(f, "Search stalled on a flat objective"),
            SearchError::NumericalDivergence(what) => write!(f, "Numerical divergence in {}", what),
            SearchError::WorkerStopped => write!(f, "Search worker stopped"),
        }
    }
}

impl std::error::Error for SearchError {}

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    NotFound(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "YAML parse error: {}", e),
            ConfigError::NotFound(name) => write!(f, "Configuration not found: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_failures() {
        assert!(SearchError::Stalled.is_soft());
        assert!(SearchError::Exhausted { iterations: 100 }.is_soft());
        assert!(!SearchError::NoHittableWindow.is_soft());
        assert!(!SearchError::WorkerStopped.is_soft());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SearchError::Exhausted { iterations: 7 }.to_string(),
            "No plan after 7 iterations"
        );
        let err = ConfigError::NotFound("fast".to_string());
        assert_eq!(err.to_string(), "Configuration not found: fast");
    }
}
