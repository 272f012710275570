//! Scene configuration loader.
//!
//! Every tunable has a compiled-in default; YAML files only need to name
//! what they change.
//!
//! ## Directory Structure
//!
//! ```text
//! config/
//! ├── default.yaml
//! └── strategies/
//!     ├── balanced.yaml
//!     ├── attacking.yaml
//!     └── defensive.yaml
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aim::AgentLimits;
use crate::collision::SurfaceCoefficients;
use crate::error::ConfigError;
use crate::game::ServeSettings;
use crate::search::{SearchSettings, TargetBands};
use crate::strategy::{Strategy, StrategyKind};
use crate::types::{PhysicsParams, TableState};

/// Everything needed to run a rally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsParams,
    pub table: TableState,
    pub coefficients: SurfaceCoefficients,
    pub agent: AgentLimits,
    pub search: SearchSettings,
    pub bands: TargetBands,
    pub serve: ServeSettings,
    /// Fixed simulation tick (s)
    pub time_step: f64,
    /// Strategy names for agent 0 and agent 1
    pub strategies: [String; 2],
}

impl Default for SimConfig {
    fn default() -> Self {
        let name = StrategyKind::default().name().to_string();
        Self {
            physics: PhysicsParams::default(),
            table: TableState::default(),
            coefficients: SurfaceCoefficients::default(),
            agent: AgentLimits::default(),
            search: SearchSettings::default(),
            bands: TargetBands::default(),
            serve: ServeSettings::default(),
            time_step: 0.002,
            strategies: [name.clone(), name],
        }
    }
}

/// Configuration loader with configurable base directory.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// The base path holds scene files and a `strategies/` subdirectory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Load a scene by name (without .yaml extension).
    ///
    /// # Example
    /// ```ignore
    /// let loader = ConfigLoader::new("config");
    /// let config = loader.load("default")?;
    /// ```
    pub fn load(&self, name: &str) -> Result<SimConfig, ConfigError> {
        let path = self.base_path.join(format!("{}.yaml", name));
        read_yaml(&path, name)
    }

    /// Load a strategy by name.
    ///
    /// Built-in names resolve without a file when none is present.
    pub fn load_strategy(&self, name: &str) -> Result<Strategy, ConfigError> {
        let path = self.base_path.join("strategies").join(format!("{}.yaml", name));
        if !path.exists() {
            if let Some(kind) = StrategyKind::from_name(name) {
                tracing::debug!(name, "using built-in strategy");
                return Ok(kind.strategy());
            }
        }
        read_yaml(&path, name)
    }

    /// List all strategy files.
    pub fn list_strategies(&self) -> Result<Vec<String>, ConfigError> {
        let path = self.base_path.join("strategies");
        if !path.exists() {
            return Ok(vec![]);
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".yaml") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path, name: &str) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(name.to_string()));
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn get_config_path() -> PathBuf {
        let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(manifest_dir).join("..").join("config")
    }

    #[test]
    fn test_load_default_scene() {
        let loader = ConfigLoader::new(get_config_path());
        let result = loader.load("default");

        assert!(result.is_ok(), "Should load default: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config, SimConfig::default(), "shipped file mirrors the built-in defaults");
    }

    #[test]
    fn test_load_nonexistent_scene() {
        let loader = ConfigLoader::new(get_config_path());
        match loader.load("nonexistent_scene_xyz") {
            Err(ConfigError::NotFound(name)) => assert_eq!(name, "nonexistent_scene_xyz"),
            other => panic!("Expected NotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_shipped_strategies_match_builtins() {
        let loader = ConfigLoader::new(get_config_path());
        for kind in StrategyKind::ALL {
            let loaded = loader.load_strategy(kind.name());
            assert!(loaded.is_ok(), "Should load {}: {:?}", kind.name(), loaded.err());
            assert_eq!(loaded.unwrap(), kind.strategy());
        }
    }

    #[test]
    fn test_builtin_strategy_without_files() {
        let loader = ConfigLoader::new("/nonexistent/config/dir");
        let strategy = loader.load_strategy("defensive").expect("built-in fallback");
        assert_eq!(strategy, StrategyKind::Defensive.strategy());
        assert!(matches!(loader.load_strategy("chopper"), Err(ConfigError::NotFound(_))));
        assert_eq!(loader.list_strategies().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_list_strategies() {
        let loader = ConfigLoader::new(get_config_path());
        let names = loader.list_strategies().expect("readable directory");
        assert_eq!(names, vec!["attacking", "balanced", "defensive"]);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "physics:\n  drag: 0.2\nagent:\n  max_speed: 8.0\n";
        let config: SimConfig = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(config.physics.drag, 0.2);
        assert_eq!(config.physics.radius, PhysicsParams::default().radius);
        assert_eq!(config.agent.max_speed, Some(8.0));
        assert_eq!(config.search, SearchSettings::default());
    }
}
