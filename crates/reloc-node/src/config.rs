use std::{path::Path, path::PathBuf, time::Duration};

use reloc_gicp::GicpParams;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    /// The configuration is not valid JSON or has unknown keys.
    #[error("Failed to parse config")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("Invalid value for `{key}`: {reason}")]
    Invalid {
        /// The offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Runtime parameters of the relocalization node.
///
/// Every key is optional in the JSON file and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelocConfig {
    /// Worker threads of each preprocessor and of the solver.
    pub num_threads: usize,
    /// Neighbourhood size used for covariance estimation.
    pub num_neighbors: usize,
    /// Voxel size applied to the prior map.
    pub global_leaf_size: f64,
    /// Voxel size applied to each incoming scan.
    pub registered_leaf_size: f64,
    /// Squared distance above which a correspondence is rejected.
    pub max_dist_sq: f64,
    /// Frame of the prior map, parent of the published transform.
    pub map_frame_id: String,
    /// Drifting frame, child of the published transform.
    pub odom_frame_id: String,
    /// Path of the prior map PCD file.
    pub prior_pcd_file: PathBuf,
    /// Period of the alignment task in milliseconds.
    pub register_period_ms: u64,
    /// Period of the publish task in milliseconds.
    pub publish_period_ms: u64,
    /// Maximum number of solver iterations.
    pub max_iterations: usize,
}

impl Default for RelocConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            num_neighbors: 20,
            global_leaf_size: 0.25,
            registered_leaf_size: 0.25,
            max_dist_sq: 1.0,
            map_frame_id: "map".to_string(),
            odom_frame_id: "odom".to_string(),
            prior_pcd_file: PathBuf::new(),
            register_period_ms: 500,
            publish_period_ms: 50,
            max_iterations: 20,
        }
    }
}

impl RelocConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                key,
                reason: reason.into(),
            }
        }

        for (key, value) in [
            ("num_threads", self.num_threads),
            ("num_neighbors", self.num_neighbors),
            ("max_iterations", self.max_iterations),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be at least 1"));
            }
        }

        for (key, value) in [
            ("global_leaf_size", self.global_leaf_size),
            ("registered_leaf_size", self.registered_leaf_size),
            ("max_dist_sq", self.max_dist_sq),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(key, format!("must be positive and finite, got {value}")));
            }
        }

        for (key, value) in [
            ("register_period_ms", self.register_period_ms),
            ("publish_period_ms", self.publish_period_ms),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be at least 1 ms"));
            }
        }

        for (key, value) in [
            ("map_frame_id", &self.map_frame_id),
            ("odom_frame_id", &self.odom_frame_id),
        ] {
            if value.is_empty() {
                return Err(invalid(key, "must not be empty"));
            }
        }

        Ok(())
    }

    /// Period of the alignment task.
    pub fn register_period(&self) -> Duration {
        Duration::from_millis(self.register_period_ms)
    }

    /// Period of the publish task.
    pub fn publish_period(&self) -> Duration {
        Duration::from_millis(self.publish_period_ms)
    }

    /// Solver parameters derived from this configuration.
    pub fn gicp_params(&self) -> GicpParams {
        GicpParams {
            num_threads: self.num_threads,
            max_dist_sq: self.max_dist_sq,
            max_iterations: self.max_iterations,
            ..Default::default()
        }
    }
}
