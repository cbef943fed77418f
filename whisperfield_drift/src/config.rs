// Data-driven Drift Mode configuration.
//
// All tunable timing parameters of a tour live in `DriftConfig`, loaded from
// JSON (or defaulted). The session never uses magic numbers for durations;
// it reads them from here. Every field has a serde default, so a config file
// only needs to name what it overrides.
//
// Durations are in milliseconds, which is also the session's tick unit (see
// `session.rs`).
//
// `validate()` enforces the cross-field constraints the scheduler depends on.
// Construction paths that take untrusted input (`from_json`, `load`) validate
// before returning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tunable parameters for a Drift Mode tour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// How long the tour stays on each waypoint before advancing.
    pub dwell_ms: u64,
    /// Length of the audio crossfade between consecutive waypoints.
    pub crossfade_ms: u64,
    /// Length of the eased camera flight to each waypoint.
    pub camera_flight_ms: u64,
    /// Spacing of animation frames and crossfade volume updates (~60 fps).
    pub frame_interval_ms: u64,
    /// Upper bound on the number of stops the planner emits.
    pub max_waypoints: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 7000,
            crossfade_ms: 1000,
            camera_flight_ms: 2000,
            frame_interval_ms: 16,
            max_waypoints: 5,
        }
    }
}

/// Reasons a `DriftConfig` cannot be loaded or used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dwell_ms must be greater than zero")]
    ZeroDwell,
    #[error("frame_interval_ms must be greater than zero")]
    ZeroFrameInterval,
    #[error("max_waypoints must be at least 1")]
    ZeroWaypoints,
    #[error("crossfade_ms ({crossfade_ms}) must be shorter than dwell_ms ({dwell_ms})")]
    CrossfadeExceedsDwell { crossfade_ms: u64, dwell_ms: u64 },
}

impl DriftConfig {
    /// Check the constraints the scheduler relies on.
    ///
    /// The crossfade must end strictly before the dwell does. The session
    /// fires timers due on the same tick in scheduling order, and the dwell
    /// is armed before the fade's last tick, so a fade as long as the dwell
    /// would be abandoned one step short of silencing its outgoing clip.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dwell_ms == 0 {
            return Err(ConfigError::ZeroDwell);
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::ZeroFrameInterval);
        }
        if self.max_waypoints == 0 {
            return Err(ConfigError::ZeroWaypoints);
        }
        if self.crossfade_ms >= self.dwell_ms {
            return Err(ConfigError::CrossfadeExceedsDwell {
                crossfade_ms: self.crossfade_ms,
                dwell_ms: self.dwell_ms,
            });
        }
        Ok(())
    }

    /// Parse and validate a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}
