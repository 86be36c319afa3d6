//! Engine configuration
//!
//! Values come from, in order: built-in defaults, an optional config file
//! (TOML, or JSON as a fallback), then `SNDGRAPH_*` environment variables.
//!
//! ```toml
//! sample_rate = 48000.0
//! frames_per_buffer = 256
//! ring_size = 4
//! ```

use crate::error::{SndError, SndResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Overrides `ring_size`
pub const ENV_RING_SIZE: &str = "SNDGRAPH_RING_SIZE";
/// Overrides `frames_per_buffer`
pub const ENV_FRAMES: &str = "SNDGRAPH_FRAMES";
/// Overrides `sample_rate`
pub const ENV_SAMPLE_RATE: &str = "SNDGRAPH_SAMPLE_RATE";

/// Settings shared by the graph and the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Samples per second (e.g., 44100.0)
    pub sample_rate: f32,

    /// Samples per rendered block and per hardware buffer
    pub frames_per_buffer: usize,

    /// Buffers filled per tick; must be a power of two
    pub ring_size: usize,

    /// Ring length that logs a warning once (0 disables)
    pub ring_warn_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            frames_per_buffer: 256,
            ring_size: 4,
            ring_warn_len: 64,
        }
    }
}

impl EngineConfig {
    /// Load from a config file
    pub fn load(path: &Path) -> SndResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse from string content
    pub fn parse(content: &str) -> SndResult<Self> {
        // Try TOML format first
        let toml_err = match toml::from_str(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        // Try JSON format
        serde_json::from_str(content).map_err(|json_err| {
            SndError::Config(format!(
                "not valid TOML ({}) or JSON ({})",
                toml_err.message(),
                json_err
            ))
        })
    }

    /// `<config dir>/sndgraph/engine.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sndgraph").join("engine.toml"))
    }

    /// Defaults, overlaid by the default config file when present, then the environment
    pub fn load_default() -> SndResult<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => {
                debug!("loading engine config from {}", path.display());
                Self::load(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SNDGRAPH_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; unparsable values are logged and ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override(&lookup, ENV_RING_SIZE) {
            self.ring_size = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_FRAMES) {
            self.frames_per_buffer = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_SAMPLE_RATE) {
            self.sample_rate = v;
        }
    }

    /// Check the values the engine depends on
    pub fn validate(&self) -> SndResult<()> {
        if !self.ring_size.is_power_of_two() {
            return Err(SndError::InvalidRingSize(self.ring_size));
        }
        if self.frames_per_buffer == 0 {
            return Err(SndError::Config("frames_per_buffer must be non-zero".into()));
        }
        if self.sample_rate <= 0.0 || !self.sample_rate.is_finite() {
            return Err(SndError::Config(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Audio queued ahead of the device once the ring is primed
    pub fn latency(&self) -> Duration {
        Duration::from_secs_f64(
            self.frames_per_buffer as f64 / self.sample_rate as f64 * self.ring_size as f64,
        )
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}
