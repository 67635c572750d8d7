use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Engine and loader tuning, read from TOML.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of background loader workers. Must be at least 1.
    #[serde(default = "default_loader_threads")]
    pub loader_threads: usize,

    /// Bound on queued loader jobs. `enqueue` blocks while full.
    #[serde(default)]
    pub job_queue_capacity: Option<usize>,

    /// Cap on GPU-thread closures executed per `run_once`. Unset drains
    /// everything queued at the start of the frame.
    #[serde(default)]
    pub max_jobs_per_frame: Option<usize>,
}

fn default_loader_threads() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loader_threads: default_loader_threads(),
            job_queue_capacity: None,
            max_jobs_per_frame: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let cfg: EngineConfig =
            toml::from_str(s).map_err(|e| EngineError::Config(format!("parse: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read `path`; a missing file yields the defaults. Any other read
    /// failure or a malformed file is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => Self::from_toml_str(&s).map_err(|e| match e {
                EngineError::Config(msg) => {
                    EngineError::Config(format!("{}: {msg}", path.display()))
                }
                other => other,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.loader_threads == 0 {
            return Err(EngineError::Config("loader_threads must be at least 1".into()));
        }
        if self.job_queue_capacity == Some(0) {
            return Err(EngineError::Config("job_queue_capacity must be at least 1".into()));
        }
        if self.max_jobs_per_frame == Some(0) {
            return Err(EngineError::Config("max_jobs_per_frame must be at least 1".into()));
        }
        Ok(())
    }
}
