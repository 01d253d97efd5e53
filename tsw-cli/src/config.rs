//! Application configuration
//!
//! A JSON file describing the inputs, the output and the switch options.
//! Every field is optional; command line flags are applied on top.
//!
//! ```json
//! {
//!   "switch": { "mode": "delayed", "cycle_limit": 2 },
//!   "inputs": [
//!     { "type": "file", "path": "/srv/ts/main.ts" },
//!     { "type": "sim", "name": "backup", "pid": 512 }
//!   ],
//!   "output": { "type": "file", "path": "/srv/ts/out.ts" },
//!   "remote": "127.0.0.1:4000"
//! }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tsw_core::SwitchOptions;
use tsw_sim::SimSourceConfig;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for this schema
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// Transport stream file, read from the start on every session
    File { path: PathBuf },
    /// Generated packets
    Sim(SimSourceConfig),
}

impl InputConfig {
    /// Simulated input for position `index`, on its own PID
    pub fn sim(index: usize) -> Self {
        Self::Sim(SimSourceConfig {
            name: format!("sim {}", index),
            pid: 0x100 * ((index % 31) as u16 + 1),
            ..Default::default()
        })
    }

    /// Name used in logs
    pub fn name(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Sim(sim) => sim.name.clone(),
        }
    }
}

/// The output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    /// Write packets to a file
    File { path: PathBuf },
    /// Discard packets
    #[default]
    Null,
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Switch behavior
    pub switch: SwitchOptions,
    /// Inputs in index order
    pub inputs: Vec<InputConfig>,
    /// The output
    pub output: OutputConfig,
    /// UDP address for remote commands
    pub remote: Option<SocketAddr>,
    /// Hosts allowed to send remote commands, empty for any
    pub remote_allow: Vec<IpAddr>,
    /// UDP address receiving switch events as JSON
    pub event_udp: Option<SocketAddr>,
}

impl AppConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
