//! Switch configuration

use serde::{Deserialize, Serialize};

use crate::error::SwitchError;

/// Default size of each input buffer, in packets
pub const DEFAULT_BUFFER_PACKETS: usize = 512;

/// Default number of packets read by an input in one go
pub const DEFAULT_BATCH_PACKETS: usize = 64;

/// How an input switch is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMode {
    /// Start the new input, make it current, stop the old one once the
    /// new one delivers packets
    #[default]
    Standard,
    /// All inputs run all the time, switching only moves the current marker
    Fast,
    /// Keep the old input current until the new one delivers packets
    Delayed,
    /// Stop the old input before starting the new one
    Sequential,
}

impl SwitchMode {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Fast => "Fast",
            Self::Delayed => "Delayed",
            Self::Sequential => "Sequential",
        }
    }

    /// Get description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Standard => "Switch as soon as the new input is started",
            Self::Fast => "Keep every input running, switch instantly",
            Self::Delayed => "Switch when the new input receives packets",
            Self::Sequential => "Stop the current input before starting the next one",
        }
    }

    /// Whether every input is started up front and never stopped on switch
    pub fn keeps_inputs_running(&self) -> bool {
        matches!(self, Self::Fast)
    }
}

impl std::str::FromStr for SwitchMode {
    type Err = SwitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "fast" => Ok(Self::Fast),
            "delayed" => Ok(Self::Delayed),
            "sequential" => Ok(Self::Sequential),
            other => Err(SwitchError::InvalidOption(format!(
                "unknown switch mode '{}'",
                other
            ))),
        }
    }
}

/// Selection of the first current input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialInput {
    /// This input must start and becomes current
    Index(usize),
    /// The first input, in index order, that starts successfully
    FirstSuccess,
}

impl Default for InitialInput {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl InitialInput {
    /// Input tried first
    pub fn first_index(&self) -> usize {
        match self {
            Self::Index(i) => *i,
            Self::FirstSuccess => 0,
        }
    }
}

/// Switch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchOptions {
    /// Switching mode
    pub mode: SwitchMode,
    /// First current input
    pub initial: InitialInput,
    /// Terminate when the current input reaches its end instead of
    /// moving on to the next input
    pub terminate_on_end: bool,
    /// Terminate after this many complete input cycles (None = forever)
    pub cycle_limit: Option<u64>,
    /// Size of each input buffer in packets
    pub buffer_packets: usize,
    /// Packets read by an input per batch
    pub batch_packets: usize,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            mode: SwitchMode::Standard,
            initial: InitialInput::default(),
            terminate_on_end: false,
            cycle_limit: None,
            buffer_packets: DEFAULT_BUFFER_PACKETS,
            batch_packets: DEFAULT_BATCH_PACKETS,
        }
    }
}

impl SwitchOptions {
    /// Check the options against the number of configured inputs
    pub fn validate(&self, input_count: usize) -> Result<(), SwitchError> {
        if input_count == 0 {
            return Err(SwitchError::NoInputs);
        }
        if let InitialInput::Index(index) = self.initial {
            if index >= input_count {
                return Err(SwitchError::InvalidInput {
                    index,
                    count: input_count,
                });
            }
        }
        if self.buffer_packets == 0 {
            return Err(SwitchError::InvalidOption(
                "buffer size must be at least one packet".into(),
            ));
        }
        if self.batch_packets == 0 || self.batch_packets > self.buffer_packets {
            return Err(SwitchError::InvalidOption(format!(
                "batch size must be between 1 and {} packets",
                self.buffer_packets
            )));
        }
        if self.cycle_limit == Some(0) {
            return Err(SwitchError::InvalidOption(
                "cycle limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let opts = SwitchOptions::default();
        assert_eq!(opts.mode, SwitchMode::Standard);
        assert_eq!(opts.initial, InitialInput::Index(0));
        assert!(opts.validate(1).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let opts = SwitchOptions::default();
        assert!(matches!(opts.validate(0), Err(SwitchError::NoInputs)));

        let opts = SwitchOptions {
            initial: InitialInput::Index(3),
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(3),
            Err(SwitchError::InvalidInput { index: 3, count: 3 })
        ));

        let opts = SwitchOptions {
            batch_packets: 1024,
            ..Default::default()
        };
        assert!(opts.validate(2).is_err());

        let opts = SwitchOptions {
            cycle_limit: Some(0),
            ..Default::default()
        };
        assert!(opts.validate(2).is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("fast".parse::<SwitchMode>().unwrap(), SwitchMode::Fast);
        assert_eq!("Delayed".parse::<SwitchMode>().unwrap(), SwitchMode::Delayed);
        assert!("bogus".parse::<SwitchMode>().is_err());
    }
}
