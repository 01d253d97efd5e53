//! Control commands
//!
//! Operators drive the switch with short text commands, typed on a
//! console or sent as UDP datagrams:
//!
//! | command | effect |
//! |---|---|
//! | `next` | switch to the next input |
//! | `prev`, `previous` | switch to the previous input |
//! | `<n>` | switch to input `n` |
//! | `exit`, `quit`, `halt` | terminate |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::coordinator::Coordinator;
use crate::error::SwitchError;

/// A parsed control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Switch to the next input
    Next,
    /// Switch to the previous input
    Previous,
    /// Switch to a given input
    Select(usize),
    /// Terminate processing
    Exit,
}

/// Unparseable control command
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown command: '{0}'")]
pub struct CommandParseError(pub String);

impl FromStr for ControlCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim().to_ascii_lowercase();
        match word.as_str() {
            "next" => Ok(Self::Next),
            "prev" | "previous" => Ok(Self::Previous),
            "exit" | "quit" | "halt" => Ok(Self::Exit),
            other => other
                .parse::<usize>()
                .map(Self::Select)
                .map_err(|_| CommandParseError(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => f.write_str("next"),
            Self::Previous => f.write_str("previous"),
            Self::Select(index) => write!(f, "{}", index),
            Self::Exit => f.write_str("exit"),
        }
    }
}

impl ControlCommand {
    /// Run the command against a coordinator
    pub fn apply(&self, coordinator: &Coordinator) -> Result<(), SwitchError> {
        info!("Control command: {}", self);
        match self {
            Self::Next => coordinator.next_input(),
            Self::Previous => coordinator.previous_input(),
            Self::Select(index) => coordinator.set_input(*index)?,
            Self::Exit => coordinator.stop(true),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("next".parse(), Ok(ControlCommand::Next));
        assert_eq!(" PREV\n".parse(), Ok(ControlCommand::Previous));
        assert_eq!("previous".parse(), Ok(ControlCommand::Previous));
        assert_eq!("2".parse(), Ok(ControlCommand::Select(2)));
        assert_eq!("halt".parse(), Ok(ControlCommand::Exit));
        assert_eq!("quit".parse(), Ok(ControlCommand::Exit));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            "jump".parse::<ControlCommand>(),
            Err(CommandParseError("jump".into()))
        );
        assert!("-1".parse::<ControlCommand>().is_err());
        assert!("".parse::<ControlCommand>().is_err());
    }
}
