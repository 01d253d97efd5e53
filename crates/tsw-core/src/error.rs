//! Error types for the input switch

use thiserror::Error;

/// Errors that can occur in the input switch
#[derive(Debug, Error)]
pub enum SwitchError {
    /// No input was configured
    #[error("no input configured")]
    NoInputs,

    /// Switch target out of range
    #[error("invalid input index {index}, {count} inputs configured")]
    InvalidInput {
        /// Requested index
        index: usize,
        /// Number of configured inputs
        count: usize,
    },

    /// Invalid option value
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A worker thread could not be launched
    #[error("cannot launch {worker}: {source}")]
    Launch {
        /// Worker description
        worker: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The output could not be opened
    #[error("output error: {0}")]
    Output(String),

    /// `start` called twice
    #[error("switch already started")]
    AlreadyStarted,

    /// Processing is terminating
    #[error("switch is terminating")]
    Terminated,
}
