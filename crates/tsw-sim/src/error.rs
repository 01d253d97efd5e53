//! Error types for simulated sources and sinks

use std::io;

use thiserror::Error;

/// Scripted failures of simulated devices
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The source is configured to refuse opening
    #[error("{name}: open refused")]
    OpenRefused {
        /// Source name
        name: String,
    },

    /// Read attempted without an open session
    #[error("{name}: not open")]
    NotOpen {
        /// Source or sink name
        name: String,
    },

    /// The source is configured to fail mid-stream
    #[error("{name}: stream failed after {packets} packets")]
    StreamFailed {
        /// Source name
        name: String,
        /// Packets produced in the session before failing
        packets: u64,
    },

    /// The sink is configured to fail
    #[error("sink failed after {packets} packets")]
    SinkFailed {
        /// Packets accepted before failing
        packets: usize,
    },
}

impl From<SimError> for io::Error {
    fn from(err: SimError) -> Self {
        let kind = match err {
            SimError::OpenRefused { .. } => io::ErrorKind::ConnectionRefused,
            SimError::NotOpen { .. } => io::ErrorKind::NotConnected,
            SimError::StreamFailed { .. } => io::ErrorKind::UnexpectedEof,
            SimError::SinkFailed { .. } => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kind() {
        let err: io::Error = SimError::OpenRefused { name: "a".into() }.into();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(err.to_string(), "a: open refused");
    }
}
