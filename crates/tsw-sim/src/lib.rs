//! Transport Stream Simulation Library
//!
//! This crate provides simulated devices for exercising the input switch
//! without real network or file inputs. It includes:
//!
//! - **SimSource**: Generates numbered packets, with scripted end of stream and failures
//! - **CaptureSink**: Records every packet the output sends
//!
//! # Example
//!
//! ```rust
//! use tsw_core::PacketSource;
//! use tsw_sim::{packet_sequence, SimSource, SimSourceConfig};
//!
//! let mut source = SimSource::from_config(SimSourceConfig {
//!     packets: Some(10),
//!     batch_interval_us: 0,
//!     ..Default::default()
//! });
//! source.open().unwrap();
//! let batch = source.read_batch(4).unwrap().unwrap();
//! assert_eq!(packet_sequence(&batch[3]), (1, 3));
//! ```

pub mod error;
pub mod sink;
pub mod source;

pub use error::SimError;
pub use sink::{CaptureHandle, CaptureSink};
pub use source::{packet_sequence, SimSource, SimSourceConfig, SourceStats};
