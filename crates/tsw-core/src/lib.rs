//! Transport Stream Input Switch Engine
//!
//! This crate provides the coordination core of a live MPEG transport
//! stream switch: any number of interchangeable inputs produce packets,
//! exactly one of them (the *current* input) is forwarded to a single
//! output, and an operator or the failure policy may switch the current
//! input at any time.
//!
//! # Architecture
//!
//! - One thread per input produces packets into its own [`PacketBuffer`]
//!   and reports lifecycle events to the [`Coordinator`]
//! - One output thread asks the coordinator for packets of the current
//!   input, transmits them and releases them
//! - The coordinator serializes everything behind one lock and drives
//!   switches through an [`ActionQueue`]
//!
//! Switching strategies are selected with [`SwitchMode`]:
//!
//! - **Standard**: start the new input, switch once it delivers, stop the old one (default)
//! - **Fast**: keep every input running, switching is immediate
//! - **Delayed**: switch only once the new input delivers packets
//! - **Sequential**: stop the old input before starting the new one
//!
//! # Example
//!
//! ```rust,no_run
//! use tsw_core::{Coordinator, InputExecutor, OutputExecutor, SwitchOptions};
//!
//! fn run(
//!     inputs: Vec<Box<dyn InputExecutor>>,
//!     output: Box<dyn OutputExecutor>,
//! ) -> Result<bool, tsw_core::SwitchError> {
//!     let switch = Coordinator::new(SwitchOptions::default(), inputs, output)?;
//!     switch.start()?;
//!     // From a control thread:
//!     switch.next_input();
//!     switch.wait_for_termination();
//!     Ok(switch.exit_status().unwrap_or(false))
//! }
//! ```

pub mod action;
pub mod buffer;
pub mod command;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod executor;
pub mod input;
pub mod options;
pub mod output;
pub mod packet;
pub mod state;

pub use action::{Action, ActionKind, ActionQueue, EventSet};
pub use buffer::{PacketBuffer, PacketWindow};
pub use command::{CommandParseError, ControlCommand};
pub use coordinator::Coordinator;
pub use error::SwitchError;
pub use events::SwitchEvent;
pub use executor::{InputExecutor, OutputArea, OutputExecutor};
pub use input::{InputWorker, PacketSource};
pub use options::{InitialInput, SwitchMode, SwitchOptions};
pub use output::{OutputWorker, PacketSink};
pub use packet::{TsPacket, PID_NULL, PKT_SIZE, SYNC_BYTE};
pub use state::{InputState, InputStatus};
