//! Worker contracts
//!
//! The coordinator drives one [`InputExecutor`] per input and a single
//! [`OutputExecutor`]. Executors run their own threads and report back
//! through the coordinator callbacks.
//!
//! Methods called by the coordinator (`start_input`, `stop_input`,
//! `notify_current`, `output_area`) run while the coordinator lock is
//! held. They must return promptly and must never call back into the
//! coordinator.

use std::sync::Arc;

use crate::buffer::PacketWindow;
use crate::coordinator::Coordinator;
use crate::error::SwitchError;
use crate::packet::TsPacket;

/// One input: produces packets into its own buffer
pub trait InputExecutor: Send + Sync {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// Spawn the worker thread. The input stays idle until `start_input`.
    fn launch(&self, index: usize, coordinator: Arc<Coordinator>) -> Result<(), SwitchError>;

    /// Begin an input session. The worker answers with `input_started`.
    fn start_input(&self, is_current: bool);

    /// End the input session. The worker answers with `input_stopped`.
    fn stop_input(&self);

    /// Tell the input whether the output draws from it
    fn notify_current(&self, is_current: bool);

    /// Oldest unread packets, lent to the output without copying
    fn output_area(&self) -> Option<PacketWindow>;

    /// Release packets previously returned by `output_area`
    fn free_output(&self, count: usize) -> bool;

    /// Ask the worker thread to exit
    fn terminate(&self);

    /// Block until the worker thread exited
    fn wait_for_termination(&self);
}

/// The single output
pub trait OutputExecutor: Send + Sync {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// Open the output and spawn the worker thread
    fn launch(&self, coordinator: Arc<Coordinator>) -> Result<(), SwitchError>;

    /// Ask the worker thread to exit
    fn terminate(&self);

    /// Block until the worker thread exited
    fn wait_for_termination(&self);
}

/// Packets handed to the output, tagged with the input they came from
#[derive(Debug, Clone)]
pub struct OutputArea {
    /// Input the packets belong to, pass it back to `output_sent`
    pub input: usize,
    /// The lent packets
    pub window: PacketWindow,
}

impl OutputArea {
    /// Packets to transmit
    pub fn packets(&self) -> &[TsPacket] {
        self.window.packets()
    }

    /// Number of packets to transmit
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Never true for an area returned by the coordinator
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
