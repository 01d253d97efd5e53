//! Threaded output worker

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::error::SwitchError;
use crate::executor::OutputExecutor;
use crate::packet::TsPacket;

/// Something that consumes transport stream packets
pub trait PacketSink: Send + 'static {
    /// Open the destination
    fn open(&mut self) -> io::Result<()>;

    /// Transmit packets, all or nothing
    fn send(&mut self, packets: &[TsPacket]) -> io::Result<()>;

    /// Flush and close the destination
    fn close(&mut self);
}

/// Output executor running a packet sink on its own thread
pub struct OutputWorker<K: PacketSink> {
    name: String,
    sink: Mutex<Option<K>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<K: PacketSink> OutputWorker<K> {
    pub fn new(name: impl Into<String>, sink: K) -> Self {
        Self {
            name: name.into(),
            sink: Mutex::new(Some(sink)),
            handle: Mutex::new(None),
        }
    }
}

impl<K: PacketSink> OutputExecutor for OutputWorker<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn launch(&self, coordinator: Arc<Coordinator>) -> Result<(), SwitchError> {
        let Some(mut sink) = self.sink.lock().take() else {
            return Err(SwitchError::AlreadyStarted);
        };
        sink.open()
            .map_err(|e| SwitchError::Output(format!("cannot open {}: {}", self.name, e)))?;
        info!("Output {} opened", self.name);

        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name("output".into())
            .spawn(move || run(&name, sink, &coordinator))
            .map_err(|source| SwitchError::Launch {
                worker: format!("output ({})", self.name),
                source,
            })?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn terminate(&self) {
        // The thread exits once get_output_area returns None
        debug!("Output {} asked to terminate", self.name);
    }

    fn wait_for_termination(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Output {} thread panicked", self.name);
            }
        }
    }
}

fn run<K: PacketSink>(name: &str, mut sink: K, coordinator: &Coordinator) {
    debug!("Output thread started");
    let mut sent: u64 = 0;
    while let Some(area) = coordinator.get_output_area() {
        if let Err(e) = sink.send(area.packets()) {
            error!("Output {} failed: {}", name, e);
            coordinator.stop(false);
            break;
        }
        sent += area.len() as u64;
        if !coordinator.output_sent(area.input, area.len()) {
            break;
        }
    }
    sink.close();
    info!("Output {} closed after {} packets", name, sent);
}
