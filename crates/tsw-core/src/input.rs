//! Threaded input worker
//!
//! [`InputWorker`] implements [`InputExecutor`] on top of any
//! [`PacketSource`]. It owns one thread that idles until the coordinator
//! starts it, then reads batches from the source into the input buffer
//! and reports each step back to the coordinator.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::buffer::{PacketBuffer, PacketWindow};
use crate::coordinator::Coordinator;
use crate::error::SwitchError;
use crate::executor::InputExecutor;
use crate::packet::TsPacket;

/// Something that produces transport stream packets
pub trait PacketSource: Send + 'static {
    /// Open a new input session
    fn open(&mut self) -> io::Result<()>;

    /// Read up to `max` packets. `Ok(None)` means end of stream.
    fn read_batch(&mut self, max: usize) -> io::Result<Option<Vec<TsPacket>>>;

    /// Close the current session
    fn close(&mut self);
}

/// Commands from the coordinator to the input thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCommand {
    Start { current: bool },
    Stop,
    NotifyCurrent(bool),
    Terminate,
}

/// How an input session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Requested,
    EndOfStream,
    Failed,
    Terminate,
}

/// Input executor running a packet source on its own thread
pub struct InputWorker<S: PacketSource> {
    name: String,
    batch_packets: usize,
    buffer: Arc<PacketBuffer>,
    cmd_tx: Sender<InputCommand>,
    /// Moved into the thread on launch
    pending: Mutex<Option<(S, Receiver<InputCommand>)>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: PacketSource> InputWorker<S> {
    /// Create a worker; `buffer_packets` and `batch_packets` usually come
    /// from the switch options
    pub fn new(name: impl Into<String>, source: S, buffer_packets: usize, batch_packets: usize) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        Self {
            name: name.into(),
            batch_packets: batch_packets.max(1),
            buffer: Arc::new(PacketBuffer::new(buffer_packets)),
            cmd_tx,
            pending: Mutex::new(Some((source, cmd_rx))),
            handle: Mutex::new(None),
        }
    }

    /// The input buffer
    pub fn buffer(&self) -> &Arc<PacketBuffer> {
        &self.buffer
    }

    fn send(&self, cmd: InputCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Input {} thread gone, dropping {:?}", self.name, cmd);
        }
    }
}

impl<S: PacketSource> InputExecutor for InputWorker<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn launch(&self, index: usize, coordinator: Arc<Coordinator>) -> Result<(), SwitchError> {
        let Some((source, cmd_rx)) = self.pending.lock().take() else {
            return Err(SwitchError::AlreadyStarted);
        };
        let mut thread = InputThread {
            index,
            name: self.name.clone(),
            source,
            cmd_rx,
            buffer: self.buffer.clone(),
            batch_packets: self.batch_packets,
            coordinator,
        };
        let handle = thread::Builder::new()
            .name(format!("input-{}", index))
            .spawn(move || thread.run())
            .map_err(|source| SwitchError::Launch {
                worker: format!("input {} ({})", index, self.name),
                source,
            })?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn start_input(&self, is_current: bool) {
        self.buffer.set_lossy(!is_current);
        self.send(InputCommand::Start {
            current: is_current,
        });
    }

    fn stop_input(&self) {
        // Unblock a producer stuck on a full buffer nobody drains anymore
        self.buffer.set_lossy(true);
        self.send(InputCommand::Stop);
    }

    fn notify_current(&self, is_current: bool) {
        self.buffer.set_lossy(!is_current);
        self.send(InputCommand::NotifyCurrent(is_current));
    }

    fn output_area(&self) -> Option<PacketWindow> {
        self.buffer.window()
    }

    fn free_output(&self, count: usize) -> bool {
        self.buffer.release(count)
    }

    fn terminate(&self) {
        self.send(InputCommand::Terminate);
        self.buffer.close();
    }

    fn wait_for_termination(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Input {} thread panicked", self.name);
            }
        }
    }
}

/// State owned by the input thread
struct InputThread<S: PacketSource> {
    index: usize,
    name: String,
    source: S,
    cmd_rx: Receiver<InputCommand>,
    buffer: Arc<PacketBuffer>,
    batch_packets: usize,
    coordinator: Arc<Coordinator>,
}

impl<S: PacketSource> InputThread<S> {
    fn run(&mut self) {
        debug!("Input {} thread started", self.index);
        loop {
            let cmd = match self.cmd_rx.recv() {
                Ok(cmd) => cmd,
                Err(_) => break,
            };
            let keep_going = match cmd {
                InputCommand::Start { current } => self.session(current),
                // The session this was meant for already reported its end
                InputCommand::Stop => {
                    debug!("Input {} idle, ignoring stop", self.index);
                    true
                }
                InputCommand::NotifyCurrent(_) => true,
                InputCommand::Terminate => false,
            };
            if !keep_going {
                break;
            }
        }
        debug!("Input {} thread exiting", self.index);
    }

    /// Run one input session. Returns false when the thread must exit.
    fn session(&mut self, current: bool) -> bool {
        info!(
            "Starting input {} ({}){}",
            self.index,
            self.name,
            if current { " as current" } else { "" }
        );

        // Packets left over from the previous session must not be output
        // ahead of the new one
        self.buffer.clear();

        if let Err(e) = self.source.open() {
            warn!("Input {} ({}) failed to start: {}", self.index, self.name, e);
            return self.coordinator.input_started(self.index, false);
        }
        if !self.coordinator.input_started(self.index, true) {
            self.source.close();
            return false;
        }

        let end = self.read_loop();
        self.source.close();

        match end {
            SessionEnd::Terminate => false,
            SessionEnd::Requested => {
                debug!("Input {} stopped on request", self.index);
                self.buffer.clear();
                self.coordinator.input_stopped(self.index, true)
            }
            SessionEnd::EndOfStream => {
                info!("Input {} ({}) reached end of stream", self.index, self.name);
                self.coordinator.input_stopped(self.index, true)
            }
            SessionEnd::Failed => self.coordinator.input_stopped(self.index, false),
        }
    }

    fn read_loop(&mut self) -> SessionEnd {
        loop {
            loop {
                match self.cmd_rx.try_recv() {
                    Ok(InputCommand::Stop) => return SessionEnd::Requested,
                    Ok(InputCommand::Terminate) | Err(TryRecvError::Disconnected) => {
                        return SessionEnd::Terminate
                    }
                    Ok(InputCommand::NotifyCurrent(current)) => {
                        debug!("Input {} is current: {}", self.index, current);
                    }
                    Ok(InputCommand::Start { .. }) => {
                        debug!("Input {} already started", self.index);
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }

            match self.source.read_batch(self.batch_packets) {
                Ok(Some(packets)) if packets.is_empty() => {}
                Ok(Some(packets)) => {
                    if !self.buffer.push(packets) {
                        return SessionEnd::Terminate;
                    }
                    if !self.coordinator.input_received(self.index) {
                        return SessionEnd::Terminate;
                    }
                }
                Ok(None) => return SessionEnd::EndOfStream,
                Err(e) => {
                    warn!("Input {} ({}) error: {}", self.index, self.name, e);
                    return SessionEnd::Failed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::executor::OutputExecutor;
    use crate::options::SwitchOptions;

    /// Session `n` sends packets on PID `base + n`. The first `finite`
    /// sessions end after `packets` packets, later ones run until stopped.
    struct Script {
        base: u16,
        packets: usize,
        finite: u16,
        session: u16,
        sent: usize,
    }

    impl Script {
        fn new(base: u16, packets: usize, finite: u16) -> Self {
            Self {
                base,
                packets,
                finite,
                session: 0,
                sent: 0,
            }
        }
    }

    impl PacketSource for Script {
        fn open(&mut self) -> io::Result<()> {
            self.session += 1;
            self.sent = 0;
            Ok(())
        }

        fn read_batch(&mut self, max: usize) -> io::Result<Option<Vec<TsPacket>>> {
            let ends = self.session <= self.finite;
            if ends && self.sent >= self.packets {
                return Ok(None);
            }
            let n = if ends {
                max.min(self.packets - self.sent)
            } else {
                thread::sleep(Duration::from_millis(1));
                max
            };
            self.sent += n;
            let pid = self.base + self.session;
            Ok(Some(
                (0..n)
                    .map(|i| TsPacket::with_payload(pid, i as u8, &[]))
                    .collect(),
            ))
        }

        fn close(&mut self) {}
    }

    /// Output driven by the test thread
    struct Passive;

    impl OutputExecutor for Passive {
        fn name(&self) -> &str {
            "passive"
        }
        fn launch(&self, _coordinator: Arc<Coordinator>) -> Result<(), SwitchError> {
            Ok(())
        }
        fn terminate(&self) {}
        fn wait_for_termination(&self) {}
    }

    fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_new_session_drops_previous_tail() {
        let first = InputWorker::new("first", Script::new(0x100, 8, 1), 64, 4);
        let first_buffer = first.buffer().clone();
        let second = InputWorker::new("second", Script::new(0x200, 0, 0), 64, 4);
        let inputs: Vec<Box<dyn InputExecutor>> = vec![Box::new(first), Box::new(second)];
        let switch = Coordinator::new(SwitchOptions::default(), inputs, Box::new(Passive)).unwrap();
        switch.start().unwrap();

        // Input 0 ends with all its packets still buffered
        wait_until("input 1 to take over", || switch.current_input() == 1);
        assert_eq!(first_buffer.len(), 8);

        switch.set_input(0).unwrap();
        let area = loop {
            let area = switch.get_output_area().expect("switch running");
            if area.input == 0 {
                break area;
            }
            assert!(switch.output_sent(area.input, area.len()));
        };
        assert!(area.packets().iter().all(|p| p.pid() == 0x102));

        switch.stop(true);
        switch.wait_for_termination();
    }
}
