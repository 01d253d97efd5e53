//! Capturing packet sink

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;
use tsw_core::{PacketSink, TsPacket};

use crate::error::SimError;

#[derive(Debug, Default)]
struct Captured {
    packets: Vec<TsPacket>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    captured: Mutex<Captured>,
    changed: Condvar,
}

/// Sink that keeps every packet it receives
#[derive(Debug)]
pub struct CaptureSink {
    shared: Arc<Shared>,
    fail_after: Option<usize>,
    fail_open: bool,
}

/// Test-side handle on the packets captured by a [`CaptureSink`]
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    shared: Arc<Shared>,
}

impl CaptureSink {
    /// Create a sink and its observing handle
    pub fn new() -> (Self, CaptureHandle) {
        let shared = Arc::new(Shared::default());
        let sink = Self {
            shared: shared.clone(),
            fail_after: None,
            fail_open: false,
        };
        (sink, CaptureHandle { shared })
    }

    /// Fail the send that would exceed `packets` captured packets
    pub fn fail_after(mut self, packets: usize) -> Self {
        self.fail_after = Some(packets);
        self
    }

    /// Refuse to open
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

impl PacketSink for CaptureSink {
    fn open(&mut self) -> io::Result<()> {
        if self.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "capture sink refused to open",
            ));
        }
        Ok(())
    }

    fn send(&mut self, packets: &[TsPacket]) -> io::Result<()> {
        let mut captured = self.shared.captured.lock();
        if let Some(limit) = self.fail_after {
            if captured.packets.len() + packets.len() > limit {
                return Err(SimError::SinkFailed {
                    packets: captured.packets.len(),
                }
                .into());
            }
        }
        captured.packets.extend_from_slice(packets);
        drop(captured);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn close(&mut self) {
        let mut captured = self.shared.captured.lock();
        captured.closed = true;
        debug!("Capture sink closed with {} packets", captured.packets.len());
        drop(captured);
        self.shared.changed.notify_all();
    }
}

impl CaptureHandle {
    /// Number of captured packets
    pub fn len(&self) -> usize {
        self.shared.captured.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all captured packets
    pub fn packets(&self) -> Vec<TsPacket> {
        self.shared.captured.lock().packets.clone()
    }

    /// Whether the sink was closed by its worker
    pub fn is_closed(&self) -> bool {
        self.shared.captured.lock().closed
    }

    /// PIDs in capture order, consecutive duplicates collapsed
    pub fn pid_runs(&self) -> Vec<u16> {
        let mut runs: Vec<u16> = Vec::new();
        for packet in self.shared.captured.lock().packets.iter() {
            if runs.last() != Some(&packet.pid()) {
                runs.push(packet.pid());
            }
        }
        runs
    }

    /// Block until `predicate` holds on the captured packets or the sink
    /// closes. Returns false on timeout.
    pub fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&[TsPacket]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut captured = self.shared.captured.lock();
        loop {
            if predicate(&captured.packets) {
                return true;
            }
            if captured.closed {
                return false;
            }
            if self
                .shared
                .changed
                .wait_until(&mut captured, deadline)
                .timed_out()
            {
                return predicate(&captured.packets);
            }
        }
    }

    /// Block until at least `count` packets were captured
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |packets| packets.len() >= count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_runs() {
        let (mut sink, handle) = CaptureSink::new();
        sink.open().unwrap();
        sink.send(&[TsPacket::with_payload(0x100, 0, &[]); 2]).unwrap();
        sink.send(&[TsPacket::with_payload(0x200, 0, &[])]).unwrap();
        sink.send(&[TsPacket::with_payload(0x100, 1, &[])]).unwrap();

        assert_eq!(handle.len(), 4);
        assert_eq!(handle.pid_runs(), vec![0x100, 0x200, 0x100]);
        assert!(handle.wait_for(4, Duration::from_millis(1)));
        assert!(!handle.wait_for(5, Duration::from_millis(1)));
    }

    #[test]
    fn test_fail_after() {
        let (sink, handle) = CaptureSink::new();
        let mut sink = sink.fail_after(2);
        sink.send(&[TsPacket::NULL; 2]).unwrap();
        let err = sink.send(&[TsPacket::NULL]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(handle.len(), 2);
    }

    #[test]
    fn test_close_ends_wait() {
        let (mut sink, handle) = CaptureSink::new();
        sink.close();
        assert!(handle.is_closed());
        assert!(!handle.wait_for(1, Duration::from_secs(5)));
    }
}
