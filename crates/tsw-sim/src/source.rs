//! Simulated packet source
//!
//! Produces numbered packets on a fixed PID. Every packet carries the
//! session number and its sequence number in the first payload bytes,
//! so tests can check that the output saw each session in order.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use tsw_core::{PacketSource, TsPacket};

use crate::error::SimError;

/// Configuration for a simulated source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSourceConfig {
    /// Display name
    pub name: String,
    /// PID of generated packets
    pub pid: u16,
    /// Packets per session, None for an endless stream
    pub packets: Option<u64>,
    /// Refuse every open
    pub fail_open: bool,
    /// Fail each session after this many packets
    pub fail_after: Option<u64>,
    /// Pause between batches, in microseconds
    pub batch_interval_us: u64,
}

impl Default for SimSourceConfig {
    fn default() -> Self {
        Self {
            name: "Simulated Input".to_string(),
            pid: 0x100,
            packets: None,
            fail_open: false,
            fail_after: None,
            batch_interval_us: 1_000,
        }
    }
}

/// Counters shared between a source and the test observing it
#[derive(Debug, Default)]
pub struct SourceStats {
    opens: AtomicU64,
    closes: AtomicU64,
    packets: AtomicU64,
}

impl SourceStats {
    /// Successful opens
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Closed sessions
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Packets produced over all sessions
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::SeqCst)
    }
}

/// A simulated transport stream source
#[derive(Debug)]
pub struct SimSource {
    config: SimSourceConfig,
    open: bool,
    /// Sessions opened so far
    session: u32,
    /// Packets produced in the current session
    produced: u64,
    continuity: u8,
    stats: Arc<SourceStats>,
}

impl SimSource {
    /// Create an endless source on `pid`
    pub fn new(name: impl Into<String>, pid: u16) -> Self {
        Self::from_config(SimSourceConfig {
            name: name.into(),
            pid,
            ..Default::default()
        })
    }

    /// Create a source from configuration
    pub fn from_config(config: SimSourceConfig) -> Self {
        Self {
            config,
            open: false,
            session: 0,
            produced: 0,
            continuity: 0,
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SimSourceConfig {
        &self.config
    }

    /// Counters that stay readable after the source moved into a worker
    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }

    fn next_packet(&mut self) -> TsPacket {
        let mut payload = [0u8; 12];
        payload[..4].copy_from_slice(&self.session.to_be_bytes());
        payload[4..].copy_from_slice(&self.produced.to_be_bytes());
        let packet = TsPacket::with_payload(self.config.pid, self.continuity, &payload);
        self.continuity = (self.continuity + 1) & 0x0F;
        self.produced += 1;
        packet
    }
}

impl PacketSource for SimSource {
    fn open(&mut self) -> io::Result<()> {
        if self.config.fail_open {
            return Err(SimError::OpenRefused {
                name: self.config.name.clone(),
            }
            .into());
        }
        self.session += 1;
        self.produced = 0;
        self.open = true;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        debug!("{} opened, session {}", self.config.name, self.session);
        Ok(())
    }

    fn read_batch(&mut self, max: usize) -> io::Result<Option<Vec<TsPacket>>> {
        if !self.open {
            return Err(SimError::NotOpen {
                name: self.config.name.clone(),
            }
            .into());
        }
        if let Some(limit) = self.config.fail_after {
            if self.produced >= limit {
                return Err(SimError::StreamFailed {
                    name: self.config.name.clone(),
                    packets: self.produced,
                }
                .into());
            }
        }

        let mut count = max as u64;
        if let Some(total) = self.config.packets {
            if self.produced >= total {
                return Ok(None);
            }
            count = count.min(total - self.produced);
        }
        if let Some(limit) = self.config.fail_after {
            count = count.min(limit - self.produced);
        }

        if self.config.batch_interval_us > 0 {
            thread::sleep(Duration::from_micros(self.config.batch_interval_us));
        }
        let batch: Vec<TsPacket> = (0..count).map(|_| self.next_packet()).collect();
        self.stats.packets.fetch_add(count, Ordering::SeqCst);
        trace!("{} produced {} packets", self.config.name, batch.len());
        Ok(Some(batch))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
            debug!(
                "{} closed after {} packets",
                self.config.name, self.produced
            );
        }
    }
}

/// Session and sequence numbers of a packet made by [`SimSource`]
pub fn packet_sequence(packet: &TsPacket) -> (u32, u64) {
    let payload = packet.payload();
    let mut session = [0u8; 4];
    let mut sequence = [0u8; 8];
    session.copy_from_slice(&payload[..4]);
    sequence.copy_from_slice(&payload[4..12]);
    (u32::from_be_bytes(session), u64::from_be_bytes(sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(config: SimSourceConfig) -> SimSource {
        SimSource::from_config(SimSourceConfig {
            batch_interval_us: 0,
            ..config
        })
    }

    #[test]
    fn test_finite_source_ends() {
        let mut src = quiet(SimSourceConfig {
            packets: Some(5),
            ..Default::default()
        });
        src.open().unwrap();

        let first = src.read_batch(3).unwrap().unwrap();
        assert_eq!(first.len(), 3);
        let second = src.read_batch(3).unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert!(src.read_batch(3).unwrap().is_none());

        assert_eq!(packet_sequence(&second[1]), (1, 4));
        assert_eq!(second[1].continuity_counter(), 4);
    }

    #[test]
    fn test_reopen_starts_new_session() {
        let mut src = quiet(SimSourceConfig {
            packets: Some(2),
            ..Default::default()
        });
        let stats = src.stats();
        src.open().unwrap();
        src.read_batch(8).unwrap();
        src.close();
        src.open().unwrap();

        let batch = src.read_batch(8).unwrap().unwrap();
        assert_eq!(packet_sequence(&batch[0]), (2, 0));
        assert_eq!(stats.opens(), 2);
        assert_eq!(stats.closes(), 1);
        assert_eq!(stats.packets(), 4);
    }

    #[test]
    fn test_fail_open() {
        let mut src = quiet(SimSourceConfig {
            fail_open: true,
            ..Default::default()
        });
        let err = src.open().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(src.read_batch(1).is_err());
    }

    #[test]
    fn test_fail_after() {
        let mut src = quiet(SimSourceConfig {
            fail_after: Some(4),
            ..Default::default()
        });
        src.open().unwrap();
        assert_eq!(src.read_batch(3).unwrap().unwrap().len(), 3);
        assert_eq!(src.read_batch(3).unwrap().unwrap().len(), 1);
        assert!(src.read_batch(3).is_err());
    }
}
