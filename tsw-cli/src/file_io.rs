//! File inputs and outputs

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use tracing::{debug, warn};
use tsw_core::{PacketSink, PacketSource, TsPacket, PKT_SIZE, SYNC_BYTE};

/// Reads 188-byte packets from a file, from the start on every session
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
        }
    }

    /// Fill `buf` completely. Returns false on a clean end of file.
    fn read_packet(reader: &mut BufReader<File>, buf: &mut [u8; PKT_SIZE]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < PKT_SIZE {
            match reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    warn!("Truncated packet at end of file ({} bytes)", filled);
                    return Ok(false);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl PacketSource for FileSource {
    fn open(&mut self) -> io::Result<()> {
        let file = File::open(&self.path)?;
        debug!("Opened {}", self.path.display());
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    fn read_batch(&mut self, max: usize) -> io::Result<Option<Vec<TsPacket>>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "file not open"))?;

        let mut packets = Vec::with_capacity(max);
        let mut buf = [0u8; PKT_SIZE];
        while packets.len() < max {
            if !Self::read_packet(reader, &mut buf)? {
                break;
            }
            match TsPacket::from_bytes(buf) {
                Some(packet) => packets.push(packet),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "{}: lost synchronization (0x{:02X} instead of 0x{:02X})",
                            self.path.display(),
                            buf[0],
                            SYNC_BYTE
                        ),
                    ))
                }
            }
        }
        if packets.is_empty() {
            Ok(None)
        } else {
            Ok(Some(packets))
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

/// Writes packets to a file, truncating it on open
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }
}

impl PacketSink for FileSink {
    fn open(&mut self) -> io::Result<()> {
        self.writer = Some(BufWriter::new(File::create(&self.path)?));
        Ok(())
    }

    fn send(&mut self, packets: &[TsPacket]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "file not open"))?;
        for packet in packets {
            writer.write_all(packet.as_bytes())?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Cannot flush {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Discards every packet
#[derive(Debug, Default)]
pub struct NullSink;

impl PacketSink for NullSink {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn send(&mut self, _packets: &[TsPacket]) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}
