//! Per-input packet buffer
//!
//! Each input worker owns one `PacketBuffer`. The input thread pushes
//! batches of packets; the output side borrows a window of the oldest
//! unread packets, transmits it, then releases it. Batches are shared
//! through `Arc`, so lending a window never copies packet data and a
//! window stays valid even if the buffer is cleared in the meantime.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::packet::TsPacket;

/// A read-only view on packets lent to the output
#[derive(Debug, Clone)]
pub struct PacketWindow {
    batch: Arc<[TsPacket]>,
    offset: usize,
    count: usize,
}

impl PacketWindow {
    /// Packets in this window
    pub fn packets(&self) -> &[TsPacket] {
        &self.batch[self.offset..self.offset + self.count]
    }

    /// Number of packets in the window
    pub fn len(&self) -> usize {
        self.count
    }

    /// Windows handed out by a buffer are never empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Default)]
struct BufferState {
    batches: VecDeque<Arc<[TsPacket]>>,
    /// Read position inside the front batch
    offset: usize,
    /// Unread packets, including lent ones
    queued: usize,
    /// Packets currently lent to the output, always from the front batch
    lent: usize,
    /// Drop the oldest packets instead of blocking when full
    lossy: bool,
    closed: bool,
}

impl BufferState {
    /// Drop the oldest batch that is not lent. Returns false if none.
    fn drop_oldest(&mut self) -> bool {
        if self.lent > 0 {
            match self.batches.remove(1) {
                Some(batch) => {
                    self.queued -= batch.len();
                    true
                }
                None => false,
            }
        } else {
            match self.batches.pop_front() {
                Some(batch) => {
                    self.queued -= batch.len() - self.offset;
                    self.offset = 0;
                    true
                }
                None => false,
            }
        }
    }
}

/// Bounded FIFO of packet batches shared by one input and the output
#[derive(Debug)]
pub struct PacketBuffer {
    capacity: usize,
    state: Mutex<BufferState>,
    space: Condvar,
}

impl PacketBuffer {
    /// Create a buffer holding up to `capacity` packets
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BufferState::default()),
            space: Condvar::new(),
        }
    }

    /// Number of unread packets
    pub fn len(&self) -> usize {
        self.state.lock().queued
    }

    /// Whether there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a batch, blocking while the buffer is full.
    ///
    /// In lossy mode the oldest unread packets are dropped instead of
    /// blocking. A batch larger than the capacity is accepted once the
    /// buffer is empty. Returns false if the buffer was closed.
    pub fn push(&self, packets: Vec<TsPacket>) -> bool {
        if packets.is_empty() {
            return !self.state.lock().closed;
        }
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return false;
            }
            let full = state.queued > 0 && state.queued + packets.len() > self.capacity;
            if !full {
                break;
            }
            if state.lossy {
                if !state.drop_oldest() {
                    break;
                }
            } else {
                self.space.wait(&mut state);
            }
        }
        state.queued += packets.len();
        state.batches.push_back(packets.into());
        true
    }

    /// Lend the oldest unread packets, up to the end of the front batch.
    ///
    /// Calling this again before `release` returns the same packets.
    pub fn window(&self) -> Option<PacketWindow> {
        let mut state = self.state.lock();
        let batch = state.batches.front()?.clone();
        let count = batch.len() - state.offset;
        if count == 0 {
            return None;
        }
        state.lent = count;
        Some(PacketWindow {
            batch,
            offset: state.offset,
            count,
        })
    }

    /// Release `count` lent packets. Returns false if fewer were lent.
    pub fn release(&self, count: usize) -> bool {
        let mut state = self.state.lock();
        if count > state.lent {
            warn!(
                "Releasing {} packets but only {} were lent",
                count, state.lent
            );
            return false;
        }
        state.offset += count;
        state.queued -= count;
        state.lent = 0;
        let front_done = state
            .batches
            .front()
            .is_some_and(|batch| state.offset >= batch.len());
        if front_done {
            state.batches.pop_front();
            state.offset = 0;
        }
        drop(state);
        self.space.notify_all();
        true
    }

    /// Drop all unread packets except those currently lent to the output
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let lent = state.lent;
        if lent > 0 {
            // Keep exactly the lent packets as the new front batch
            let offset = state.offset;
            let kept = state
                .batches
                .front()
                .map(|front| Arc::<[TsPacket]>::from(&front[offset..offset + lent]));
            state.batches.clear();
            state.batches.extend(kept);
            state.offset = 0;
            state.queued = lent;
        } else {
            state.batches.clear();
            state.offset = 0;
            state.queued = 0;
        }
        drop(state);
        self.space.notify_all();
    }

    /// Switch between blocking and lossy mode. Entering lossy mode
    /// releases a producer blocked on a full buffer.
    pub fn set_lossy(&self, lossy: bool) {
        self.state.lock().lossy = lossy;
        if lossy {
            self.space.notify_all();
        }
    }

    /// Close the buffer, waking any blocked producer
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.space.notify_all();
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
