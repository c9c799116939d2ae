//! slotring - fixed-depth TX/RX slot rings shared with a polling peer.
//!
//! # Architecture
//!
//! ```text
//!   callers (any thread)              peer (own scheduler)
//!  ┌──────────────────────┐
//!  │ allocate(tx, rx)     │──lock──▶ counters {tx, rx}
//!  │ arm_rx / post_tx     │
//!  └─────────┬────────────┘
//!            ▼
//!      TX ring [addr | len R] × N  ───────▶  Peer::take()
//!      RX ring [addr | len R] × N  ◀───────  Peer::respond()
//! ```
//!
//! - One allocation per logical operation reserves a contiguous range in
//!   each ring; only its owner touches those slots.
//! - Slots are accessed lock-free. The only lock guards the counter pair.
//! - Every wait is a cooperative poll ([`Backoff`]). There is no timeout: a
//!   peer that never answers stalls the caller.

pub mod alloc;
pub mod backoff;
pub mod error;
pub mod peer;
pub mod ring;

use log::trace;

pub use alloc::{Allocation, SlotAllocator};
pub use backoff::Backoff;
pub use error::{Error, Result};
pub use peer::Peer;
pub use ring::{RawSlot, Ring};

/// Largest payload one slot may describe (one page).
pub const PAGE_SIZE: usize = 4096;

/// Largest legal slot length.
pub const MAX_SLOT_LEN: usize = PAGE_SIZE;

/// Ready bit in the slot length word. Negotiated with the peer out of band.
pub const READY_FLAG: u32 = 1 << 31;

/// Ring depth agreed with the peer.
pub const DEFAULT_RING_DEPTH: usize = 16;

/// Ring geometry.
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Slots per ring. Must be a power of two.
    pub depth: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_RING_DEPTH,
        }
    }
}

/// The TX and RX rings plus their allocator.
///
/// Shared by reference (usually behind an `Arc`) between every caller and
/// the peer port.
#[derive(Debug)]
pub struct Transport {
    tx: Ring,
    rx: Ring,
    allocator: SlotAllocator,
}

impl Transport {
    pub fn new(config: RingConfig) -> Result<Self> {
        if config.depth == 0 || !config.depth.is_power_of_two() {
            return Err(Error::InvalidDepth(config.depth));
        }
        Ok(Self {
            tx: Ring::new(config.depth),
            rx: Ring::new(config.depth),
            allocator: SlotAllocator::new(config.depth),
        })
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.tx.depth()
    }

    pub fn tx_ring(&self) -> &Ring {
        &self.tx
    }

    pub fn rx_ring(&self) -> &Ring {
        &self.rx
    }

    /// Reserve `tx` consecutive TX slots and `rx` consecutive RX slots.
    pub fn allocate(&self, tx: u32, rx: u32) -> Result<Allocation> {
        self.allocator.allocate(tx, rx)
    }

    /// Hand a request buffer to the peer through TX slot `index`.
    ///
    /// Waits until earlier laps of the slot have been posted and the last
    /// of them consumed, then publishes `buf` with the ready flag set.
    ///
    /// # Safety
    /// `index` must belong to an allocation owned by the caller and be posted
    /// at most once. `buf` must stay alive and unmodified until
    /// [`Transport::await_tx_consumed`] returns for the same index.
    pub unsafe fn post_tx(&self, index: u64, buf: &[u8]) -> Result<()> {
        check_len(buf.len())?;
        self.tx.wait_turn(index);
        let slot = self.tx.slot(index);
        backoff::wait_until(|| !slot.is_ready());
        slot.publish_request(buf.as_ptr() as u64, buf.len() as u32);
        self.tx.finish_turn(index);
        trace!("post_tx index={} len={}", index, buf.len());
        Ok(())
    }

    /// Offer `buf` to the peer as the destination of RX slot `index`.
    ///
    /// Waits for the previous occupant of the slot to collect its response.
    ///
    /// # Safety
    /// `index` must belong to an allocation owned by the caller and be armed
    /// at most once. `buf` must stay alive, and must not be read or written
    /// by anyone else, until [`Transport::await_rx`] returns for the same
    /// index.
    pub unsafe fn arm_rx(&self, index: u64, buf: &mut [u8]) -> Result<()> {
        check_len(buf.len())?;
        self.rx.wait_turn(index);
        let slot = self.rx.slot(index);
        backoff::wait_until(|| slot.addr() == 0);
        slot.arm_response(buf.as_mut_ptr() as u64, buf.len() as u32);
        self.rx.finish_turn(index);
        trace!("arm_rx index={} capacity={}", index, buf.len());
        Ok(())
    }

    /// Wait for the peer to fill RX slot `index` and return the byte count.
    ///
    /// The slot is vacated for its next lap before returning. Must follow a
    /// successful [`Transport::arm_rx`] on the same index.
    pub fn await_rx(&self, index: u64) -> usize {
        let slot = self.rx.slot(index);
        let mut backoff = Backoff::new();
        let len = loop {
            let (len, ready) = ring::decode_word(slot.word());
            if ready {
                break len;
            }
            backoff.snooze();
        };
        slot.vacate();
        trace!("await_rx index={} len={}", index, len);
        len as usize
    }

    /// Wait until the peer has taken the request posted at TX slot `index`.
    ///
    /// `buf` is the buffer that was posted; once another request occupies the
    /// slot, ours was necessarily consumed.
    pub fn await_tx_consumed(&self, index: u64, buf: &[u8]) {
        let slot = self.tx.slot(index);
        let addr = buf.as_ptr() as u64;
        backoff::wait_until(|| !slot.is_ready() || slot.addr() != addr);
    }
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_SLOT_LEN {
        return Err(Error::LengthTooLarge {
            len,
            max: MAX_SLOT_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_depth() {
        assert_eq!(
            Transport::new(RingConfig { depth: 12 }).unwrap_err(),
            Error::InvalidDepth(12)
        );
        assert_eq!(
            Transport::new(RingConfig { depth: 0 }).unwrap_err(),
            Error::InvalidDepth(0)
        );
        assert_eq!(Transport::new(RingConfig::default()).unwrap().depth(), 16);
    }

    #[test]
    fn test_rejects_oversized_buffer() {
        let transport = Transport::new(RingConfig::default()).unwrap();
        let alloc = transport.allocate(1, 1).unwrap();
        let big = vec![0u8; PAGE_SIZE + 1];
        let err = unsafe { transport.post_tx(alloc.tx(0), &big) }.unwrap_err();
        assert_eq!(
            err,
            Error::LengthTooLarge {
                len: PAGE_SIZE + 1,
                max: PAGE_SIZE
            }
        );
        // Nothing was published.
        assert!(!transport.tx_ring().slot(alloc.tx(0)).is_ready());
    }

    #[test]
    fn test_post_sets_ready_flag() {
        let transport = Transport::new(RingConfig { depth: 4 }).unwrap();
        let alloc = transport.allocate(1, 0).unwrap();
        let req = [1u8, 2, 3];
        unsafe { transport.post_tx(alloc.tx(0), &req).unwrap() };
        let slot = transport.tx_ring().slot(alloc.tx(0));
        assert!(slot.is_ready());
        assert_eq!(slot.addr(), req.as_ptr() as u64);
        assert_eq!(ring::decode_word(slot.word()), (3, true));
    }
}
