//! Slot ring primitives.
//!
//! A ring is a fixed array of [`RawSlot`]s shared with the peer. Each slot is
//! a buffer address plus one 32-bit word carrying the buffer length and the
//! ready flag:
//!
//! ```text
//!  31  30                                  0
//! ┌───┬─────────────────────────────────────┐
//! │ R │ length (≤ MAX_SLOT_LEN)             │
//! └───┴─────────────────────────────────────┘
//! ```
//!
//! TX slot: `R=1` means "request ready for the peer"; the peer clears it when
//! it has consumed the request.
//! RX slot: the client arms it with `R=0` and the buffer capacity; the peer
//! writes the response, stores the byte count and sets `R=1`. Address `0`
//! marks an RX slot that nobody has armed.
//!
//! Alongside the shared slots the client keeps one private lap counter per
//! slot, so that a wrapped-around allocation never overtakes the previous
//! occupant of the same slot.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::backoff::Backoff;
use crate::{MAX_SLOT_LEN, READY_FLAG};

/// Mask selecting the length bits of a slot word.
pub const LEN_MASK: u32 = READY_FLAG - 1;

const _: () = assert!(MAX_SLOT_LEN as u32 <= LEN_MASK);

/// Pack a length and the ready flag into a slot word.
#[inline]
pub fn encode_word(len: u32, ready: bool) -> u32 {
    debug_assert!(len <= LEN_MASK);
    if ready { len | READY_FLAG } else { len }
}

/// Unpack a slot word into (length, ready).
#[inline]
pub fn decode_word(word: u32) -> (u32, bool) {
    (word & LEN_MASK, word & READY_FLAG != 0)
}

/// One ring element, laid out the way the peer reads it.
#[repr(C)]
#[derive(Debug)]
pub struct RawSlot {
    addr: AtomicU64,
    word: AtomicU32,
    _pad: u32,
}

const _: () = assert!(std::mem::size_of::<RawSlot>() == 16);

impl RawSlot {
    const fn new() -> Self {
        Self {
            addr: AtomicU64::new(0),
            word: AtomicU32::new(0),
            _pad: 0,
        }
    }

    /// Buffer address currently stored in the slot.
    #[inline]
    pub fn addr(&self) -> u64 {
        self.addr.load(Ordering::Acquire)
    }

    /// Raw length/flag word.
    #[inline]
    pub fn word(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        decode_word(self.word()).1
    }

    /// Store a TX request: address first, then the word with `R=1`.
    #[inline]
    pub(crate) fn publish_request(&self, addr: u64, len: u32) {
        self.addr.store(addr, Ordering::Relaxed);
        self.word.store(encode_word(len, true), Ordering::Release);
    }

    /// Peer side: clear `R` on a consumed TX slot.
    #[inline]
    pub(crate) fn release_request(&self, len: u32) {
        self.word.store(encode_word(len, false), Ordering::Release);
    }

    /// Arm an RX slot: capacity first, then the address that makes it visible.
    #[inline]
    pub(crate) fn arm_response(&self, addr: u64, capacity: u32) {
        self.word.store(encode_word(capacity, false), Ordering::Relaxed);
        self.addr.store(addr, Ordering::Release);
    }

    /// Peer side: report `len` bytes written and hand the slot back.
    #[inline]
    pub(crate) fn complete_response(&self, len: u32) {
        self.word.store(encode_word(len, true), Ordering::Release);
    }

    /// True when an RX slot is armed and still waiting for the peer.
    #[inline]
    pub(crate) fn is_armed(&self) -> bool {
        self.addr() != 0 && !self.is_ready()
    }

    /// Client side: give a collected RX slot back to the next lap.
    ///
    /// Only the address is cleared; the next arm rewrites the word before it
    /// republishes an address.
    #[inline]
    pub(crate) fn vacate(&self) {
        self.addr.store(0, Ordering::Release);
    }
}

/// Fixed-depth ring of slots for one traffic direction.
#[derive(Debug)]
pub struct Ring {
    slots: Box<[RawSlot]>,
    /// Next lap allowed to occupy each slot. Client-private.
    laps: Box<[AtomicU64]>,
    mask: u64,
    shift: u32,
}

impl Ring {
    /// Create an empty ring. `depth` must be a power of two.
    pub fn new(depth: usize) -> Self {
        debug_assert!(depth.is_power_of_two(), "depth must be power of 2");
        Self {
            slots: (0..depth).map(|_| RawSlot::new()).collect(),
            laps: (0..depth).map(|_| AtomicU64::new(0)).collect(),
            mask: depth as u64 - 1,
            shift: depth.trailing_zeros(),
        }
    }

    /// Number of slots.
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Slot position of a virtual (unwrapped) index.
    #[inline]
    pub fn to_slot(&self, index: u64) -> usize {
        (index & self.mask) as usize
    }

    /// How many times the ring has wrapped before reaching `index`.
    #[inline]
    pub fn lap(&self, index: u64) -> u64 {
        index >> self.shift
    }

    #[inline]
    pub fn slot(&self, index: u64) -> &RawSlot {
        &self.slots[self.to_slot(index)]
    }

    /// Spin until every earlier lap of this slot has taken its turn.
    pub(crate) fn wait_turn(&self, index: u64) {
        let lap = self.lap(index);
        let turn = &self.laps[self.to_slot(index)];
        let mut backoff = Backoff::new();
        while turn.load(Ordering::Acquire) != lap {
            backoff.snooze();
        }
    }

    /// Let the next lap of this slot proceed.
    pub(crate) fn finish_turn(&self, index: u64) {
        self.laps[self.to_slot(index)].store(self.lap(index) + 1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_packing() {
        assert_eq!(encode_word(0, false), 0);
        assert_eq!(encode_word(4096, true), 4096 | READY_FLAG);
        assert_eq!(decode_word(4096 | READY_FLAG), (4096, true));
        assert_eq!(decode_word(17), (17, false));
    }

    #[test]
    fn test_ready_flag_above_max_len() {
        let (len, ready) = decode_word(encode_word(MAX_SLOT_LEN as u32, false));
        assert_eq!(len, MAX_SLOT_LEN as u32);
        assert!(!ready);
    }

    #[test]
    fn test_index_wrap() {
        let ring = Ring::new(16);
        assert_eq!(ring.depth(), 16);
        assert_eq!(ring.to_slot(0), 0);
        assert_eq!(ring.to_slot(15), 15);
        assert_eq!(ring.to_slot(16), 0);
        assert_eq!(ring.to_slot(37), 5);
        assert_eq!(ring.lap(15), 0);
        assert_eq!(ring.lap(16), 1);
        assert_eq!(ring.lap(37), 2);
    }

    #[test]
    fn test_turns_follow_laps() {
        let ring = Ring::new(4);
        ring.wait_turn(1);
        ring.finish_turn(1);
        // Index 5 is lap 1 of slot 1, now unblocked.
        ring.wait_turn(5);
        ring.finish_turn(5);
        assert_eq!(ring.laps[1].load(Ordering::Relaxed), 2);
        assert_eq!(ring.laps[0].load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_rx_slot_lifecycle() {
        let slot = RawSlot::new();
        assert!(!slot.is_armed());

        slot.arm_response(0x1000, 64);
        assert!(slot.is_armed());
        assert_eq!(decode_word(slot.word()), (64, false));

        slot.complete_response(12);
        assert!(!slot.is_armed());
        assert_eq!(decode_word(slot.word()), (12, true));

        slot.vacate();
        assert_eq!(slot.addr(), 0);
        assert!(!slot.is_armed());
    }
}
