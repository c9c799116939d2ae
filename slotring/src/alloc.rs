//! Slot range reservation.
//!
//! Both rings share one pair of virtual counters. The lock covers the two
//! increments and nothing else, so its hold time is independent of how fast
//! the peer answers.

use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Counters {
    tx: u64,
    rx: u64,
}

/// Contiguous TX and RX index ranges owned by one logical operation.
///
/// Indices are virtual (unwrapped); the ring maps them onto slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub tx_base: u64,
    pub tx_count: u32,
    pub rx_base: u64,
    pub rx_count: u32,
}

impl Allocation {
    /// Virtual index of the `leg`-th TX slot.
    #[inline]
    pub fn tx(&self, leg: u32) -> u64 {
        debug_assert!(leg < self.tx_count);
        self.tx_base + leg as u64
    }

    /// Virtual index of the `leg`-th RX slot.
    #[inline]
    pub fn rx(&self, leg: u32) -> u64 {
        debug_assert!(leg < self.rx_count);
        self.rx_base + leg as u64
    }
}

/// Hands out non-overlapping slot ranges.
#[derive(Debug)]
pub struct SlotAllocator {
    counters: Mutex<Counters>,
    depth: usize,
}

impl SlotAllocator {
    pub fn new(depth: usize) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            depth,
        }
    }

    /// Reserve `tx` TX slots and `rx` RX slots.
    pub fn allocate(&self, tx: u32, rx: u32) -> Result<Allocation> {
        for requested in [tx, rx] {
            if requested as usize > self.depth {
                return Err(Error::RangeTooLarge {
                    requested,
                    depth: self.depth,
                });
            }
        }

        // The counters are two plain integers; a panic elsewhere cannot leave
        // them half-updated, so a poisoned lock is still usable.
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let tx_base = counters.tx;
        let rx_base = counters.rx;
        counters.tx += tx as u64;
        counters.rx += rx as u64;
        drop(counters);

        Ok(Allocation {
            tx_base,
            tx_count: tx,
            rx_base,
            rx_count: rx,
        })
    }

    /// Current (tx, rx) counter values.
    pub fn position(&self) -> (u64, u64) {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        (counters.tx, counters.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ranges() {
        let alloc = SlotAllocator::new(16);
        let a = alloc.allocate(1, 1).unwrap();
        let b = alloc.allocate(2, 1).unwrap();
        let c = alloc.allocate(1, 2).unwrap();
        assert_eq!((a.tx_base, a.rx_base), (0, 0));
        assert_eq!((b.tx_base, b.rx_base), (1, 1));
        assert_eq!((c.tx_base, c.rx_base), (3, 2));
        assert_eq!(b.tx(1), 2);
        assert_eq!(c.rx(1), 3);
        assert_eq!(alloc.position(), (4, 4));
    }

    #[test]
    fn test_counters_keep_growing_past_depth() {
        let alloc = SlotAllocator::new(4);
        for _ in 0..10 {
            alloc.allocate(1, 1).unwrap();
        }
        let next = alloc.allocate(1, 1).unwrap();
        assert_eq!(next.tx_base, 10);
        assert_eq!(next.rx_base, 10);
    }

    #[test]
    fn test_range_larger_than_ring() {
        let alloc = SlotAllocator::new(4);
        assert_eq!(
            alloc.allocate(5, 1),
            Err(Error::RangeTooLarge {
                requested: 5,
                depth: 4
            })
        );
        assert_eq!(alloc.position(), (0, 0));
    }
}
