//! The peer's end of the rings.
//!
//! The real peer lives outside this crate and has its own scheduler. `Peer`
//! is its view of the same slots: it walks the TX ring in index order,
//! copies each ready request out and releases the slot, then writes responses
//! into the RX ring in index order as the client arms them.

use std::sync::Arc;

use crate::backoff::Backoff;
use crate::ring::decode_word;
use crate::Transport;

/// Peer-side cursor pair over a [`Transport`].
pub struct Peer {
    transport: Arc<Transport>,
    tx_cursor: u64,
    rx_cursor: u64,
}

impl Peer {
    /// Attach to a transport's rings.
    ///
    /// # Safety
    /// Every address the client posts or arms on `transport` must be valid
    /// memory of this process for the described length. In-process callers
    /// get this from the contracts of `post_tx` and `arm_rx`.
    pub unsafe fn attach(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            tx_cursor: 0,
            rx_cursor: 0,
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Virtual index of the next request to consume.
    pub fn tx_cursor(&self) -> u64 {
        self.tx_cursor
    }

    /// Virtual index of the next response slot to fill.
    pub fn rx_cursor(&self) -> u64 {
        self.rx_cursor
    }

    /// Copy out the next request if it has been posted, releasing its slot.
    pub fn try_take(&mut self) -> Option<Vec<u8>> {
        let slot = self.transport.tx_ring().slot(self.tx_cursor);
        let (len, ready) = decode_word(slot.word());
        if !ready {
            return None;
        }
        let addr = slot.addr() as *const u8;
        // Safety: the poster keeps the buffer alive until it observes the
        // release below.
        let data = unsafe { std::slice::from_raw_parts(addr, len as usize) }.to_vec();
        slot.release_request(len);
        self.tx_cursor += 1;
        Some(data)
    }

    /// Wait for the next request.
    pub fn take(&mut self) -> Vec<u8> {
        let mut backoff = Backoff::new();
        loop {
            if let Some(data) = self.try_take() {
                return data;
            }
            backoff.snooze();
        }
    }

    /// True when the RX slot `ahead` positions past the cursor is armed.
    pub fn is_armed(&self, ahead: u64) -> bool {
        self.transport
            .rx_ring()
            .slot(self.rx_cursor + ahead)
            .is_armed()
    }

    /// Write `data` into the RX slot `ahead` positions past the cursor,
    /// waiting for the client to arm it. Does not move the cursor.
    ///
    /// Returns the number of bytes delivered, truncated to the armed
    /// capacity.
    pub fn fill(&self, ahead: u64, data: &[u8]) -> usize {
        let slot = self.transport.rx_ring().slot(self.rx_cursor + ahead);
        let mut backoff = Backoff::new();
        while !slot.is_armed() {
            backoff.snooze();
        }
        let (capacity, _) = decode_word(slot.word());
        let n = data.len().min(capacity as usize);
        let dst = slot.addr() as *mut u8;
        // Safety: the armer keeps the buffer alive and untouched until it
        // observes the ready flag set below.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, n) };
        slot.complete_response(n as u32);
        n
    }

    /// Move the RX cursor past `n` filled slots.
    pub fn advance(&mut self, n: u64) {
        self.rx_cursor += n;
    }

    /// Fill the next RX slot and advance past it.
    pub fn respond(&mut self, data: &[u8]) -> usize {
        let n = self.fill(0, data);
        self.advance(1);
        n
    }
}
