//! Synchronous request/response calls over the slot rings.
//!
//! One call = one allocation. Its RX legs are armed first, so no response
//! can arrive before there is somewhere to put it. Then the TX legs are
//! posted in order, every RX leg is awaited, and last the call waits for
//! the peer to have taken each TX leg. Only after that do the caller's
//! buffers go back to the caller.

use std::sync::Arc;

use log::{debug, trace};
use slotring::{Allocation, MAX_SLOT_LEN, Transport};

use crate::error::{FsError, Result};

/// Where a call stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Allocated,
    Posted,
    Awaiting,
    Completed,
}

/// RPC engine over a shared [`Transport`].
#[derive(Debug, Clone)]
pub struct Rpc {
    transport: Arc<Transport>,
}

impl Rpc {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// One request, one response. Returns the delivered response length.
    pub fn call(&self, req: &[u8], resp: &mut [u8]) -> Result<usize> {
        let [len] = self.call_legs([req], [resp])?;
        Ok(len)
    }

    /// A call with `T` request legs and `R` response legs.
    ///
    /// Returns the byte count the peer delivered into each RX leg, in leg
    /// order. Legs may complete in any order; this returns once all have.
    pub fn call_legs<const T: usize, const R: usize>(
        &self,
        tx: [&[u8]; T],
        rx: [&mut [u8]; R],
    ) -> Result<[usize; R]> {
        // Everything that can fail is checked before the allocation: once
        // slots are reserved every leg must be posted, or later laps of the
        // same slots would wait forever.
        for leg in &tx {
            if leg.is_empty() {
                return Err(FsError::InvalidArgument);
            }
            if leg.len() > MAX_SLOT_LEN {
                return Err(FsError::TooLarge(leg.len()));
            }
        }
        for leg in &rx {
            if leg.len() > MAX_SLOT_LEN {
                return Err(FsError::TooLarge(leg.len()));
            }
        }

        let mut state = CallState::Idle;
        let alloc = self.transport.allocate(T as u32, R as u32)?;
        advance(&mut state, CallState::Allocated, &alloc);
        if T + R > 2 {
            debug!(
                "split call tx={}+{} rx={}+{}",
                alloc.tx_base, T, alloc.rx_base, R
            );
        }

        // Safety: every buffer is borrowed for the whole of this function,
        // and the function does not return before the peer is done with
        // each of them (await_rx for RX legs, await_tx_consumed for TX legs).
        // Lengths were validated above, so neither call can fail here.
        for (leg, buf) in rx.into_iter().enumerate() {
            unsafe { self.transport.arm_rx(alloc.rx(leg as u32), buf)? };
        }
        for (leg, buf) in tx.iter().enumerate() {
            unsafe { self.transport.post_tx(alloc.tx(leg as u32), buf)? };
        }
        advance(&mut state, CallState::Posted, &alloc);

        advance(&mut state, CallState::Awaiting, &alloc);
        let mut lens = [0usize; R];
        for (leg, len) in lens.iter_mut().enumerate() {
            *len = self.transport.await_rx(alloc.rx(leg as u32));
        }
        for (leg, buf) in tx.iter().enumerate() {
            self.transport.await_tx_consumed(alloc.tx(leg as u32), buf);
        }
        advance(&mut state, CallState::Completed, &alloc);
        Ok(lens)
    }
}

fn advance(state: &mut CallState, next: CallState, alloc: &Allocation) {
    trace!(
        "call tx={} rx={}: {:?} -> {:?}",
        alloc.tx_base, alloc.rx_base, state, next
    );
    *state = next;
}
