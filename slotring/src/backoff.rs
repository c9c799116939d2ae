//! Cooperative wait for flag transitions.
//!
//! There is no interrupt or wakeup from the peer, so every wait in this
//! crate is a poll loop. `Backoff` spins a growing number of times, then
//! yields the thread to the host scheduler on every further iteration. It
//! never sleeps.

const SPIN_LIMIT: u32 = 6;
const YIELD_LIMIT: u32 = 10;

#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Wait a little longer than last time.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..1u32 << self.step {
                std::hint::spin_loop();
            }
        } else {
            std::thread::yield_now();
        }
        if self.step <= YIELD_LIMIT {
            self.step += 1;
        }
    }

    /// True once the backoff has escalated to yielding.
    #[inline]
    pub fn is_yielding(&self) -> bool {
        self.step > SPIN_LIMIT
    }

    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

/// Poll `cond` until it holds.
#[inline]
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let mut backoff = Backoff::new();
    while !cond() {
        backoff.snooze();
    }
}
