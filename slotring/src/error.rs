//! Error types for slotring.

/// Transport errors.
///
/// Nothing here describes a slow or absent peer: waiting on the peer is never
/// an error, it simply does not return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Ring depth is zero or not a power of two.
    #[error("ring depth {0} is not a power of two")]
    InvalidDepth(usize),
    /// A single allocation asked for more slots than the ring holds.
    #[error("allocation of {requested} slots exceeds ring depth {depth}")]
    RangeTooLarge { requested: u32, depth: usize },
    /// A buffer is longer than one slot may describe.
    #[error("buffer of {len} bytes exceeds slot limit of {max}")]
    LengthTooLarge { len: usize, max: usize },
}

/// Result type for slotring operations.
pub type Result<T> = std::result::Result<T, Error>;
