//! Filesystem errors.

/// Outcome of a failed filesystem operation.
///
/// Remote status codes are carried untouched; everything else is detected
/// locally before or after the round-trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    /// Non-zero status returned by the peer.
    #[error("remote status {0}")]
    Remote(i32),
    /// Fewer bytes than the fixed header of the message.
    #[error("short message: {len} bytes, need {need}")]
    Short { len: usize, need: usize },
    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),
    /// A request's header plus name tail would not fit in one page.
    #[error("request of {0} bytes does not fit in one page")]
    NameTooLong(usize),
    /// A data leg longer than one page.
    #[error("data of {0} bytes exceeds one page")]
    TooLarge(usize),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("read-only session")]
    ReadOnly,
    #[error("invalid mount target {0:?}")]
    InvalidMountTarget(String),
    #[error(transparent)]
    Transport(#[from] slotring::Error),
}

impl FsError {
    /// Negative errno for the host VFS.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::Remote(status) => *status,
            FsError::NameTooLong(_) => -libc::ENAMETOOLONG,
            FsError::TooLarge(_) => -libc::EFBIG,
            FsError::ReadOnly => -libc::EROFS,
            FsError::Short { .. }
            | FsError::UnknownOpcode(_)
            | FsError::InvalidArgument
            | FsError::InvalidMountTarget(_)
            | FsError::Transport(_) => -libc::EINVAL,
        }
    }

    /// True for the peer's "no such entry" status.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Remote(status) if *status == -libc::ENOENT)
    }
}

/// Result type for slotring-fs operations.
pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_passes_through() {
        assert_eq!(FsError::Remote(-libc::EACCES).errno(), -libc::EACCES);
        assert_eq!(FsError::Remote(-9999).errno(), -9999);
        assert!(FsError::Remote(-libc::ENOENT).is_not_found());
        assert!(!FsError::Remote(-libc::EIO).is_not_found());
    }

    #[test]
    fn test_short_response_is_einval() {
        assert_eq!(FsError::Short { len: 2, need: 4 }.errno(), -libc::EINVAL);
    }

    #[test]
    fn test_local_errnos() {
        assert_eq!(FsError::ReadOnly.errno(), -libc::EROFS);
        assert_eq!(FsError::NameTooLong(5000).errno(), -libc::ENAMETOOLONG);
        assert_eq!(FsError::TooLarge(5000).errno(), -libc::EFBIG);
        let transport = FsError::from(slotring::Error::InvalidDepth(3));
        assert_eq!(transport.errno(), -libc::EINVAL);
    }
}
