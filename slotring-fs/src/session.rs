//! Mount-time session identity.

use std::fmt;
use std::str::FromStr;

use crate::error::FsError;

/// Session id that mounts read-only.
pub const READ_ONLY_SESSION: u16 = 0;

/// One mount's identity on the wire. Fixed for the life of the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
    id: u16,
}

impl Session {
    pub const fn new(id: u16) -> Self {
        Self { id }
    }

    /// Parse a mount target: a decimal id with an optional leading `/`.
    ///
    /// `"/7"` and `"7"` both name session 7.
    pub fn parse(target: &str) -> Result<Self, FsError> {
        let digits = target.strip_prefix('/').unwrap_or(target);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FsError::InvalidMountTarget(target.to_owned()));
        }
        let id = digits
            .parse::<u16>()
            .map_err(|_| FsError::InvalidMountTarget(target.to_owned()))?;
        Ok(Self { id })
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.id == READ_ONLY_SESSION
    }
}

impl FromStr for Session {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Session::parse(s)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(Session::parse("/7").unwrap().id(), 7);
        assert_eq!(Session::parse("7").unwrap().id(), 7);
        assert_eq!("65535".parse::<Session>().unwrap().id(), u16::MAX);
        assert!(Session::parse("/0").unwrap().is_read_only());
        assert!(!Session::parse("/1").unwrap().is_read_only());
    }

    #[test]
    fn test_rejects_bad_targets() {
        for bad in ["", "/", "//7", "/-1", "+7", "7a", "65536", " 7"] {
            assert_eq!(
                Session::parse(bad),
                Err(FsError::InvalidMountTarget(bad.to_owned())),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Session::new(12).to_string(), "/12");
    }
}
