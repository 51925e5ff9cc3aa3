use std::fmt;

use serde::{Deserialize, Serialize};

/// Release of the linked engine, e.g. `5.45`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryVersion {
    pub major: u32,
    pub minor: u32,
}

impl LibraryVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Decode the engine's packed form (`545` -> `5.45`).
    pub const fn from_packed(raw: u32) -> Self {
        Self::new(raw / 100, raw % 100)
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_round_trip() {
        let v = LibraryVersion::from_packed(545);
        assert_eq!(v, LibraryVersion::new(5, 45));
        assert_eq!(LibraryVersion::from_packed(500), LibraryVersion::new(5, 0));
    }

    #[test]
    fn display_pads_minor() {
        assert_eq!(LibraryVersion::new(5, 4).to_string(), "5.04");
        assert_eq!(LibraryVersion::new(5, 45).to_string(), "5.45");
    }

    #[test]
    fn ordering_follows_releases() {
        assert!(LibraryVersion::new(5, 9) < LibraryVersion::new(5, 10));
        assert!(LibraryVersion::new(4, 26) < LibraryVersion::new(5, 0));
    }
}
