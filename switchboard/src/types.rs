//! Core identity types.
//!
//! - [`CallId`]: 128-bit correlation key linking a request to its reply
//! - [`PeerId`]: opaque peer identity assigned by the networking provider
//! - [`Direction`]: who initiated the connection

use serde::{Deserialize, Serialize};

use crate::random::RandomProvider;

/// 128-bit correlation key.
///
/// Fresh keys are drawn at random for every issued call; uniqueness only has
/// to hold among a single connection's in-flight calls, so 128 random bits
/// are far more than enough. The stub re-draws on the off chance a live entry
/// already owns the key.
///
/// # Examples
///
/// ```
/// use switchboard::CallId;
///
/// let key = CallId::new(0x123, 0x456);
/// assert_eq!(key.to_string(), "00000000000001230000000000000456");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallId {
    /// First 64 bits.
    pub first: u64,
    /// Second 64 bits.
    pub second: u64,
}

impl CallId {
    /// Number of bytes in the wire representation.
    pub const WIRE_LEN: usize = 16;

    /// Create a key with explicit values.
    pub const fn new(first: u64, second: u64) -> Self {
        Self { first, second }
    }

    /// Draw a fresh random key.
    pub fn random<R: RandomProvider>(random: &R) -> Self {
        Self {
            first: random.random(),
            second: random.random(),
        }
    }

    /// Check if this key is valid (non-zero).
    pub const fn is_valid(&self) -> bool {
        self.first != 0 || self.second != 0
    }

    /// Wire representation: both halves little-endian.
    pub fn to_wire_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[..8].copy_from_slice(&self.first.to_le_bytes());
        buf[8..].copy_from_slice(&self.second.to_le_bytes());
        buf
    }

    /// Parse the wire representation.
    pub fn from_wire_bytes(buf: &[u8; Self::WIRE_LEN]) -> Self {
        let first = u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let second = u64::from_le_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);
        Self { first, second }
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.first, self.second)
    }
}

/// Opaque peer identity.
///
/// Assigned by the networking provider when it identifies the remote side of
/// a stream; this crate never interprets it, only carries it to handlers and
/// continuations. Inbound connections may not have one until the provider
/// completes identification, hence `Option<PeerId>` throughout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a provider-assigned identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which side initiated the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The remote peer dialed us.
    Incoming,
    /// We dialed the remote peer.
    Outgoing,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Incoming => f.write_str("incoming"),
            Direction::Outgoing => f.write_str("outgoing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::TokioRandomProvider;

    #[test]
    fn call_id_display() {
        let key = CallId::new(0x123456789ABCDEF0, 0xFEDCBA9876543210);
        assert_eq!(key.to_string(), "123456789abcdef0fedcba9876543210");
    }

    #[test]
    fn call_id_default_invalid() {
        assert!(!CallId::default().is_valid());
        assert!(CallId::new(0, 1).is_valid());
    }

    #[test]
    fn call_id_wire_roundtrip() {
        let key = CallId::new(0xDEAD_BEEF, 0xCAFE_F00D);
        let bytes = key.to_wire_bytes();
        assert_eq!(CallId::from_wire_bytes(&bytes), key);
    }

    #[test]
    fn call_id_random_draws_differ() {
        let random = TokioRandomProvider::new();
        let a = CallId::random(&random);
        let b = CallId::random(&random);
        // 2^-128 odds of a false failure.
        assert_ne!(a, b);
    }

    #[test]
    fn call_id_serde_roundtrip() {
        let key = CallId::new(7, 9);
        let json = serde_json::to_string(&key).expect("serialize");
        let decoded: CallId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(key, decoded);
    }

    #[test]
    fn peer_id_display() {
        let peer = PeerId::new("QmPeer");
        assert_eq!(peer.to_string(), "QmPeer");
        assert_eq!(peer.as_str(), "QmPeer");
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Incoming.to_string(), "incoming");
        assert_eq!(Direction::Outgoing.to_string(), "outgoing");
    }
}
