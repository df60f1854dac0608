//! Core shared types for the Vesper dark-routing message bus.
//!
//! This crate defines the fundamental types used across the workspace:
//! the envelope topic tag, symmetric topic keys, Keccak-256 digests,
//! the normative wire constants, and the central [`VesperError`]
//! taxonomy. No other crate should define shared types — everything
//! lives here.

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

/// AES-256 key length in bytes (also the length of a topic key).
pub const AES_KEY_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// PBKDF2 salt length in bytes (travels in the envelope).
pub const SALT_LENGTH: usize = 12;

/// Recoverable ECDSA signature length: 32-byte R, 32-byte S, 1-byte
/// recovery id.
pub const SIGNATURE_LENGTH: usize = 65;

/// SEC1 uncompressed secp256k1 public key length (0x04-prefixed).
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Envelope topic tag length in bytes.
pub const TOPIC_LENGTH: usize = 4;

/// Padding target for plaintexts of up to this size.
pub const PAD_SIZE_LIMIT_LOWER: usize = 256;

/// Padding target for larger plaintexts.
pub const PAD_SIZE_LIMIT_UPPER: usize = 256;

/// Maximum length of the assembled message plaintext (256 KiB).
pub const MSG_MAX_LENGTH: usize = 256 * 1024;

/// Worst-case bytes added around a payload: flags byte, one full
/// padding block, and a signature.
pub const MAX_MSG_OVERHEAD: usize = 1 + PAD_SIZE_LIMIT_UPPER + SIGNATURE_LENGTH;

/// Time-to-live applied when the sender leaves the TTL at zero, in
/// seconds.
pub const DEFAULT_TTL: u32 = 50;

/// PBKDF2-HMAC-SHA256 iteration count for one-time key derivation.
/// Part of the wire contract: peers derive the same key only with the
/// same count.
pub const PBKDF2_ITERATIONS: u32 = 65_536;

/// The only envelope version this implementation understands.
pub const ENVELOPE_VERSION: u64 = 0;

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Fixed 4-byte tag identifying a named subject on the bus.
///
/// Two envelopes with identical topics are semantically related but
/// not necessarily decryptable by the same recipient; topics are
/// routing hints, never addresses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Topic([u8; TOPIC_LENGTH]);

impl Topic {
    /// The fixed byte length of a topic.
    pub const LEN: usize = TOPIC_LENGTH;

    /// Creates a new `Topic` from raw bytes.
    pub fn new(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; TOPIC_LENGTH] {
        &self.0
    }
}

impl From<[u8; TOPIC_LENGTH]> for Topic {
    fn from(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Topic {
    type Error = VesperError;

    fn try_from(bytes: &[u8]) -> std::result::Result<Self, Self::Error> {
        if bytes.len() != TOPIC_LENGTH {
            return Err(VesperError::Malformed {
                reason: format!("expected {} topic bytes, got {}", TOPIC_LENGTH, bytes.len()),
            });
        }
        let mut arr = [0u8; TOPIC_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

impl AsRef<[u8]> for Topic {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Topic {
    type Err = VesperError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| VesperError::InvalidParams {
            reason: "invalid hex encoding for topic".into(),
        })?;
        Self::try_from(bytes.as_slice()).map_err(|_| VesperError::InvalidParams {
            reason: format!("expected {} topic bytes, got {}", TOPIC_LENGTH, bytes.len()),
        })
    }
}

// ---------------------------------------------------------------------------
// TopicKey
// ---------------------------------------------------------------------------

/// 32-byte symmetric key shared by participants subscribed to a
/// topic's content.
///
/// An all-zero key is invalid wherever a key is required; use
/// [`TopicKey::is_zero`] to screen inputs before any derivation runs.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct TopicKey([u8; AES_KEY_LENGTH]);

impl TopicKey {
    /// The fixed byte length of a topic key.
    pub const LEN: usize = AES_KEY_LENGTH;

    /// Creates a new `TopicKey` from raw bytes.
    pub fn new(bytes: [u8; AES_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }

    /// Returns `true` when every byte of the key is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl From<[u8; AES_KEY_LENGTH]> for TopicKey {
    fn from(bytes: [u8; AES_KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for TopicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// TopicKey intentionally does not implement Debug or Display so key
// material cannot end up in logs.

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// 32-byte Keccak-256 digest.
///
/// Used for the envelope identity (`Keccak256(RLP(envelope))`) and for
/// the topic-key hash carried by received messages. [`Hash::ZERO`]
/// marks "absent" where a digest is optional.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The fixed byte length of a digest.
    pub const LEN: usize = 32;

    /// The all-zero digest, marking an absent hash.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Creates a new `Hash` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns `true` for the all-zero (absent) digest.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = VesperError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| VesperError::InvalidParams {
            reason: "invalid hex encoding for hash".into(),
        })?;
        if bytes.len() != 32 {
            return Err(VesperError::InvalidParams {
                reason: format!("expected 32 hash bytes, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// VesperError
// ---------------------------------------------------------------------------

/// Central error type for the Vesper envelope pipeline.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
/// Note that "no candidate key decrypted this envelope" is *not* an
/// error: it is the ordinary `NotForMe` outcome surfaced by the
/// ingress layer as a result variant, never through this type.
#[derive(Debug, Error)]
pub enum VesperError {
    /// The caller's parameters have the wrong shape (both or neither
    /// of destination key and topic key, bad sizes, negative work
    /// target).
    #[error("invalid parameters: {reason}")]
    InvalidParams {
        /// Human-readable description of the parameter problem.
        reason: String,
    },

    /// The assembled plaintext exceeds the protocol maximum.
    #[error("oversized message: {size} bytes exceeds the {max} byte limit")]
    Oversized {
        /// Actual size of the assembled plaintext.
        size: usize,
        /// The enforced maximum.
        max: usize,
    },

    /// A key has the wrong size or is otherwise unusable (all-zero
    /// symmetric key, invalid curve point).
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Human-readable description of the key problem.
        reason: String,
    },

    /// A cryptographic primitive failed on well-formed inputs
    /// (encryption, decryption, derivation, signing).
    #[error("crypto failure: {reason}")]
    Crypto {
        /// Human-readable description of the primitive failure.
        reason: String,
    },

    /// Public-key recovery from a signature failed.
    #[error("signature recovery failed: {reason}")]
    Recovery {
        /// Human-readable description of the recovery failure.
        reason: String,
    },

    /// RLP input does not match the expected shape.
    #[error("rlp: {reason}")]
    Rlp {
        /// Human-readable description of the decoding failure.
        reason: String,
    },

    /// The proof-of-work search exhausted its wall-clock budget
    /// without finding an acceptable nonce. No envelope is emitted.
    #[error("insufficient work: no acceptable nonce within {work_time}s")]
    InsufficientWork {
        /// The exhausted budget in seconds.
        work_time: u32,
    },

    /// An ingress envelope parses but violates protocol invariants
    /// (flags, padding, signature recovery, version, expiry, PoW).
    /// Absorbed locally by nodes: the envelope is dropped and counted.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// Human-readable description of the violated invariant.
        reason: String,
    },

    /// A configuration value is invalid or out of range.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`VesperError`].
pub type Result<T> = std::result::Result<T, VesperError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_roundtrip_hex() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let topic = Topic::new([0xDE, 0xAD, 0xBE, 0xEF]);
        let hex_str = topic.to_string();
        assert_eq!(hex_str, "deadbeef");
        let parsed: Topic = hex_str.parse()?;
        assert_eq!(topic, parsed);
        Ok(())
    }

    #[test]
    fn topic_invalid_hex_length() {
        let result: std::result::Result<Topic, _> = "deadbeefff".parse();
        assert!(result.is_err());
    }

    #[test]
    fn topic_from_short_slice_rejected() {
        let result = Topic::try_from(&[0x01, 0x02][..]);
        assert!(result.is_err());
    }

    #[test]
    fn topic_from_exact_slice() -> Result<()> {
        let topic = Topic::try_from(&[1, 2, 3, 4][..])?;
        assert_eq!(topic.as_bytes(), &[1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn topic_key_zero_detection() {
        assert!(TopicKey::new([0u8; 32]).is_zero());
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        assert!(!TopicKey::new(bytes).is_zero());
    }

    #[test]
    fn hash_zero_marks_absent() {
        assert!(Hash::ZERO.is_zero());
        assert!(!Hash::new([1u8; 32]).is_zero());
    }

    #[test]
    fn hash_roundtrip_hex() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let hash = Hash::new([0xAB; 32]);
        let parsed: Hash = hash.to_string().parse()?;
        assert_eq!(hash, parsed);
        Ok(())
    }

    #[test]
    fn hash_serde_json_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let hash = Hash::new([0x11; 32]);
        let json = serde_json::to_string(&hash)?;
        let parsed: Hash = serde_json::from_str(&json)?;
        assert_eq!(hash, parsed);
        Ok(())
    }

    #[test]
    fn error_display_carries_reason() {
        let err = VesperError::InvalidParams {
            reason: "both keys set".into(),
        };
        assert!(err.to_string().contains("both keys set"));
    }

    #[test]
    fn overhead_covers_flags_padding_and_signature() {
        assert_eq!(MAX_MSG_OVERHEAD, 1 + 256 + 65);
    }
}
