//! PBKDF2 one-time key derivation.
//!
//! Each symmetric envelope derives a fresh AES key from the shared
//! topic key and a per-envelope random salt. The iteration count is
//! part of the wire contract: peers derive the same key only with the
//! same count, so it is a protocol constant rather than a tunable.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use vesper_types::{Result, VesperError, AES_KEY_LENGTH, ENVELOPE_VERSION, PBKDF2_ITERATIONS};
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// OneTimeKey
// ---------------------------------------------------------------------------

/// 256-bit AES key derived for a single envelope.
///
/// Automatically zeroized when dropped to minimize the time sensitive
/// material resides in memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct OneTimeKey([u8; AES_KEY_LENGTH]);

impl OneTimeKey {
    /// Fixed byte length of the derived key.
    pub const LEN: usize = AES_KEY_LENGTH;

    /// Returns the raw 32-byte key material.
    pub fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }

    /// Returns `true` when every byte of the key is zero. A derived
    /// key that is all zero must be rejected before use.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

// OneTimeKey does not implement Clone/Debug to prevent leakage.

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derives the one-time AES key for an envelope of the given version:
/// `PBKDF2-HMAC-SHA256(topic_key, salt, 65 536 iterations, 32 bytes)`.
///
/// # Errors
///
/// Returns [`VesperError::Crypto`] for any version other than the one
/// this implementation understands — key derivation is version-gated
/// so a future format bump cannot silently reuse the old schedule.
pub fn derive_one_time_key(key: &[u8], salt: &[u8], version: u64) -> Result<OneTimeKey> {
    if version != ENVELOPE_VERSION {
        return Err(VesperError::Crypto {
            reason: format!("cannot derive key for envelope version {version}"),
        });
    }

    let mut out = [0u8; AES_KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(key, salt, PBKDF2_ITERATIONS, &mut out);
    Ok(OneTimeKey(out))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
