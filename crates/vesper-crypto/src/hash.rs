//! Keccak-256 hashing.
//!
//! All hashing in Vesper uses Keccak-256 (the pre-NIST padding
//! variant, not SHA3-256): envelope identities, proof-of-work digests,
//! signing digests, and topic-key hashes.

use sha3::{Digest, Keccak256};
use vesper_types::Hash;

/// Computes the Keccak-256 hash of arbitrary data.
///
/// Returns a fixed 32-byte digest. Deterministic: identical inputs
/// always produce identical outputs.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    Hash::new(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
