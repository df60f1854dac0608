//! AES-256-GCM authenticated encryption for symmetric envelopes.
//!
//! Symmetric envelope bodies are sealed with AES-256-GCM under a
//! PBKDF2-derived one-time key and a fresh 96-bit (12-byte) nonce.
//! Associated data is always empty: the envelope metadata is covered
//! by the proof-of-work digest instead. Nonces **must never be
//! reused** with the same derived key; the per-envelope salt makes
//! every derived key one-time, which is what makes the random nonce
//! safe.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use vesper_types::{Result, VesperError, AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Encrypts `plaintext` with AES-256-GCM and empty associated data.
///
/// The returned ciphertext carries the 16-byte GCM authentication tag
/// appended (length = plaintext length + 16).
pub fn aes_gcm_seal(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| VesperError::Crypto {
            reason: format!("AES-256-GCM encryption failed: {e}"),
        })
}

/// Decrypts an AES-256-GCM ciphertext with empty associated data.
///
/// # Errors
///
/// Returns [`VesperError::Crypto`] if tag verification fails (wrong
/// key, wrong nonce, or tampered ciphertext) — the ingress layer
/// folds this into the "not for me" outcome.
pub fn aes_gcm_open(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| VesperError::Crypto {
            reason: format!("AES-256-GCM decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
