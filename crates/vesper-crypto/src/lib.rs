//! Cryptographic primitives for the Vesper envelope pipeline.
//!
//! Everything here is deterministic given its inputs; operations that
//! consume randomness take an injected RNG so tests can seed them.
//!
//! # Modules
//!
//! - [`hash`] — Keccak-256
//! - [`ecdsa`] — recoverable secp256k1 signatures and key wrappers
//! - [`ecies`] — asymmetric envelope encryption over secp256k1
//! - [`aead`] — AES-256-GCM sealing for symmetric envelopes
//! - [`kdf`] — PBKDF2 one-time key derivation from topic keys

pub mod aead;
pub mod ecdsa;
pub mod ecies;
pub mod hash;
pub mod kdf;
