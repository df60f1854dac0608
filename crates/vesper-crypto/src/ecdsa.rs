//! Recoverable ECDSA over secp256k1.
//!
//! Signatures are 65 bytes: 32-byte R, 32-byte S, 1-byte recovery id.
//! The recovery id lets the verifier recover the signer's public key
//! from the digest and signature alone, which is how envelope
//! consumers learn the sender identity without it ever appearing on
//! the wire in the clear.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use vesper_types::{Hash, Result, VesperError, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// secp256k1 public key.
///
/// Serialized as the 65-byte SEC1 uncompressed representation
/// (`0x04`-prefixed) wherever it crosses an interface boundary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey(pub(crate) VerifyingKey);

impl PublicKey {
    /// SEC1 uncompressed encoding length.
    pub const LEN: usize = PUBLIC_KEY_LENGTH;

    /// Parses a public key from SEC1 bytes (compressed or
    /// uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let vk = VerifyingKey::from_sec1_bytes(bytes).map_err(|e| VesperError::InvalidKey {
            reason: format!("invalid secp256k1 public key: {e}"),
        })?;
        Ok(Self(vk))
    }

    /// Returns the 65-byte SEC1 uncompressed encoding.
    pub fn to_sec1_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let point = self.0.to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        out.copy_from_slice(point.as_bytes());
        out
    }
}

// ---------------------------------------------------------------------------
// SecretKey
// ---------------------------------------------------------------------------

/// secp256k1 secret key used for signing and for ECIES decryption.
pub struct SecretKey(pub(crate) SigningKey);

impl SecretKey {
    /// Generates a new random secret key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(SigningKey::random(rng))
    }

    /// Reconstructs a secret key deterministically from 32 scalar
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VesperError::InvalidKey`] if the bytes are zero or
    /// not a valid field scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let sk = SigningKey::from_slice(bytes).map_err(|e| VesperError::InvalidKey {
            reason: format!("invalid secp256k1 secret key: {e}"),
        })?;
        Ok(Self(sk))
    }

    /// Returns the public half of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(VerifyingKey::from(&self.0))
    }
}

// SecretKey intentionally does not implement Clone or Debug to prevent
// accidental leakage of the private key in logs or copies.

// ---------------------------------------------------------------------------
// Sign / recover
// ---------------------------------------------------------------------------

/// Signs a 32-byte digest, returning the 65-byte recoverable
/// signature.
///
/// Deterministic per RFC 6979: the same key and digest always yield
/// the same signature.
pub fn sign_recoverable(key: &SecretKey, digest: &Hash) -> Result<[u8; SIGNATURE_LENGTH]> {
    let (signature, recovery_id) = key
        .0
        .sign_prehash_recoverable(digest.as_bytes())
        .map_err(|e| VesperError::Crypto {
            reason: format!("ecdsa signing failed: {e}"),
        })?;

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(out)
}

/// Recovers the signer's public key from a digest and a 65-byte
/// recoverable signature.
///
/// # Errors
///
/// Returns [`VesperError::Recovery`] if the signature has the wrong
/// length, carries an invalid recovery id, or does not resolve to a
/// curve point for the given digest.
pub fn recover(digest: &Hash, signature: &[u8]) -> Result<PublicKey> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(VesperError::Recovery {
            reason: format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_LENGTH,
                signature.len()
            ),
        });
    }

    let sig = Signature::from_slice(&signature[..64]).map_err(|e| VesperError::Recovery {
        reason: format!("invalid signature scalars: {e}"),
    })?;
    let recovery_id =
        RecoveryId::from_byte(signature[64]).ok_or_else(|| VesperError::Recovery {
            reason: format!("invalid recovery id: {}", signature[64]),
        })?;

    let vk = VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recovery_id).map_err(
        |e| VesperError::Recovery {
            reason: format!("public key recovery failed: {e}"),
        },
    )?;
    Ok(PublicKey(vk))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::keccak256;

    fn test_key() -> SecretKey {
        SecretKey::from_bytes(&[0x42; 32]).expect("valid scalar")
    }

    #[test]
    fn sign_recover_roundtrip() -> Result<()> {
        let key = test_key();
        let digest = keccak256(b"vesper message digest");
        let sig = sign_recoverable(&key, &digest)?;
        let recovered = recover(&digest, &sig)?;
        assert_eq!(recovered, key.public_key());
        Ok(())
    }

    #[test]
    fn signing_is_deterministic() -> Result<()> {
        let key = test_key();
        let digest = keccak256(b"rfc6979");
        assert_eq!(sign_recoverable(&key, &digest)?, sign_recoverable(&key, &digest)?);
        Ok(())
    }

    #[test]
    fn recover_with_wrong_digest_yields_wrong_key() -> Result<()> {
        let key = test_key();
        let digest = keccak256(b"signed digest");
        let sig = sign_recoverable(&key, &digest)?;

        let other = keccak256(b"different digest");
        // Recovery either fails outright or resolves to an unrelated key.
        if let Ok(recovered) = recover(&other, &sig) {
            assert_ne!(recovered, key.public_key());
        }
        Ok(())
    }

    #[test]
    fn short_signature_rejected() {
        let digest = keccak256(b"digest");
        let result = recover(&digest, &[0u8; 64]);
        assert!(matches!(result, Err(VesperError::Recovery { .. })));
    }

    #[test]
    fn invalid_recovery_id_rejected() -> Result<()> {
        let key = test_key();
        let digest = keccak256(b"digest");
        let mut sig = sign_recoverable(&key, &digest)?;
        sig[64] = 27;
        assert!(matches!(recover(&digest, &sig), Err(VesperError::Recovery { .. })));
        Ok(())
    }

    #[test]
    fn zero_signature_rejected() {
        let digest = keccak256(b"digest");
        let result = recover(&digest, &[0u8; 65]);
        assert!(result.is_err());
    }

    #[test]
    fn sec1_roundtrip_uncompressed() -> Result<()> {
        let key = test_key();
        let public = key.public_key();
        let bytes = public.to_sec1_bytes();
        assert_eq!(bytes[0], 0x04);
        let parsed = PublicKey::from_sec1_bytes(&bytes)?;
        assert_eq!(parsed, public);
        Ok(())
    }

    #[test]
    fn zero_secret_key_rejected() {
        assert!(SecretKey::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn random_keys_differ() {
        use rand::rngs::OsRng;
        let a = SecretKey::random(&mut OsRng);
        let b = SecretKey::random(&mut OsRng);
        assert_ne!(a.public_key(), b.public_key());
    }
}
