//! ECIES over secp256k1 for asymmetric envelopes.
//!
//! The construction matches the integrated encryption scheme deployed
//! by the surrounding ecosystem, so envelopes remain decryptable by
//! peers that implement the same scheme:
//!
//! ```text
//! 1. ephemeral ← secp256k1.generate()
//! 2. z ← ECDH(ephemeral, recipient).x          (32 bytes)
//! 3. K ← ConcatKDF-SHA256(z, 32)
//! 4. ke ← K[..16]           AES-128-CTR key
//! 5. km ← SHA256(K[16..])   HMAC key
//! 6. iv ← random 16 bytes
//! 7. ct ← AES-128-CTR(ke, iv, plaintext)
//! 8. tag ← HMAC-SHA256(km, iv ‖ ct)
//! 9. message ← R(65, SEC1 uncompressed) ‖ iv ‖ ct ‖ tag
//! ```
//!
//! Decryption failure carries no information about whether the holder
//! was the intended recipient; the ingress layer treats it as the
//! ordinary "not for me" outcome.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use hmac::{Hmac, Mac};
use k256::ecdh::EphemeralSecret;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use vesper_types::{Result, VesperError, PUBLIC_KEY_LENGTH};

use crate::ecdsa::{PublicKey, SecretKey};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// AES-128-CTR initialization vector length.
const IV_LENGTH: usize = 16;

/// HMAC-SHA256 tag length.
const TAG_LENGTH: usize = 32;

/// Bytes an ECIES message adds around its plaintext.
pub const ECIES_OVERHEAD: usize = PUBLIC_KEY_LENGTH + IV_LENGTH + TAG_LENGTH;

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// NIST SP 800-56 concatenation KDF over SHA-256 with an empty shared
/// info string: `K = H(1 ‖ z) ‖ H(2 ‖ z) ‖ …` truncated to `len`.
fn concat_kdf(z: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter: u32 = 1;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(z);
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

/// Splits the shared secret into the AES key and the (hashed) HMAC key.
fn derive_keys(z: &[u8]) -> ([u8; 16], [u8; 32]) {
    let derived = concat_kdf(z, 32);
    let mut ke = [0u8; 16];
    ke.copy_from_slice(&derived[..16]);
    let mut km = [0u8; 32];
    km.copy_from_slice(&Sha256::digest(&derived[16..]));
    (ke, km)
}

fn message_tag(km: &[u8; 32], iv_and_ct: &[u8]) -> Result<[u8; TAG_LENGTH]> {
    let mut mac = HmacSha256::new_from_slice(km).map_err(|e| VesperError::Crypto {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })?;
    mac.update(iv_and_ct);
    let mut out = [0u8; TAG_LENGTH];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

// ---------------------------------------------------------------------------
// Encrypt / decrypt
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` to the holder of `to`'s secret key.
///
/// A fresh ephemeral keypair and IV are drawn from `rng` per call, so
/// two encryptions of the same plaintext never produce the same
/// message.
pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    to: &PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random(rng);
    let ephemeral_pub = ephemeral.public_key().to_encoded_point(false);

    let recipient = k256::PublicKey::from(&to.0);
    let shared = ephemeral.diffie_hellman(&recipient);
    let (ke, km) = derive_keys(shared.raw_secret_bytes());

    let mut iv = [0u8; IV_LENGTH];
    rng.fill_bytes(&mut iv);

    let mut body = plaintext.to_vec();
    let mut cipher =
        Aes128Ctr::new_from_slices(&ke, &iv).map_err(|e| VesperError::Crypto {
            reason: format!("AES-CTR init failed: {e}"),
        })?;
    cipher.apply_keystream(&mut body);

    let mut out = Vec::with_capacity(ECIES_OVERHEAD + body.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&body);
    let tag = message_tag(&km, &out[PUBLIC_KEY_LENGTH..])?;
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypts an ECIES message with a secret key.
///
/// # Errors
///
/// Returns [`VesperError::Crypto`] when the message is too short,
/// the ephemeral key is not a curve point, or the authentication tag
/// does not verify — all of which the ingress layer folds into the
/// "not for me" outcome.
pub fn decrypt(key: &SecretKey, message: &[u8]) -> Result<Vec<u8>> {
    if message.len() < ECIES_OVERHEAD {
        return Err(VesperError::Crypto {
            reason: format!(
                "ECIES message shorter than the {ECIES_OVERHEAD} byte minimum",
            ),
        });
    }

    let (header, rest) = message.split_at(PUBLIC_KEY_LENGTH);
    let (iv, rest) = rest.split_at(IV_LENGTH);
    let (body, tag) = rest.split_at(rest.len() - TAG_LENGTH);

    let ephemeral =
        k256::PublicKey::from_sec1_bytes(header).map_err(|e| VesperError::Crypto {
            reason: format!("invalid ECIES ephemeral key: {e}"),
        })?;
    let shared = k256::ecdh::diffie_hellman(key.0.as_nonzero_scalar(), ephemeral.as_affine());
    let (ke, km) = derive_keys(shared.raw_secret_bytes());

    let mut mac = HmacSha256::new_from_slice(&km).map_err(|e| VesperError::Crypto {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })?;
    mac.update(&message[PUBLIC_KEY_LENGTH..message.len() - TAG_LENGTH]);
    mac.verify_slice(tag).map_err(|_| VesperError::Crypto {
        reason: "ECIES tag mismatch".into(),
    })?;

    let mut plaintext = body.to_vec();
    let mut cipher = Aes128Ctr::new_from_slices(&ke, iv).map_err(|e| VesperError::Crypto {
        reason: format!("AES-CTR init failed: {e}"),
    })?;
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn recipient() -> SecretKey {
        SecretKey::from_bytes(&[0x51; 32]).expect("valid scalar")
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() -> Result<()> {
        let key = recipient();
        let message = encrypt(&mut rng(), &key.public_key(), b"dark routed payload")?;
        let plaintext = decrypt(&key, &message)?;
        assert_eq!(plaintext, b"dark routed payload");
        Ok(())
    }

    #[test]
    fn empty_plaintext_roundtrip() -> Result<()> {
        let key = recipient();
        let message = encrypt(&mut rng(), &key.public_key(), b"")?;
        assert_eq!(message.len(), ECIES_OVERHEAD);
        assert!(decrypt(&key, &message)?.is_empty());
        Ok(())
    }

    #[test]
    fn wrong_key_fails_decrypt() -> Result<()> {
        let key = recipient();
        let other = SecretKey::from_bytes(&[0x52; 32])?;
        let message = encrypt(&mut rng(), &key.public_key(), b"secret")?;
        assert!(decrypt(&other, &message).is_err());
        Ok(())
    }

    #[test]
    fn tampered_body_fails_decrypt() -> Result<()> {
        let key = recipient();
        let mut message = encrypt(&mut rng(), &key.public_key(), b"secret")?;
        message[PUBLIC_KEY_LENGTH + IV_LENGTH] ^= 0xFF;
        assert!(decrypt(&key, &message).is_err());
        Ok(())
    }

    #[test]
    fn tampered_tag_fails_decrypt() -> Result<()> {
        let key = recipient();
        let mut message = encrypt(&mut rng(), &key.public_key(), b"secret")?;
        let last = message.len() - 1;
        message[last] ^= 0x01;
        assert!(decrypt(&key, &message).is_err());
        Ok(())
    }

    #[test]
    fn truncated_message_rejected() {
        let key = recipient();
        assert!(decrypt(&key, &[0u8; ECIES_OVERHEAD - 1]).is_err());
    }

    #[test]
    fn fresh_ephemeral_per_call() -> Result<()> {
        let key = recipient();
        let mut r = rng();
        let m1 = encrypt(&mut r, &key.public_key(), b"same plaintext")?;
        let m2 = encrypt(&mut r, &key.public_key(), b"same plaintext")?;
        assert_ne!(m1, m2);
        Ok(())
    }

    #[test]
    fn concat_kdf_single_block() {
        // 32 bytes of output is exactly one SHA-256 block: H(1 ‖ z).
        let z = [0xAB; 32];
        let direct = {
            let mut hasher = Sha256::new();
            hasher.update(1u32.to_be_bytes());
            hasher.update(z);
            hasher.finalize()
        };
        assert_eq!(concat_kdf(&z, 32), direct.to_vec());
    }

    #[test]
    fn concat_kdf_extends_with_counter() {
        let z = [0xCD; 32];
        let out = concat_kdf(&z, 48);
        assert_eq!(out.len(), 48);
        assert_eq!(&out[..32], concat_kdf(&z, 32).as_slice());
    }
}
