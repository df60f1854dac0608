//! Message assembly and extraction.
//!
//! The plaintext layout is `flags ‖ padding ‖ payload ‖ signature?`.
//!
//! Flags byte, least significant bits first:
//!
//! - bits 0–1: width of the padding-length field in bytes (0–3); zero
//!   means no padding block is present
//! - bit 2: a 65-byte recoverable signature trails the plaintext
//! - bits 3–7: pseudorandom
//!
//! The padding block's first bytes encode its own total length in
//! little-endian; the rest is random fill (or caller-supplied bytes)
//! that rounds the plaintext up to a multiple of the padding target,
//! hiding the payload size from anyone who manages to decrypt.

use rand::{CryptoRng, RngCore};

use vesper_crypto::aead;
use vesper_crypto::ecdsa::{self, PublicKey, SecretKey};
use vesper_crypto::ecies;
use vesper_crypto::hash::keccak256;
use vesper_crypto::kdf;
use vesper_types::{
    Hash, Result, Topic, TopicKey, VesperError, AES_NONCE_LENGTH, DEFAULT_TTL, ENVELOPE_VERSION,
    MAX_MSG_OVERHEAD, MSG_MAX_LENGTH, PAD_SIZE_LIMIT_LOWER, PAD_SIZE_LIMIT_UPPER, SALT_LENGTH,
    SIGNATURE_LENGTH,
};

use crate::envelope::Envelope;

/// Flag bit marking a trailing 65-byte signature.
pub const SIGNATURE_FLAG: u8 = 0b0000_0100;

/// Flag bits holding the width of the padding-length field.
pub const PAD_SIZE_MASK: u8 = 0b0000_0011;

fn is_signed(flags: u8) -> bool {
    flags & SIGNATURE_FLAG != 0
}

// ---------------------------------------------------------------------------
// MessageParams
// ---------------------------------------------------------------------------

/// The caller's request to send: exactly how a message is wrapped
/// into an envelope.
///
/// Exactly one of `dst` and `key_sym` must be set — the two encryption
/// modes are mutually exclusive, and the mismatch is surfaced before
/// any cryptography runs.
pub struct MessageParams {
    /// Time-to-live in seconds; zero selects the protocol default.
    pub ttl: u32,
    /// Sender signing key. When present the plaintext carries a
    /// recoverable signature.
    pub src: Option<SecretKey>,
    /// Recipient public key (asymmetric mode).
    pub dst: Option<PublicKey>,
    /// Shared topic key (symmetric mode).
    pub key_sym: Option<TopicKey>,
    /// Topic tag carried in the clear on the envelope.
    pub topic: Topic,
    /// Wall-clock seconds the PoW sealer may spend searching.
    pub work_time: u32,
    /// Target difficulty in bits-of-leading-zero budget.
    pub pow: f64,
    /// The message body.
    pub payload: Vec<u8>,
    /// Optional caller-supplied padding override; copied into the tail
    /// of the padding block in place of random fill.
    pub padding: Option<Vec<u8>>,
}

/// The encryption mode a parameter set selects. A closed, two-variant
/// choice so every consumer handles both modes exhaustively.
pub enum KeyKind<'a> {
    /// Symmetric: AES-256-GCM under a PBKDF2-derived one-time key.
    Symmetric(&'a TopicKey),
    /// Asymmetric: ECIES under the recipient's public key.
    Asymmetric(&'a PublicKey),
}

impl MessageParams {
    /// Resolves which encryption mode these parameters select.
    ///
    /// # Errors
    ///
    /// Returns [`VesperError::InvalidParams`] when both or neither of
    /// `dst` / `key_sym` are set.
    pub fn key_kind(&self) -> Result<KeyKind<'_>> {
        match (&self.dst, &self.key_sym) {
            (Some(dst), None) => Ok(KeyKind::Asymmetric(dst)),
            (None, Some(key)) => Ok(KeyKind::Symmetric(key)),
            (Some(_), Some(_)) => Err(VesperError::InvalidParams {
                reason: "both dst and key_sym are set".into(),
            }),
            (None, None) => Err(VesperError::InvalidParams {
                reason: "neither dst nor key_sym is set".into(),
            }),
        }
    }

    /// Validates the parameter shape before any bytes are touched.
    pub fn validate(&self) -> Result<()> {
        if let KeyKind::Symmetric(key) = self.key_kind()? {
            if key.is_zero() {
                return Err(VesperError::InvalidKey {
                    reason: "symmetric topic key is all zero".into(),
                });
            }
        }
        if !self.pow.is_finite() || self.pow < 0.0 {
            return Err(VesperError::InvalidParams {
                reason: format!("pow must be finite and non-negative, got {}", self.pow),
            });
        }
        if self.work_time == 0 {
            return Err(VesperError::InvalidParams {
                reason: "work_time must be greater than 0".into(),
            });
        }
        if self.payload.len() > MSG_MAX_LENGTH - MAX_MSG_OVERHEAD {
            return Err(VesperError::Oversized {
                size: self.payload.len(),
                max: MSG_MAX_LENGTH - MAX_MSG_OVERHEAD,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SentMessage
// ---------------------------------------------------------------------------

/// The plaintext assembly buffer for an outbound message. Created by
/// the sender, consumed by envelope assembly.
pub struct SentMessage {
    raw: Vec<u8>,
}

impl SentMessage {
    /// Builds the initial plaintext: a flags byte with pseudorandom
    /// high bits, the padding block, and the payload.
    pub fn new<R: RngCore + CryptoRng>(params: &MessageParams, rng: &mut R) -> Result<Self> {
        params.validate()?;

        let mut flag_byte = [0u8; 1];
        rng.fill_bytes(&mut flag_byte);
        let flags = flag_byte[0] & !PAD_SIZE_MASK & !SIGNATURE_FLAG;

        let mut message = Self {
            raw: Vec::with_capacity(
                1 + params.payload.len() + PAD_SIZE_LIMIT_UPPER + SIGNATURE_LENGTH,
            ),
        };
        message.raw.push(flags);
        message.append_padding(params, rng)?;
        message.raw.extend_from_slice(&params.payload);
        Ok(message)
    }

    /// Appends the pseudorandom padding block and records its width in
    /// the flags byte.
    ///
    /// The block rounds `flags ‖ padding ‖ payload ‖ signature?` up to
    /// a multiple of the padding target; its first bytes encode the
    /// block length little-endian. When the final size is already a
    /// multiple, no block is emitted.
    fn append_padding<R: RngCore + CryptoRng>(
        &mut self,
        params: &MessageParams,
        rng: &mut R,
    ) -> Result<()> {
        let mut total = 1 + params.payload.len();
        if params.src.is_some() {
            total += SIGNATURE_LENGTH;
        }
        let target = if total <= PAD_SIZE_LIMIT_LOWER {
            PAD_SIZE_LIMIT_LOWER
        } else {
            PAD_SIZE_LIMIT_UPPER
        };

        let pad_len = (target - total % target) % target;
        if pad_len == 0 {
            return Ok(());
        }

        let width = pad_length_width(pad_len);
        if width > PAD_SIZE_MASK as usize {
            return Err(VesperError::InvalidParams {
                reason: format!("padding of {pad_len} bytes does not fit the length field"),
            });
        }

        let mut block = vec![0u8; pad_len];
        block[..width].copy_from_slice(&(pad_len as u32).to_le_bytes()[..width]);
        rng.fill_bytes(&mut block[width..]);
        if let Some(padding) = &params.padding {
            let fill = &mut block[width..];
            let n = padding.len().min(fill.len());
            let at = fill.len() - n;
            fill[at..].copy_from_slice(&padding[..n]);
        }

        self.raw.extend_from_slice(&block);
        self.raw[0] |= width as u8;
        Ok(())
    }

    /// Signs the assembled plaintext and sets the signature flag.
    ///
    /// The digest covers `flags ‖ padding ‖ payload`; the 65-byte
    /// recoverable signature is appended only when signing succeeds.
    fn sign(&mut self, key: &SecretKey) -> Result<()> {
        if is_signed(self.raw[0]) {
            return Err(VesperError::Crypto {
                reason: "message is already signed".into(),
            });
        }
        let digest = keccak256(&self.raw);
        let signature = ecdsa::sign_recoverable(key, &digest)?;
        self.raw.extend_from_slice(&signature);
        self.raw[0] |= SIGNATURE_FLAG;
        Ok(())
    }

    /// Encrypts in place with a one-time key derived from the topic
    /// key and a fresh salt; returns the salt and AES nonce that must
    /// travel in the envelope.
    fn encrypt_symmetric<R: RngCore + CryptoRng>(
        &mut self,
        key: &TopicKey,
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        if key.is_zero() {
            return Err(VesperError::InvalidKey {
                reason: "symmetric topic key is all zero".into(),
            });
        }

        let mut salt = [0u8; SALT_LENGTH];
        rng.fill_bytes(&mut salt);
        if salt.iter().all(|&b| b == 0) {
            return Err(VesperError::Crypto {
                reason: "failed to generate salt".into(),
            });
        }

        let derived = kdf::derive_one_time_key(key.as_bytes(), &salt, ENVELOPE_VERSION)?;
        if derived.is_zero() {
            return Err(VesperError::Crypto {
                reason: "derived one-time key is all zero".into(),
            });
        }

        let mut nonce = [0u8; AES_NONCE_LENGTH];
        rng.fill_bytes(&mut nonce);
        self.raw = aead::aes_gcm_seal(derived.as_bytes(), &nonce, &self.raw)?;
        Ok((salt.to_vec(), nonce.to_vec()))
    }

    /// Encrypts in place under the recipient's public key.
    fn encrypt_asymmetric<R: RngCore + CryptoRng>(
        &mut self,
        key: &PublicKey,
        rng: &mut R,
    ) -> Result<()> {
        self.raw = ecies::encrypt(rng, key, &self.raw)?;
        Ok(())
    }

    /// Bundles the message into a sealed [`Envelope`] for the network.
    ///
    /// The parameter combination controls identity and privacy:
    ///
    /// - no `src`, symmetric key: anonymous broadcast
    /// - `src`, symmetric key: signed broadcast (known sender)
    /// - no `src`, `dst`: encrypted anonymous message
    /// - `src` and `dst`: encrypted signed message
    pub fn wrap<R: RngCore + CryptoRng>(
        mut self,
        params: &MessageParams,
        rng: &mut R,
    ) -> Result<Envelope> {
        let ttl = if params.ttl == 0 { DEFAULT_TTL } else { params.ttl };

        if let Some(src) = &params.src {
            self.sign(src)?;
        }
        if self.raw.len() > MSG_MAX_LENGTH {
            return Err(VesperError::Oversized {
                size: self.raw.len(),
                max: MSG_MAX_LENGTH,
            });
        }

        let (salt, aes_nonce) = match params.key_kind()? {
            KeyKind::Symmetric(key) => self.encrypt_symmetric(key, rng)?,
            KeyKind::Asymmetric(dst) => {
                self.encrypt_asymmetric(dst, rng)?;
                (Vec::new(), Vec::new())
            }
        };

        let envelope = Envelope::assemble(ttl, params.topic, salt, aes_nonce, self.raw);
        envelope.seal(params.pow, params.work_time)
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> &[u8] {
        &self.raw
    }
}

// ---------------------------------------------------------------------------
// ReceivedMessage
// ---------------------------------------------------------------------------

/// The decoded message surfaced to the consumer after a decryption
/// attempt succeeded and the plaintext validated. Immutable once
/// produced; `envelope_hash` is the deduplication identity.
pub struct ReceivedMessage {
    raw: Vec<u8>,

    /// The message body.
    pub payload: Vec<u8>,
    /// Padding fill (excluding the length prefix); empty when the
    /// plaintext carried no padding block.
    pub padding: Vec<u8>,
    /// The 65-byte recoverable signature, or empty when unsigned.
    pub signature: Vec<u8>,

    /// Recovered sender public key; `None` for unsigned messages.
    pub src: Option<PublicKey>,
    /// Recipient identity for asymmetric mode; `None` for symmetric.
    pub dst: Option<PublicKey>,
    /// Topic tag from the envelope.
    pub topic: Topic,

    /// Keccak-256 of the topic key for symmetric mode; zero otherwise.
    pub topic_key_hash: Hash,
    /// Envelope identity, the deduplication key.
    pub envelope_hash: Hash,
    /// Version of the carrying envelope.
    pub envelope_version: u64,

    /// Proof-of-work score of the carrying envelope.
    pub pow: f64,
    /// Second at which the message entered the network.
    pub sent: u32,
    /// TTL of the carrying envelope in seconds.
    pub ttl: u32,
}

impl ReceivedMessage {
    /// Wraps a decrypted plaintext with its envelope metadata. The
    /// buffer is not trusted until [`validate`](Self::validate) runs.
    pub(crate) fn new(raw: Vec<u8>, envelope: &Envelope, pow: f64) -> Self {
        Self {
            raw,
            payload: Vec::new(),
            padding: Vec::new(),
            signature: Vec::new(),
            src: None,
            dst: None,
            topic: envelope.topic(),
            topic_key_hash: Hash::ZERO,
            envelope_hash: envelope.hash(),
            envelope_version: envelope.version(),
            pow,
            sent: envelope.sent_time(),
            ttl: envelope.ttl(),
        }
    }

    /// Marks the message as decrypted with a topic key.
    pub(crate) fn set_symmetric(&mut self, key: &TopicKey) {
        self.topic_key_hash = keccak256(key.as_bytes());
    }

    /// Marks the message as decrypted with the private key matching
    /// `dst`.
    pub(crate) fn set_asymmetric(&mut self, dst: PublicKey) {
        self.dst = Some(dst);
    }

    /// `true` when a topic key decrypted this message.
    pub fn is_symmetric(&self) -> bool {
        !self.topic_key_hash.is_zero()
    }

    /// `true` when a private key decrypted this message.
    pub fn is_asymmetric(&self) -> bool {
        self.dst.is_some()
    }

    /// Checks the plaintext invariants and extracts payload, padding,
    /// signature, and the recovered sender key.
    ///
    /// # Errors
    ///
    /// Returns [`VesperError::Malformed`] when the flags, padding
    /// bounds, or signature recovery are inconsistent, without
    /// revealing which check rejected beyond the reason string.
    pub(crate) fn validate(&mut self) -> Result<()> {
        let mut end = self.raw.len();
        if end < 1 {
            return Err(VesperError::Malformed {
                reason: "empty plaintext".into(),
            });
        }

        if is_signed(self.raw[0]) {
            if end <= 1 + SIGNATURE_LENGTH {
                return Err(VesperError::Malformed {
                    reason: "signed plaintext too short".into(),
                });
            }
            end -= SIGNATURE_LENGTH;
            self.signature = self.raw[end..].to_vec();
            let digest = keccak256(&self.raw[..end]);
            let src = ecdsa::recover(&digest, &self.signature).map_err(|_| {
                VesperError::Malformed {
                    reason: "signature recovery failed".into(),
                }
            })?;
            self.src = Some(src);
        }

        let pad_len = self.extract_padding(end)?;
        self.payload = self.raw[1 + pad_len..end].to_vec();

        if self.is_symmetric() == self.is_asymmetric() {
            return Err(VesperError::Malformed {
                reason: "ambiguous encryption mode".into(),
            });
        }
        Ok(())
    }

    /// Decodes the padding block per the width recorded in the flags
    /// byte and returns the full block length.
    ///
    /// Padding blocks longer than this implementation ever emits are
    /// still accepted, as long as the encoded length is self-
    /// consistent.
    fn extract_padding(&mut self, end: usize) -> Result<usize> {
        let width = (self.raw[0] & PAD_SIZE_MASK) as usize;
        if width == 0 {
            return Ok(0);
        }
        if 1 + width > end {
            return Err(VesperError::Malformed {
                reason: "padding length field out of bounds".into(),
            });
        }

        let mut pad_len = 0usize;
        for (i, &b) in self.raw[1..1 + width].iter().enumerate() {
            pad_len |= (b as usize) << (8 * i);
        }
        if pad_len < width || 1 + pad_len > end {
            return Err(VesperError::Malformed {
                reason: "padding length out of bounds".into(),
            });
        }

        self.padding = self.raw[1 + width..1 + pad_len].to_vec();
        Ok(pad_len)
    }
}

/// Bytes needed to express a padding length.
fn pad_length_width(pad_len: usize) -> usize {
    if pad_len < 1 << 8 {
        1
    } else if pad_len < 1 << 16 {
        2
    } else if pad_len < 1 << 24 {
        3
    } else {
        4
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
