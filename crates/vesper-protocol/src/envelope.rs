//! The on-wire envelope.
//!
//! An envelope is the flood-forwarded unit of the bus: an RLP list
//! `[version, expiry, ttl, topic, salt, aes_nonce, data, env_nonce]`
//! sealed by proof-of-work. Salt and AES nonce are empty byte strings
//! in asymmetric mode. The envelope's identity is
//! `Keccak256(RLP(envelope))` and serves as the deduplication key for
//! the (external) envelope pool.
//!
//! Envelopes are immutable once sealed: sealing consumes the unsealed
//! value, and a sealed envelope only ever leaves this module by value
//! or shared reference.

use std::time::{SystemTime, UNIX_EPOCH};

use vesper_crypto::hash::keccak256;
use vesper_types::{
    Hash, Result, Topic, VesperError, AES_NONCE_LENGTH, ENVELOPE_VERSION, SALT_LENGTH,
};

use crate::pow;
use crate::rlp;

/// Current unix time in whole seconds.
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A PoW-sealed, encrypted packet carrying one opaque message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    version: u64,
    expiry: u32,
    ttl: u32,
    topic: Topic,
    salt: Vec<u8>,
    aes_nonce: Vec<u8>,
    data: Vec<u8>,
    env_nonce: u64,
}

impl Envelope {
    /// Assembles an unsealed envelope around a ciphertext. The expiry
    /// is fixed at assembly: `now + ttl`.
    pub(crate) fn assemble(
        ttl: u32,
        topic: Topic,
        salt: Vec<u8>,
        aes_nonce: Vec<u8>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            expiry: unix_now().saturating_add(ttl),
            ttl,
            topic,
            salt,
            aes_nonce,
            data,
            env_nonce: 0,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Protocol version carried by this envelope.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Absolute wall-clock second after which the envelope is stale.
    pub fn expiry(&self) -> u32 {
        self.expiry
    }

    /// Time-to-live in seconds.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Topic tag.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// PBKDF2 salt (empty in asymmetric mode).
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// AES-GCM nonce (empty in asymmetric mode).
    pub fn aes_nonce(&self) -> &[u8] {
        &self.aes_nonce
    }

    /// Ciphertext.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The sealed proof-of-work nonce.
    pub fn env_nonce(&self) -> u64 {
        self.env_nonce
    }

    /// Second at which the message entered the network: expiry minus
    /// TTL.
    pub fn sent_time(&self) -> u32 {
        self.expiry.saturating_sub(self.ttl)
    }

    /// Whether the envelope is stale at the given wall-clock second.
    pub fn is_expired(&self, now: u32) -> bool {
        self.expiry < now
    }

    // ------------------------------------------------------------------
    // Wire codec
    // ------------------------------------------------------------------

    /// Encodes the full envelope as its canonical RLP list.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = self.encode_fields();
        rlp::encode_uint(&mut payload, self.env_nonce);
        rlp::wrap_list(&payload)
    }

    /// RLP list of every field except the PoW nonce — the prefix the
    /// PoW digest is computed over.
    fn rlp_without_nonce(&self) -> Vec<u8> {
        rlp::wrap_list(&self.encode_fields())
    }

    fn encode_fields(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.data.len() + 64);
        rlp::encode_uint(&mut payload, self.version);
        rlp::encode_uint(&mut payload, self.expiry as u64);
        rlp::encode_uint(&mut payload, self.ttl as u64);
        rlp::encode_bytes(&mut payload, self.topic.as_bytes());
        rlp::encode_bytes(&mut payload, &self.salt);
        rlp::encode_bytes(&mut payload, &self.aes_nonce);
        rlp::encode_bytes(&mut payload, &self.data);
        payload
    }

    /// Decodes an envelope from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VesperError::Malformed`] for anything that is not a
    /// canonical envelope: RLP shape violations, trailing bytes, or
    /// field sizes outside the wire contract.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_inner(bytes).map_err(|e| match e {
            VesperError::Rlp { reason } => VesperError::Malformed {
                reason: format!("undecodable envelope: {reason}"),
            },
            other => other,
        })
    }

    fn decode_inner(bytes: &[u8]) -> Result<Self> {
        let mut outer = rlp::Decoder::new(bytes);
        let mut fields = outer.enter_list()?;
        if !outer.is_empty() {
            return Err(VesperError::Malformed {
                reason: "trailing bytes after envelope".into(),
            });
        }

        let version = fields.take_uint()?;
        let expiry = fields.take_u32()?;
        let ttl = fields.take_u32()?;
        let topic = Topic::try_from(fields.take_bytes()?)?;

        let salt = fields.take_bytes()?.to_vec();
        if !salt.is_empty() && salt.len() != SALT_LENGTH {
            return Err(VesperError::Malformed {
                reason: format!("salt must be empty or {} bytes, got {}", SALT_LENGTH, salt.len()),
            });
        }
        let aes_nonce = fields.take_bytes()?.to_vec();
        if !aes_nonce.is_empty() && aes_nonce.len() != AES_NONCE_LENGTH {
            return Err(VesperError::Malformed {
                reason: format!(
                    "aes nonce must be empty or {} bytes, got {}",
                    AES_NONCE_LENGTH,
                    aes_nonce.len()
                ),
            });
        }

        let data = fields.take_bytes()?.to_vec();
        let env_nonce = fields.take_uint()?;
        if !fields.is_empty() {
            return Err(VesperError::Malformed {
                reason: "excess fields in envelope".into(),
            });
        }

        Ok(Self {
            version,
            expiry,
            ttl,
            topic,
            salt,
            aes_nonce,
            data,
            env_nonce,
        })
    }

    /// The envelope identity: `Keccak256(RLP(envelope))`.
    pub fn hash(&self) -> Hash {
        keccak256(&self.encode())
    }

    // ------------------------------------------------------------------
    // Proof of work
    // ------------------------------------------------------------------

    /// Seals the envelope, searching for a nonce that satisfies the
    /// requested `pow` within `work_time` wall-clock seconds. Uses the
    /// available hardware parallelism.
    pub fn seal(self, pow: f64, work_time: u32) -> Result<Self> {
        self.seal_with_workers(pow, work_time, 0)
    }

    /// Seals with an explicit worker count (0 selects the hardware
    /// parallelism). A single worker makes the found nonce fully
    /// deterministic, which tests rely on.
    pub fn seal_with_workers(mut self, pow: f64, work_time: u32, workers: usize) -> Result<Self> {
        let workers = if workers == 0 {
            pow::default_workers()
        } else {
            workers
        };
        let bits = pow::pow_bits(pow, self.data.len(), self.ttl);
        let prefix = self.rlp_without_nonce();
        match pow::search_nonce(&prefix, bits, work_time, workers) {
            Some(nonce) => {
                self.env_nonce = nonce;
                tracing::debug!(bits, nonce, "envelope sealed");
                Ok(self)
            }
            None => Err(VesperError::InsufficientWork { work_time }),
        }
    }

    fn pow_digest(&self) -> [u8; 32] {
        let mut buf = self.rlp_without_nonce();
        buf.extend_from_slice(&self.env_nonce.to_be_bytes());
        *keccak256(&buf).as_bytes()
    }

    /// Real-valued PoW score of this envelope, in the same units as
    /// the sender's requested `pow`. Downstream filters use it to
    /// prioritize envelopes.
    pub fn pow_score(&self) -> f64 {
        pow::pow_score(&self.pow_digest(), self.data.len(), self.ttl)
    }

    /// Checks the sealed nonce against the target the given minimum
    /// `pow` demands for this envelope's size and TTL.
    pub fn verify_pow(&self, min_pow: f64) -> bool {
        let bits = pow::pow_bits(min_pow, self.data.len(), self.ttl);
        if bits > 256 {
            return false;
        }
        pow::leading_zero_bits(&self.pow_digest()) >= bits
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            version: ENVELOPE_VERSION,
            expiry: 1_700_000_050,
            ttl: 50,
            topic: Topic::new([0xDE, 0xAD, 0xBE, 0xEF]),
            salt: vec![0x11; SALT_LENGTH],
            aes_nonce: vec![0x22; AES_NONCE_LENGTH],
            data: vec![0x33; 48],
            env_nonce: 0x1234_5678,
        }
    }

    #[test]
    fn encode_decode_roundtrip() -> Result<()> {
        let envelope = sample();
        let decoded = Envelope::decode(&envelope.encode())?;
        assert_eq!(decoded, envelope);
        Ok(())
    }

    #[test]
    fn asymmetric_envelope_has_empty_salt_fields() -> Result<()> {
        let envelope = Envelope {
            salt: Vec::new(),
            aes_nonce: Vec::new(),
            ..sample()
        };
        let decoded = Envelope::decode(&envelope.encode())?;
        assert!(decoded.salt().is_empty());
        assert!(decoded.aes_nonce().is_empty());
        Ok(())
    }

    #[test]
    fn hash_changes_with_any_field() {
        let envelope = sample();
        let base = envelope.hash();

        let mut other = envelope.clone();
        other.env_nonce += 1;
        assert_ne!(other.hash(), base);

        let mut other = envelope.clone();
        other.data[0] ^= 1;
        assert_ne!(other.hash(), base);

        let mut other = envelope;
        other.expiry += 1;
        assert_ne!(other.hash(), base);
    }

    #[test]
    fn wrong_salt_length_rejected() {
        let envelope = Envelope {
            salt: vec![0x11; 5],
            ..sample()
        };
        let result = Envelope::decode(&envelope.encode());
        assert!(matches!(result, Err(VesperError::Malformed { .. })));
    }

    #[test]
    fn wrong_topic_length_rejected() {
        // Hand-build a list whose topic field is 3 bytes.
        let mut payload = Vec::new();
        rlp::encode_uint(&mut payload, 0);
        rlp::encode_uint(&mut payload, 100);
        rlp::encode_uint(&mut payload, 10);
        rlp::encode_bytes(&mut payload, &[1, 2, 3]);
        rlp::encode_bytes(&mut payload, &[]);
        rlp::encode_bytes(&mut payload, &[]);
        rlp::encode_bytes(&mut payload, &[0xAA]);
        rlp::encode_uint(&mut payload, 0);
        let bytes = rlp::wrap_list(&payload);
        assert!(matches!(
            Envelope::decode(&bytes),
            Err(VesperError::Malformed { .. })
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = sample().encode();
        bytes.push(0x00);
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[test]
    fn excess_fields_rejected() {
        let mut payload = sample().encode_fields();
        rlp::encode_uint(&mut payload, 7);
        rlp::encode_uint(&mut payload, 7);
        let bytes = rlp::wrap_list(&payload);
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[test]
    fn garbage_is_malformed_not_rlp() {
        let result = Envelope::decode(&[0xFF, 0x00, 0x01]);
        assert!(matches!(result, Err(VesperError::Malformed { .. })));
    }

    #[test]
    fn seal_then_verify() -> Result<()> {
        let envelope = Envelope::assemble(
            10,
            Topic::new([1, 2, 3, 4]),
            vec![0x11; SALT_LENGTH],
            vec![0x22; AES_NONCE_LENGTH],
            vec![0x33; 64],
        );
        let sealed = envelope.seal_with_workers(0.5, 5, 1)?;
        assert!(sealed.verify_pow(0.5));
        Ok(())
    }

    #[test]
    fn mutated_nonce_fails_verification() -> Result<()> {
        let envelope = Envelope::assemble(
            10,
            Topic::new([1, 2, 3, 4]),
            Vec::new(),
            Vec::new(),
            vec![0x44; 128],
        );
        // ~16 bits: cheap to seal, vanishingly unlikely to survive a
        // nonce mutation.
        let pow = 16.0 / ((128.0f64 * 10.0).log2());
        let mut sealed = envelope.seal_with_workers(pow, 10, 1)?;
        assert!(sealed.verify_pow(pow));
        sealed.env_nonce ^= 1;
        assert!(!sealed.verify_pow(pow));
        Ok(())
    }

    #[test]
    fn expiry_accounting() {
        let envelope = sample();
        assert_eq!(envelope.sent_time(), 1_700_000_000);
        assert!(!envelope.is_expired(1_700_000_050));
        assert!(envelope.is_expired(1_700_000_051));
    }

    #[test]
    fn unsatisfiable_pow_fails_to_seal() {
        let envelope = Envelope::assemble(
            10,
            Topic::new([1, 2, 3, 4]),
            Vec::new(),
            Vec::new(),
            vec![0x55; 32],
        );
        let result = envelope.seal_with_workers(64.0, 1, 1);
        assert!(matches!(result, Err(VesperError::InsufficientWork { .. })));
    }
}
