//! Ingress: opening envelopes against a candidate key set.
//!
//! An inbound envelope is screened (version, TTL, expiry, proof of
//! work) before any cryptographic work, then every candidate key the
//! node holds is tried against it. "No key decrypted this envelope"
//! is the ordinary dark-routing outcome — the envelope is simply not
//! for us and gets forwarded — so it surfaces as
//! [`OpenOutcome::NotForMe`], never as an error.
//!
//! Every candidate key is attempted even after a success, so timing
//! does not reveal which key (if any) the node holds. The parallel
//! variant trades that property for latency and cancels losing
//! workers as soon as one plaintext validates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use vesper_crypto::aead;
use vesper_crypto::ecdsa::SecretKey;
use vesper_crypto::ecies;
use vesper_crypto::kdf;
use vesper_types::config::ProtocolConfig;
use vesper_types::{
    Result, TopicKey, VesperError, AES_NONCE_LENGTH, ENVELOPE_VERSION, SALT_LENGTH,
};

use crate::envelope::Envelope;
use crate::message::ReceivedMessage;

// ---------------------------------------------------------------------------
// OpenOutcome
// ---------------------------------------------------------------------------

/// Result of attempting to open an envelope.
pub enum OpenOutcome {
    /// A candidate key decrypted the envelope and the plaintext
    /// validated.
    Delivered(ReceivedMessage),
    /// No candidate key decrypted the envelope. Not an error: the
    /// envelope is forwarded onward untouched.
    NotForMe,
}

/// The candidate keys a node tries against each envelope. Assembled by
/// the (external) filter layer; the engine only runs one-shot decrypt
/// attempts.
#[derive(Clone, Copy)]
pub struct CandidateKeys<'a> {
    /// Topic keys for symmetric envelopes.
    pub symmetric: &'a [TopicKey],
    /// Private keys for asymmetric envelopes.
    pub asymmetric: &'a [SecretKey],
}

/// Which decryption path an envelope's salt and nonce fields select.
enum Mode {
    Symmetric,
    Asymmetric,
}

// ---------------------------------------------------------------------------
// Screening
// ---------------------------------------------------------------------------

/// Pre-crypto checks: version, TTL, expiry, proof of work, and the
/// salt/nonce shape. Anything failing here is dropped as malformed
/// before a single key is touched.
fn screen(envelope: &Envelope, config: &ProtocolConfig, now: u32) -> Result<Mode> {
    if envelope.version() != ENVELOPE_VERSION {
        return Err(VesperError::Malformed {
            reason: format!("unsupported envelope version {}", envelope.version()),
        });
    }
    if envelope.ttl() == 0 {
        return Err(VesperError::Malformed {
            reason: "zero TTL".into(),
        });
    }
    if envelope.is_expired(now) {
        return Err(VesperError::Malformed {
            reason: format!("expired at {} (now {})", envelope.expiry(), now),
        });
    }
    if !envelope.verify_pow(config.min_pow) {
        return Err(VesperError::Malformed {
            reason: "insufficient proof of work".into(),
        });
    }

    match (envelope.salt().len(), envelope.aes_nonce().len()) {
        (0, 0) => Ok(Mode::Asymmetric),
        (SALT_LENGTH, AES_NONCE_LENGTH) => Ok(Mode::Symmetric),
        _ => Err(VesperError::Malformed {
            reason: "inconsistent salt and nonce presence".into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Single-key attempts
// ---------------------------------------------------------------------------

/// Tries one topic key. `None` means the key did not decrypt the
/// envelope; `Some(Err(_))` means it decrypted but the plaintext is
/// invalid.
fn attempt_symmetric(
    envelope: &Envelope,
    key: &TopicKey,
    score: f64,
) -> Option<Result<ReceivedMessage>> {
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    nonce.copy_from_slice(envelope.aes_nonce());

    let derived = kdf::derive_one_time_key(key.as_bytes(), envelope.salt(), envelope.version())
        .ok()
        .filter(|dk| !dk.is_zero())?;
    let raw = aead::aes_gcm_open(derived.as_bytes(), &nonce, envelope.data()).ok()?;

    let mut message = ReceivedMessage::new(raw, envelope, score);
    message.set_symmetric(key);
    match message.validate() {
        Ok(()) => Some(Ok(message)),
        Err(e) => Some(Err(e)),
    }
}

/// Tries one private key; same contract as [`attempt_symmetric`].
fn attempt_asymmetric(
    envelope: &Envelope,
    key: &SecretKey,
    score: f64,
) -> Option<Result<ReceivedMessage>> {
    let raw = ecies::decrypt(key, envelope.data()).ok()?;

    let mut message = ReceivedMessage::new(raw, envelope, score);
    message.set_asymmetric(key.public_key());
    match message.validate() {
        Ok(()) => Some(Ok(message)),
        Err(e) => Some(Err(e)),
    }
}

// ---------------------------------------------------------------------------
// Sequential open
// ---------------------------------------------------------------------------

/// Opens an envelope against the candidate key set.
///
/// Attempts **every** candidate key regardless of early success so the
/// work done does not depend on which key (if any) matches.
///
/// # Errors
///
/// Returns [`VesperError::Malformed`] when screening fails or a key
/// decrypted the envelope but the plaintext violates the codec
/// invariants. All other dispositions are [`OpenOutcome`] values.
pub fn open_envelope(
    envelope: &Envelope,
    keys: &CandidateKeys<'_>,
    config: &ProtocolConfig,
    now: u32,
) -> Result<OpenOutcome> {
    let mode = screen(envelope, config, now).map_err(|e| {
        tracing::warn!(envelope = %envelope.hash(), %e, "dropping envelope");
        e
    })?;
    let score = envelope.pow_score();

    let mut delivered: Option<ReceivedMessage> = None;
    let mut malformed: Option<VesperError> = None;
    let mut record = |outcome: Option<Result<ReceivedMessage>>| match outcome {
        Some(Ok(message)) => {
            if delivered.is_none() {
                delivered = Some(message);
            }
        }
        Some(Err(e)) => {
            if malformed.is_none() {
                malformed = Some(e);
            }
        }
        None => {}
    };

    match mode {
        Mode::Symmetric => {
            for key in keys.symmetric {
                record(attempt_symmetric(envelope, key, score));
            }
        }
        Mode::Asymmetric => {
            for key in keys.asymmetric {
                record(attempt_asymmetric(envelope, key, score));
            }
        }
    }

    finish(envelope, delivered, malformed)
}

// ---------------------------------------------------------------------------
// Parallel open
// ---------------------------------------------------------------------------

/// Opens an envelope with one decrypt attempt per worker thread.
///
/// Workers share a cancellation flag and coalesce on the first
/// decrypted-and-validated plaintext; the remaining workers stop
/// before starting their attempt. Prefer [`open_envelope`] when the
/// candidate set is small or timing uniformity matters more than
/// latency.
pub fn open_envelope_parallel(
    envelope: &Envelope,
    keys: &CandidateKeys<'_>,
    config: &ProtocolConfig,
    now: u32,
) -> Result<OpenOutcome> {
    let mode = screen(envelope, config, now).map_err(|e| {
        tracing::warn!(envelope = %envelope.hash(), %e, "dropping envelope");
        e
    })?;
    let score = envelope.pow_score();

    let cancel = AtomicBool::new(false);
    let slot: Mutex<Option<Result<ReceivedMessage>>> = Mutex::new(None);

    fn settle(
        cancel: &AtomicBool,
        slot: &Mutex<Option<Result<ReceivedMessage>>>,
        outcome: Option<Result<ReceivedMessage>>,
    ) {
        if let Some(outcome) = outcome {
            if let Ok(mut guard) = slot.lock() {
                if guard.is_none() {
                    *guard = Some(outcome);
                    cancel.store(true, Ordering::Release);
                }
            }
        }
    }

    thread::scope(|s| {
        match mode {
            Mode::Symmetric => {
                for key in keys.symmetric {
                    let (cancel, slot) = (&cancel, &slot);
                    s.spawn(move || {
                        if cancel.load(Ordering::Acquire) {
                            return;
                        }
                        settle(cancel, slot, attempt_symmetric(envelope, key, score));
                    });
                }
            }
            Mode::Asymmetric => {
                for key in keys.asymmetric {
                    let (cancel, slot) = (&cancel, &slot);
                    s.spawn(move || {
                        if cancel.load(Ordering::Acquire) {
                            return;
                        }
                        settle(cancel, slot, attempt_asymmetric(envelope, key, score));
                    });
                }
            }
        }
    });

    let outcome = slot.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    match outcome {
        Some(Ok(message)) => Ok(OpenOutcome::Delivered(message)),
        Some(Err(e)) => {
            tracing::warn!(envelope = %envelope.hash(), %e, "dropping envelope");
            Err(e)
        }
        None => {
            tracing::debug!(envelope = %envelope.hash(), "envelope not for us");
            Ok(OpenOutcome::NotForMe)
        }
    }
}

fn finish(
    envelope: &Envelope,
    delivered: Option<ReceivedMessage>,
    malformed: Option<VesperError>,
) -> Result<OpenOutcome> {
    if let Some(message) = delivered {
        return Ok(OpenOutcome::Delivered(message));
    }
    if let Some(e) = malformed {
        tracing::warn!(envelope = %envelope.hash(), %e, "dropping envelope");
        return Err(e);
    }
    tracing::debug!(envelope = %envelope.hash(), "envelope not for us");
    Ok(OpenOutcome::NotForMe)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
