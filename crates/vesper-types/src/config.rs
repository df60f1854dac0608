//! Protocol configuration with sensible defaults.
//!
//! Operational parameters for the envelope pipeline are centralized
//! here. Every value has a documented default; wire-contract constants
//! (key sizes, iteration counts) live in the crate root and are not
//! configurable.

use serde::{Deserialize, Serialize};

use crate::{Result, VesperError, DEFAULT_TTL, MSG_MAX_LENGTH};

/// Envelope pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// TTL applied when a sender leaves the TTL at zero, in seconds.
    pub default_ttl: u32,

    /// Minimum proof-of-work score an ingress envelope must carry.
    /// Envelopes below this are dropped before any decryption attempt.
    pub min_pow: f64,

    /// Default wall-clock budget for the PoW nonce search, in seconds.
    pub default_work_time: u32,

    /// Number of worker threads for the PoW search. Zero selects the
    /// available hardware parallelism.
    pub seal_workers: usize,

    /// Maximum accepted message plaintext size in bytes. Must not
    /// exceed the protocol-wide `MSG_MAX_LENGTH`.
    pub max_message_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            min_pow: 0.2,
            default_work_time: 5,
            seal_workers: 0,
            max_message_size: MSG_MAX_LENGTH,
        }
    }
}

impl ProtocolConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl == 0 {
            return Err(VesperError::Config {
                reason: "default_ttl must be greater than 0".into(),
            });
        }

        if !self.min_pow.is_finite() || self.min_pow < 0.0 {
            return Err(VesperError::Config {
                reason: format!("min_pow must be finite and non-negative, got {}", self.min_pow),
            });
        }

        if self.default_work_time == 0 {
            return Err(VesperError::Config {
                reason: "default_work_time must be greater than 0".into(),
            });
        }

        if self.max_message_size == 0 || self.max_message_size > MSG_MAX_LENGTH {
            return Err(VesperError::Config {
                reason: format!(
                    "max_message_size must be in 1..={}, got {}",
                    MSG_MAX_LENGTH, self.max_message_size
                ),
            });
        }

        Ok(())
    }
}
