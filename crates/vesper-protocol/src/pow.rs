//! Proof-of-work target math and the sealed nonce search.
//!
//! # Target
//!
//! ```text
//! pow_bits = ceil(pow · log2(data_len · ttl))
//! target   = 2^(256 − pow_bits)
//! accept   ⇔ keccak256(rlp_without_nonce ‖ nonce_be8) < target
//!          ⇔ leading_zero_bits(digest) ≥ pow_bits
//! ```
//!
//! The formula is part of the wire contract and must be reproduced
//! bit-for-bit so peers agree on acceptance. The leading-zero form of
//! the comparison is exact: a 256-bit value is below `2^(256 − n)`
//! precisely when its top `n` bits are zero.
//!
//! # Search
//!
//! The sealer stripes the nonce space across a fixed worker pool.
//! Workers share a cancellation flag (tripped by the wall-clock budget
//! or by the first acceptable solution, checked every 1024 hashes) and
//! an atomic best-nonce cell; the smallest nonce any worker found is
//! the one sealed. The Keccak state over the RLP prefix is absorbed
//! once and cloned per candidate nonce.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use sha3::{Digest, Keccak256};

/// Hashes between checks of the cancellation flag.
const CHUNK: u64 = 1024;

/// Number of leading zero bits the target demands, clamped so that
/// values above 256 (unsatisfiable) stay recognizable.
pub fn pow_bits(pow: f64, data_len: usize, ttl: u32) -> u32 {
    if pow <= 0.0 {
        return 0;
    }
    let denom = ((data_len as f64) * (ttl as f64)).log2();
    let bits = (pow * denom).ceil();
    if bits <= 0.0 {
        0
    } else if bits > 256.0 {
        257
    } else {
        bits as u32
    }
}

/// Counts leading zero bits of a 256-bit digest.
pub fn leading_zero_bits(digest: &[u8; 32]) -> u32 {
    let mut count = 0u32;
    for &byte in digest {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Real-valued PoW score of a digest, in the sender's `pow` units:
/// `log2(2^256 / digest)` rescaled by `log2(data_len · ttl)` so the
/// score is directly comparable with the `pow` a sender requested.
pub fn pow_score(digest: &[u8; 32], data_len: usize, ttl: u32) -> f64 {
    let bits = leading_zero_bits(digest) as f64;
    let denom = ((data_len as f64) * (ttl as f64)).log2();
    if denom > 0.0 {
        bits / denom
    } else {
        bits
    }
}

/// Searches `[0, 2^64)` for the smallest nonce whose digest clears
/// `bits` leading zeros, giving up after `work_time` wall-clock
/// seconds. `None` means the budget was exhausted.
pub(crate) fn search_nonce(
    prefix: &[u8],
    bits: u32,
    work_time: u32,
    workers: usize,
) -> Option<u64> {
    if bits == 0 {
        return Some(0);
    }
    if bits > 256 {
        return None;
    }

    let workers = workers.max(1) as u64;
    let deadline = Instant::now() + Duration::from_secs(work_time as u64);
    let stop = AtomicBool::new(false);
    let best = AtomicU64::new(u64::MAX);
    let base = Keccak256::new_with_prefix(prefix);

    thread::scope(|s| {
        for lane in 0..workers {
            let base = base.clone();
            let stop = &stop;
            let best = &best;
            s.spawn(move || {
                let mut nonce = lane;
                loop {
                    for _ in 0..CHUNK {
                        let digest: [u8; 32] = base
                            .clone()
                            .chain_update(nonce.to_be_bytes())
                            .finalize()
                            .into();
                        if leading_zero_bits(&digest) >= bits {
                            best.fetch_min(nonce, Ordering::SeqCst);
                            stop.store(true, Ordering::SeqCst);
                            return;
                        }
                        nonce = match nonce.checked_add(workers) {
                            Some(next) => next,
                            None => return,
                        };
                    }
                    if stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
                        return;
                    }
                }
            });
        }
    });

    let found = best.load(Ordering::SeqCst);
    (found != u64::MAX).then_some(found)
}

/// Worker count used when the caller does not pin one.
pub(crate) fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zeros_all_zero_digest() {
        assert_eq!(leading_zero_bits(&[0u8; 32]), 256);
    }

    #[test]
    fn leading_zeros_first_byte() {
        let mut digest = [0u8; 32];
        digest[0] = 0b0000_1000;
        assert_eq!(leading_zero_bits(&digest), 4);
    }

    #[test]
    fn leading_zeros_second_byte() {
        let mut digest = [0u8; 32];
        digest[1] = 0b0010_0000;
        assert_eq!(leading_zero_bits(&digest), 10);
    }

    #[test]
    fn leading_zeros_high_bit_set() {
        let mut digest = [0xFFu8; 32];
        digest[0] = 0b1000_0000;
        assert_eq!(leading_zero_bits(&digest), 0);
    }

    #[test]
    fn pow_bits_zero_for_zero_pow() {
        assert_eq!(pow_bits(0.0, 300, 10), 0);
    }

    #[test]
    fn pow_bits_rounds_up() {
        // log2(300 · 10) ≈ 11.55; 0.1 · 11.55 ≈ 1.16 → 2 bits.
        assert_eq!(pow_bits(0.1, 300, 10), 2);
    }

    #[test]
    fn pow_bits_unsatisfiable_clamps() {
        assert_eq!(pow_bits(64.0, 300, 10), 257);
    }

    #[test]
    fn score_inverts_bits() {
        let mut digest = [0xFFu8; 32];
        digest[0] = 0;
        digest[1] = 0x40; // 9 leading zero bits
        let denom = ((300.0f64) * 10.0).log2();
        let score = pow_score(&digest, 300, 10);
        assert!((score - 9.0 / denom).abs() < 1e-12);
    }

    #[test]
    fn search_finds_valid_nonce() {
        let prefix = b"pow search prefix";
        let nonce = search_nonce(prefix, 8, 5, 1).expect("8 bits is cheap");
        let digest: [u8; 32] = Keccak256::new_with_prefix(prefix)
            .chain_update(nonce.to_be_bytes())
            .finalize()
            .into();
        assert!(leading_zero_bits(&digest) >= 8);
    }

    #[test]
    fn search_is_deterministic_single_worker() {
        let prefix = b"determinism";
        let a = search_nonce(prefix, 8, 5, 1);
        let b = search_nonce(prefix, 8, 5, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn striped_search_agrees_with_sequential() {
        // Workers stripe the nonce space, so the first nonce found may
        // differ, but any returned nonce must satisfy the target.
        let prefix = b"striped";
        let nonce = search_nonce(prefix, 8, 5, 4).expect("8 bits is cheap");
        let digest: [u8; 32] = Keccak256::new_with_prefix(prefix)
            .chain_update(nonce.to_be_bytes())
            .finalize()
            .into();
        assert!(leading_zero_bits(&digest) >= 8);
    }

    #[test]
    fn zero_bits_returns_immediately() {
        assert_eq!(search_nonce(b"anything", 0, 0, 1), Some(0));
    }

    #[test]
    fn unsatisfiable_bits_fail_fast() {
        assert_eq!(search_nonce(b"anything", 257, 1, 1), None);
    }

    #[test]
    fn budget_bound_is_respected() {
        // 200 bits is far beyond reach; the search must give up within
        // the one-second budget plus scheduling slack.
        let started = Instant::now();
        let result = search_nonce(b"budget", 200, 1, 2);
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
