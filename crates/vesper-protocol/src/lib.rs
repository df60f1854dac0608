//! Envelope pipeline for the Vesper dark-routing message bus.
//!
//! Implements the full outbound path (padding → signing → encryption →
//! proof-of-work sealing) and its inverse on ingress (PoW check →
//! decryption → padding/signature extraction → validation). Transport,
//! flood routing, the envelope pool, and key management are external
//! collaborators: this crate does no I/O.
//!
//! # Modules
//!
//! - [`rlp`] — canonical envelope framing
//! - [`message`] — `MessageParams`, `SentMessage`, `ReceivedMessage`
//! - [`envelope`] — the on-wire envelope and its identity
//! - [`pow`] — proof-of-work target math and the nonce search
//! - [`incoming`] — candidate-key fan-out producing `OpenOutcome`

pub mod envelope;
pub mod incoming;
pub mod message;
pub mod pow;
pub mod rlp;
