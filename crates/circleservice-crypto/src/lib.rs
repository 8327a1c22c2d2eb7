//! Stream cipher adapters for the circleservice client.
//!
//! This crate is the **sole** location for asset cryptography. It provides
//! the write side ("encrypt and digest into a sink") and the read side
//! ("decrypt while verifying") for the two asset purposes the service
//! distinguishes:
//!
//! - [`attachment`] — XChaCha20 stream with an interleaved HMAC-SHA256
//!   tag trailing the ciphertext.
//! - [`profile`] — XChaCha20 stream relying on the stream digest alone.
//!
//! Both purposes accumulate a SHA3-256 digest over the full ciphertext
//! stream (nonce and trailer included); the read side verifies it
//! incrementally and fails closed at end-of-stream on any mismatch.
//!
//! # Modules
//!
//! - [`keys`] — HKDF-SHA256 subkey derivation from the per-asset key
//! - [`attachment`] — attachment cipher writer / reader
//! - [`profile`] — profile-avatar cipher writer / reader
//! - [`purpose`] — purpose-selected digesting-writer capability

pub mod attachment;
pub mod keys;
pub mod profile;
pub mod purpose;

/// Byte length of the XChaCha20 nonce leading every asset stream.
pub const NONCE_LEN: usize = 24;

/// Byte length of the HMAC-SHA256 trailer on attachment streams.
pub const MAC_LEN: usize = 32;
