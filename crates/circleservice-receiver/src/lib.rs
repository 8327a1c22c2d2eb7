//! Message and asset retrieval orchestration for the circleservice
//! client.
//!
//! [`receiver::MessageReceiver`] is the primary entry point: it polls
//! the service for queued envelopes, hands each one to the caller's
//! callback, acknowledges it, and creates message pipes for push-style
//! delivery. Attachment and profile-avatar retrieval share one
//! discipline — ciphertext lands in bounded storage and plaintext is
//! only surfaced through a verifying reader.
//!
//! # Modules
//!
//! - [`envelope`] — the delivered-message unit and its addressing tag
//! - [`callback`] — the per-message callback contract
//! - [`receiver`] — the `MessageReceiver`

pub mod callback;
pub mod envelope;
pub mod receiver;

pub use callback::{MessageReceivedCallback, NullMessageCallback};
pub use envelope::{Addressing, Envelope};
pub use receiver::MessageReceiver;
