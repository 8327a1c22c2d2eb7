//! Per-message callback contract.
//!
//! Invoked synchronously during `retrieve_messages`, once per envelope
//! and in delivery order. A callback that blocks stalls acknowledgment
//! of every later envelope in the same batch, so implementations should
//! hand work off rather than do it inline. Delivery is at-least-once:
//! an envelope whose acknowledgment failed can show up again on a later
//! poll, so callbacks must be idempotent.

use crate::envelope::Envelope;

/// Receives each envelope before it is acknowledged.
pub trait MessageReceivedCallback {
    /// Called once per retrieved envelope, in delivery order.
    fn on_message(&mut self, envelope: &Envelope);
}

/// Default callback that ignores every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMessageCallback;

impl MessageReceivedCallback for NullMessageCallback {
    fn on_message(&mut self, _envelope: &Envelope) {}
}

impl<F> MessageReceivedCallback for F
where
    F: FnMut(&Envelope),
{
    fn on_message(&mut self, envelope: &Envelope) {
        self(envelope);
    }
}
