//! Connectivity transition tracking.
//!
//! The pipe task owns exactly one [`ConnectivityTracker`]; nothing else
//! mutates the state. Each *actual* transition is forwarded once to the
//! registered listener channel — repeated requests for the current state
//! are dropped, and nothing leaves the terminal
//! [`ConnectivityState::AuthenticationFailed`] state.

use circleservice_types::ConnectivityState;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// ConnectivityTracker
// ---------------------------------------------------------------------------

/// Owns the pipe's connectivity state and notifies the single listener.
pub struct ConnectivityTracker {
    state: ConnectivityState,
    listener: mpsc::Sender<ConnectivityState>,
}

impl ConnectivityTracker {
    /// Creates a tracker in the `Disconnected` state.
    ///
    /// The initial state is not announced; only transitions are.
    pub fn new(listener: mpsc::Sender<ConnectivityState>) -> Self {
        Self {
            state: ConnectivityState::Disconnected,
            listener,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Applies a transition, notifying the listener when the state
    /// actually changes. Returns `true` if a transition happened.
    ///
    /// A full listener channel drops the notification rather than block
    /// the pipe task; a lagging listener never stalls frame delivery.
    pub fn transition(&mut self, next: ConnectivityState) -> bool {
        if self.state == next {
            return false;
        }
        if self.state == ConnectivityState::AuthenticationFailed {
            // Terminal; the pipe never recovers past a credential
            // rejection.
            return false;
        }

        tracing::debug!(from = %self.state, to = %next, "pipe connectivity transition");
        self.state = next;

        if let Err(e) = self.listener.try_send(next) {
            tracing::warn!(%e, "connectivity listener not keeping up, dropping notification");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
