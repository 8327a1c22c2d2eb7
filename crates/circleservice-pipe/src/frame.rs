//! Pipe wire frames and keepalive bookkeeping.
//!
//! Every websocket message carries one [`PipeMessage`]: either a request
//! (server pushing an envelope to us, or us sending a keepalive) or a
//! response acknowledging a request by id. Inbound requests are
//! forwarded to the pipe consumer untouched and in arrival order.

use serde::{Deserialize, Serialize};

/// Path used for outbound keepalive requests.
pub const KEEPALIVE_PATH: &str = "/v1/keepalive";

// ---------------------------------------------------------------------------
// PipeMessage
// ---------------------------------------------------------------------------

/// One frame on the pipe, either direction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PipeMessage {
    /// A request frame.
    Request(PipeRequest),
    /// A response frame answering a request by id.
    Response(PipeResponse),
}

/// Request frame: verb + path, optional body.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeRequest {
    /// Correlation id, unique per direction per connection.
    pub id: u64,
    /// Request verb (`PUT` for pushed envelopes and keepalives).
    pub verb: String,
    /// Request path (e.g. `/api/v1/message`).
    pub path: String,
    /// Opaque body bytes; for pushed envelopes this is the envelope
    /// entity.
    #[serde(default)]
    pub body: Option<Vec<u8>>,
}

/// Response frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeResponse {
    /// Correlation id of the request being answered.
    pub id: u64,
    /// HTTP-style status code.
    pub status: u16,
    /// Status message.
    #[serde(default)]
    pub message: String,
}

impl PipeRequest {
    /// Builds an outbound keepalive request.
    pub fn keepalive(id: u64) -> Self {
        Self {
            id,
            verb: "PUT".to_owned(),
            path: KEEPALIVE_PATH.to_owned(),
            body: None,
        }
    }
}

impl PipeResponse {
    /// Builds a success response acknowledging `id`.
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            status: 200,
            message: "OK".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// KeepaliveTracker
// ---------------------------------------------------------------------------

/// Tracks the single outstanding keepalive on a connected pipe.
///
/// The schedule is interval-driven: one keepalive per tick, and a tick
/// that finds the previous keepalive still unacknowledged declares the
/// connection dead.
#[derive(Debug, Default)]
pub struct KeepaliveTracker {
    next_id: u64,
    outstanding: Option<u64>,
}

impl KeepaliveTracker {
    /// Creates a tracker with no outstanding keepalive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on each keepalive tick.
    ///
    /// Returns the request to send, or `None` if the previous keepalive
    /// was never acknowledged — the connection must be torn down.
    pub fn tick(&mut self) -> Option<PipeRequest> {
        if self.outstanding.is_some() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.outstanding = Some(id);
        Some(PipeRequest::keepalive(id))
    }

    /// Records an inbound response; returns `true` if it acknowledged
    /// the outstanding keepalive.
    pub fn acknowledge(&mut self, response_id: u64) -> bool {
        if self.outstanding == Some(response_id) {
            self.outstanding = None;
            return true;
        }
        false
    }

    /// Clears state after a reconnect.
    pub fn reset(&mut self) {
        self.outstanding = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip_as_json() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let frame = PipeMessage::Request(PipeRequest {
            id: 7,
            verb: "PUT".into(),
            path: "/api/v1/message".into(),
            body: Some(vec![1, 2, 3]),
        });
        let encoded = serde_json::to_string(&frame)?;
        let decoded: PipeMessage = serde_json::from_str(&encoded)?;
        match decoded {
            PipeMessage::Request(req) => {
                assert_eq!(req.id, 7);
                assert_eq!(req.body.as_deref(), Some(&[1u8, 2, 3][..]));
            }
            PipeMessage::Response(_) => panic!("expected request"),
        }
        Ok(())
    }

    #[test]
    fn keepalive_tick_then_ack_then_tick() {
        let mut tracker = KeepaliveTracker::new();

        let first = tracker.tick().expect("first keepalive");
        assert_eq!(first.path, KEEPALIVE_PATH);
        assert!(tracker.acknowledge(first.id));

        let second = tracker.tick().expect("second keepalive");
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn unacknowledged_keepalive_kills_next_tick() {
        let mut tracker = KeepaliveTracker::new();
        let _outstanding = tracker.tick().expect("keepalive");
        assert!(tracker.tick().is_none(), "missed ack must force teardown");
    }

    #[test]
    fn foreign_response_id_is_not_an_ack() {
        let mut tracker = KeepaliveTracker::new();
        let sent = tracker.tick().expect("keepalive");
        assert!(!tracker.acknowledge(sent.id + 1000));
        assert!(tracker.tick().is_none());
    }

    #[test]
    fn reset_clears_outstanding_state() {
        let mut tracker = KeepaliveTracker::new();
        let _sent = tracker.tick().expect("keepalive");
        tracker.reset();
        assert!(tracker.tick().is_some());
    }
}
