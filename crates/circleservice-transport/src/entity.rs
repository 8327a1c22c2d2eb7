//! Wire entities returned by the service.
//!
//! Field names mirror the service's JSON (camelCase); body serialization
//! beyond that is the service's concern, not this client's. An entity is
//! a pre-validation view of one queued message — the receiver turns it
//! into an `Envelope` before anything else touches it.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EnvelopeEntity
// ---------------------------------------------------------------------------

/// One queued message as reported by the poll endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeEntity {
    /// Envelope type tag.
    #[serde(rename = "type")]
    pub entity_type: u32,

    /// Sender identity; absent for server-assigned anonymous delivery.
    #[serde(default)]
    pub source: Option<String>,

    /// Sender device index; 0 means legacy/unspecified.
    #[serde(default)]
    pub source_device: u32,

    /// Client-assigned timestamp in epoch milliseconds.
    #[serde(default)]
    pub timestamp: u64,

    /// Legacy ciphertext body, if the sender used the legacy format.
    #[serde(default)]
    pub message: Option<Vec<u8>>,

    /// Modern ciphertext body.
    #[serde(default)]
    pub content: Option<Vec<u8>>,

    /// Server-assigned timestamp in epoch milliseconds.
    #[serde(default)]
    pub server_timestamp: u64,

    /// Server-assigned unique id; absent on legacy servers.
    #[serde(default)]
    pub server_uuid: Option<String>,
}

/// Poll response: ordered list of queued entities.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EnvelopeEntityList {
    /// Entities in server receipt order.
    #[serde(default)]
    pub messages: Vec<EnvelopeEntity>,
}

// ---------------------------------------------------------------------------
// ProfileEntity
// ---------------------------------------------------------------------------

/// Profile data for one address.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntity {
    /// Base64 identity key advertised by the profile owner.
    #[serde(default)]
    pub identity_key: Option<String>,

    /// Encrypted profile name.
    #[serde(default)]
    pub name: Option<String>,

    /// Relative path of the encrypted avatar blob, if one is set.
    #[serde(default)]
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
