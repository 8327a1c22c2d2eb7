//! Core shared types for the circleservice client.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// ServiceAddress
// ---------------------------------------------------------------------------

/// Opaque identity of a message sender or profile owner on the service.
///
/// The service treats addresses as opaque handles (registered user
/// identifiers). The client never parses or interprets them beyond
/// equality comparison.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ServiceAddress(String);

impl ServiceAddress {
    /// Creates a new `ServiceAddress` from an already-validated handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the underlying handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServiceAddress {
    type Err = CircleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CircleError::InvalidAddress {
                reason: "address must not be empty".into(),
            });
        }
        Ok(Self(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// SignalingKey
// ---------------------------------------------------------------------------

/// 52-byte signaling key assigned at registration.
///
/// Used by the legacy envelope decoding path (32-byte cipher key followed
/// by a 20-byte MAC key). Held alongside the account credentials and
/// zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SignalingKey([u8; 52]);

impl SignalingKey {
    /// Fixed byte length of a signaling key.
    pub const LEN: usize = 52;

    /// Creates a `SignalingKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; 52]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 52] {
        &self.0
    }
}

impl fmt::Debug for SignalingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "SignalingKey(..)")
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Account credentials presented to the service.
///
/// Immutable after construction; the password and signaling key are
/// zeroized when the value is dropped. The core holds a read capability
/// only — ownership stays with the caller (typically behind an `Arc`).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    user: String,
    password: String,
    #[zeroize(skip)]
    signaling_key: SignalingKey,
    #[zeroize(skip)]
    device_id: Option<u32>,
}

impl Credentials {
    /// Creates a new set of credentials.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        signaling_key: SignalingKey,
        device_id: Option<u32>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            signaling_key,
            device_id,
        }
    }

    /// Returns the user handle, qualified with the device id when one
    /// is set (`user.device`), as the service expects for basic auth.
    pub fn auth_user(&self) -> String {
        match self.device_id {
            Some(id) => format!("{}.{}", self.user, id),
            None => self.user.clone(),
        }
    }

    /// Returns the bare user handle.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the account password / token.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns the 52-byte signaling key.
    pub fn signaling_key(&self) -> &SignalingKey {
        &self.signaling_key
    }

    /// Returns the device id, if this account is a linked device.
    pub fn device_id(&self) -> Option<u32> {
        self.device_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AssetKey
// ---------------------------------------------------------------------------

/// 256-bit symmetric key protecting one attachment or profile asset.
///
/// Supplied out-of-band by the sender (inside the referencing message).
/// One key per asset; the attachment cipher derives its cipher and MAC
/// subkeys from it, the profile cipher uses it directly.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AssetKey([u8; 32]);

impl AssetKey {
    /// Fixed byte length of an asset key.
    pub const LEN: usize = 32;

    /// Creates an `AssetKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetKey(..)")
    }
}

// ---------------------------------------------------------------------------
// CiphertextDigest
// ---------------------------------------------------------------------------

/// SHA3-256 digest over the full ciphertext stream of one asset.
///
/// Carried in the attachment pointer and verified incrementally while the
/// ciphertext is consumed. Retrieval is refused outright when the pointer
/// lacks a digest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CiphertextDigest([u8; 32]);

impl CiphertextDigest {
    /// Fixed byte length of a digest.
    pub const LEN: usize = 32;

    /// Creates a `CiphertextDigest` from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for CiphertextDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for CiphertextDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// ByteRange
// ---------------------------------------------------------------------------

/// Half-open byte range within a remote blob.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ByteRange {
    /// Offset of the first byte to transfer.
    pub offset: u64,
    /// Number of bytes to transfer.
    pub length: u64,
}

// ---------------------------------------------------------------------------
// AttachmentPointer
// ---------------------------------------------------------------------------

/// Reference to a remote encrypted attachment.
///
/// Received inside a delivered message; everything needed to fetch,
/// decrypt, and verify the attachment. The digest is optional on the
/// wire but mandatory for retrieval — a pointer without one is rejected
/// before any network transfer begins.
#[derive(Clone, Debug)]
pub struct AttachmentPointer {
    /// Server-side blob identifier.
    pub remote_id: u64,
    /// Symmetric key for this attachment.
    pub key: AssetKey,
    /// Expected digest over the full ciphertext.
    pub digest: Option<CiphertextDigest>,
    /// Declared plaintext size, when the sender included one.
    pub size: Option<u32>,
    /// Optional sub-range of the remote blob to transfer.
    pub range: Option<ByteRange>,
}

// ---------------------------------------------------------------------------
// ConnectivityState
// ---------------------------------------------------------------------------

/// Connectivity lifecycle of one message pipe.
///
/// Owned exclusively by the pipe task; every actual transition is
/// broadcast at most once to the single registered listener.
/// `AuthenticationFailed` is terminal — the pipe never reconnects
/// past it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ConnectivityState {
    /// Handshake in progress.
    Connecting,
    /// Handshake complete; frames may flow.
    Connected,
    /// Connection lost or shut down; reconnection may follow.
    Disconnected,
    /// Server rejected credentials during handshake. Terminal.
    AuthenticationFailed,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::AuthenticationFailed => write!(f, "authentication-failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// CircleError
// ---------------------------------------------------------------------------

/// Central error type for the circleservice client.
///
/// All crates in the workspace convert their internal errors into variants
/// of this enum, ensuring a unified error handling surface. Resource-limit
/// failures and integrity failures are deliberately distinct variants so
/// callers can tell "too big" from "tampered".
#[derive(Debug, Error)]
pub enum CircleError {
    /// The provided address is malformed.
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// Human-readable description of why the address is invalid.
        reason: String,
    },

    /// A wire entity or envelope is malformed or missing required fields.
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// Human-readable description of the validation failure.
        reason: String,
    },

    /// A networking or transport operation failed.
    #[error("network error: {reason}")]
    Network {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// The service rejected the presented credentials.
    ///
    /// Terminal for a message pipe: no automatic reconnection follows.
    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        /// Human-readable description of the rejection.
        reason: String,
    },

    /// An integrity check failed: missing digest, digest mismatch, or
    /// MAC mismatch. Never downgraded to a warning.
    #[error("integrity error: {reason}")]
    Integrity {
        /// Human-readable description of the integrity failure.
        reason: String,
    },

    /// A streamed transfer exceeded its byte-size ceiling.
    ///
    /// Partial output has been discarded by the time this is returned.
    #[error("size limit exceeded: transferred {actual} bytes, ceiling {limit}")]
    SizeLimitExceeded {
        /// The configured ceiling in bytes.
        limit: u64,
        /// Bytes seen when the transfer was aborted.
        actual: u64,
    },

    /// A message pipe operation failed outside of authentication
    /// (handshake transport failure, send on a closed pipe).
    #[error("pipe error: {reason}")]
    Pipe {
        /// Human-readable description of the pipe failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`CircleError`].
pub type Result<T> = std::result::Result<T, CircleError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_rejects_empty() {
        let err = "".parse::<ServiceAddress>();
        assert!(matches!(err, Err(CircleError::InvalidAddress { .. })));
    }

    #[test]
    fn address_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let addr: ServiceAddress = "+14151112222".parse()?;
        assert_eq!(addr.as_str(), "+14151112222");
        assert_eq!(addr.to_string(), "+14151112222");
        Ok(())
    }

    #[test]
    fn auth_user_includes_device_id() {
        let creds = Credentials::new(
            "+14151112222",
            "hunter2",
            SignalingKey::from_bytes([0u8; 52]),
            Some(2),
        );
        assert_eq!(creds.auth_user(), "+14151112222.2");

        let primary = Credentials::new(
            "+14151112222",
            "hunter2",
            SignalingKey::from_bytes([0u8; 52]),
            None,
        );
        assert_eq!(primary.auth_user(), "+14151112222");
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds = Credentials::new(
            "+14151112222",
            "hunter2",
            SignalingKey::from_bytes([7u8; 52]),
            None,
        );
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("07070707"));
    }

    #[test]
    fn digest_displays_as_hex() {
        let digest = CiphertextDigest::from_bytes([0xAB; 32]);
        assert_eq!(digest.to_string(), "ab".repeat(32));
    }

    #[test]
    fn size_limit_error_is_distinct_from_integrity() {
        let too_big = CircleError::SizeLimitExceeded {
            limit: 10,
            actual: 11,
        };
        assert!(!matches!(too_big, CircleError::Integrity { .. }));
        assert_eq!(
            too_big.to_string(),
            "size limit exceeded: transferred 11 bytes, ceiling 10"
        );
    }

    #[test]
    fn connectivity_state_display() {
        assert_eq!(
            ConnectivityState::AuthenticationFailed.to_string(),
            "authentication-failed"
        );
    }
}
