//! Client configuration with sensible defaults.
//!
//! All operational parameters are centralized here. Every value has a
//! documented default; the endpoint list is the only field without one
//! (a client with no service URL is unusable).

use serde::{Deserialize, Serialize};

use crate::{CircleError, Result};

// ---------------------------------------------------------------------------
// ServiceUrl
// ---------------------------------------------------------------------------

/// One service endpoint plus its trust anchor.
///
/// The trust anchor is an optional DER-encoded certificate pinned for
/// this endpoint's TLS sessions; `None` means the platform trust store
/// is used.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceUrl {
    /// Base URL of the endpoint (e.g. `https://service.example.org`).
    pub url: String,
    /// DER-encoded pinned certificate, if any.
    pub trust_anchor: Option<Vec<u8>>,
}

impl ServiceUrl {
    /// Creates a `ServiceUrl` using the platform trust store.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            trust_anchor: None,
        }
    }

    /// Creates a `ServiceUrl` with a pinned DER certificate.
    pub fn with_trust_anchor(url: impl Into<String>, anchor: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            trust_anchor: Some(anchor),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Immutable client configuration, supplied once at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service endpoints; the first entry is the primary endpoint used
    /// for message pipes.
    pub service_urls: Vec<ServiceUrl>,

    /// User-agent string presented on every request and handshake.
    pub user_agent: String,

    /// Seconds between outbound keepalive frames while a pipe is
    /// connected.
    pub keepalive_interval_secs: u64,

    /// Seconds a pipe waits for a keepalive acknowledgment before
    /// forcing a disconnect.
    pub keepalive_timeout_secs: u64,

    /// Seconds to back off before a reconnection attempt.
    pub reconnect_backoff_secs: u64,
}

impl ServiceConfig {
    /// Creates a configuration for the given endpoints with default
    /// timing parameters.
    pub fn new(service_urls: Vec<ServiceUrl>, user_agent: impl Into<String>) -> Self {
        Self {
            service_urls,
            user_agent: user_agent.into(),
            keepalive_interval_secs: 55,
            keepalive_timeout_secs: 55,
            reconnect_backoff_secs: 10,
        }
    }

    /// Returns the primary endpoint (the one message pipes bind to).
    pub fn primary_url(&self) -> Result<&ServiceUrl> {
        self.service_urls
            .first()
            .ok_or_else(|| CircleError::Config {
                reason: "no service URLs configured".into(),
            })
    }

    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.service_urls.is_empty() {
            return Err(CircleError::Config {
                reason: "service_urls must not be empty".into(),
            });
        }
        for entry in &self.service_urls {
            if !entry.url.starts_with("https://") && !entry.url.starts_with("http://") {
                return Err(CircleError::Config {
                    reason: format!("service URL '{}' is not http(s)", entry.url),
                });
            }
        }
        if self.user_agent.is_empty() {
            return Err(CircleError::Config {
                reason: "user_agent must not be empty".into(),
            });
        }
        if self.keepalive_interval_secs == 0 {
            return Err(CircleError::Config {
                reason: "keepalive_interval_secs must be at least 1".into(),
            });
        }
        if self.keepalive_timeout_secs == 0 {
            return Err(CircleError::Config {
                reason: "keepalive_timeout_secs must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
