//! The `ServiceSocket` contract.
//!
//! Everything the receiver needs from the service over plain HTTP:
//! fetch the pending envelope queue, acknowledge one envelope, and
//! transfer blobs under a byte ceiling. Both acknowledgment forms are
//! idempotent — calling either twice for the same envelope is safe.

use std::io::Write;

use async_trait::async_trait;
use circleservice_types::{ByteRange, Result, ServiceAddress};

use crate::entity::{EnvelopeEntity, ProfileEntity};

// ---------------------------------------------------------------------------
// ProgressListener
// ---------------------------------------------------------------------------

/// Receives cumulative byte counts during a blob transfer.
///
/// Counts are monotonically increasing; the final call carries the total
/// transferred size.
pub trait ProgressListener: Send + Sync {
    /// Called after each transferred chunk with the running total.
    fn on_progress(&self, total_bytes: u64);
}

// ---------------------------------------------------------------------------
// ServiceSocket
// ---------------------------------------------------------------------------

/// Authenticated HTTP operations against the service.
///
/// Implementations must not retry internally: retry policy belongs to
/// the caller (and the receiver deliberately treats per-envelope
/// acknowledgment failures as best-effort).
#[async_trait]
pub trait ServiceSocket: Send + Sync {
    /// Fetches all currently queued envelopes, in server receipt order.
    async fn fetch_pending_envelopes(&self) -> Result<Vec<EnvelopeEntity>>;

    /// Acknowledges one envelope by its server-assigned unique id.
    async fn acknowledge_by_id(&self, id: &str) -> Result<()>;

    /// Acknowledges one envelope by its (source, client timestamp) pair.
    async fn acknowledge_by_address(&self, source: &ServiceAddress, timestamp: u64) -> Result<()>;

    /// Streams the blob `remote_id` into `sink`, enforcing `ceiling`.
    ///
    /// Returns the total bytes written. Exceeding the ceiling aborts the
    /// transfer with [`circleservice_types::CircleError::SizeLimitExceeded`];
    /// the caller owns the sink and must discard whatever partial data
    /// landed in it.
    async fn download_blob(
        &self,
        remote_id: u64,
        range: Option<ByteRange>,
        sink: &mut (dyn Write + Send),
        ceiling: u64,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<u64>;

    /// Fetches the profile for `address`.
    async fn fetch_profile(&self, address: &ServiceAddress) -> Result<ProfileEntity>;

    /// Streams the avatar blob at `path` into `sink` under `ceiling`.
    async fn download_avatar(
        &self,
        path: &str,
        sink: &mut (dyn Write + Send),
        ceiling: u64,
    ) -> Result<u64>;
}
