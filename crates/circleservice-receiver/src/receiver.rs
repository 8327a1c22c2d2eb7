//! The `MessageReceiver`: poll-based retrieval, pipe creation, and
//! verified asset downloads.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use circleservice_crypto::attachment::AttachmentCipherReader;
use circleservice_crypto::profile::ProfileCipherReader;
use circleservice_pipe::pipe::{MessagePipe, PipeOptions};
use circleservice_pipe::timer::SleepTimer;
use circleservice_transport::entity::{EnvelopeEntity, ProfileEntity};
use circleservice_transport::socket::{ProgressListener, ServiceSocket};
use circleservice_types::config::ServiceConfig;
use circleservice_types::{
    AssetKey, AttachmentPointer, CircleError, ConnectivityState, Credentials, Result,
    ServiceAddress,
};

use crate::callback::{MessageReceivedCallback, NullMessageCallback};
use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Acknowledgment key
// ---------------------------------------------------------------------------

/// How one envelope will be acknowledged.
///
/// The server-assigned id always wins when present; the composite
/// (source, timestamp) key is the fallback. Entities providing neither
/// are delivered but never acknowledged — acknowledgment is best-effort
/// telemetry to the server, not a correctness requirement.
enum AckKey {
    Uuid(String),
    SourceTimestamp(ServiceAddress, u64),
    None,
}

impl AckKey {
    fn for_entity(entity: &EnvelopeEntity) -> Self {
        if let Some(uuid) = &entity.server_uuid {
            return Self::Uuid(uuid.clone());
        }
        if let Some(source) = &entity.source {
            match source.parse() {
                Ok(address) => return Self::SourceTimestamp(address, entity.timestamp),
                Err(e) => {
                    // Unusable keys degrade to "never acknowledged",
                    // they do not abort the poll.
                    tracing::debug!(%e, "entity source unusable as acknowledgment key");
                }
            }
        }
        Self::None
    }
}

// ---------------------------------------------------------------------------
// MessageReceiver
// ---------------------------------------------------------------------------

/// Primary interface for receiving circleservice messages.
///
/// Bound at construction to one configuration, one set of credentials,
/// one transport socket, one connectivity listener, and one sleep
/// timer; all are shared read-only by everything the receiver creates.
pub struct MessageReceiver {
    config: ServiceConfig,
    credentials: Arc<Credentials>,
    socket: Arc<dyn ServiceSocket>,
    connectivity: mpsc::Sender<ConnectivityState>,
    timer: Arc<dyn SleepTimer>,
}

impl MessageReceiver {
    /// Creates a receiver.
    ///
    /// `connectivity` is the single listener that every pipe created by
    /// this receiver reports its transitions to.
    ///
    /// # Errors
    ///
    /// [`CircleError::Config`] if the configuration fails validation.
    pub fn new(
        config: ServiceConfig,
        credentials: Arc<Credentials>,
        socket: Arc<dyn ServiceSocket>,
        connectivity: mpsc::Sender<ConnectivityState>,
        timer: Arc<dyn SleepTimer>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            credentials,
            socket,
            connectivity,
            timer,
        })
    }

    // -----------------------------------------------------------------
    // Message retrieval
    // -----------------------------------------------------------------

    /// Drains all currently queued envelopes, ignoring their contents.
    ///
    /// Equivalent to [`retrieve_messages_with`](Self::retrieve_messages_with)
    /// with the no-op callback.
    pub async fn retrieve_messages(&self) -> Result<Vec<Envelope>> {
        self.retrieve_messages_with(&mut NullMessageCallback).await
    }

    /// Drains all currently queued envelopes via the poll transport.
    ///
    /// For each wire entity, in the order the transport returned them:
    /// constructs the envelope, invokes `callback` synchronously, then
    /// acknowledges — by server id when present, else by (source,
    /// timestamp), else not at all. A failed acknowledgment is logged
    /// and does not abort processing of later envelopes.
    ///
    /// Returns the full ordered list of constructed envelopes.
    pub async fn retrieve_messages_with(
        &self,
        callback: &mut dyn MessageReceivedCallback,
    ) -> Result<Vec<Envelope>> {
        let entities = self.socket.fetch_pending_envelopes().await?;
        let mut results = Vec::with_capacity(entities.len());

        for entity in entities {
            let ack = AckKey::for_entity(&entity);
            let envelope = Envelope::from_entity(entity)?;

            callback.on_message(&envelope);

            match ack {
                AckKey::Uuid(ref uuid) => {
                    if let Err(e) = self.socket.acknowledge_by_id(uuid).await {
                        tracing::warn!(%uuid, %e, "envelope acknowledgment failed");
                    }
                }
                AckKey::SourceTimestamp(ref source, timestamp) => {
                    if let Err(e) = self
                        .socket
                        .acknowledge_by_address(source, timestamp)
                        .await
                    {
                        tracing::warn!(%source, timestamp, %e, "envelope acknowledgment failed");
                    }
                }
                AckKey::None => {
                    tracing::debug!("envelope has no usable acknowledgment key, skipping");
                }
            }

            results.push(envelope);
        }

        Ok(results)
    }

    // -----------------------------------------------------------------
    // Pipes
    // -----------------------------------------------------------------

    /// Creates a pipe to the primary endpoint with this receiver's
    /// credentials attached to the handshake.
    ///
    /// The caller must call [`MessagePipe::shutdown`] when finished;
    /// the receiver does not track pipes it created.
    pub fn create_message_pipe(&self) -> Result<MessagePipe> {
        self.create_pipe(Some(self.credentials.as_ref()))
    }

    /// Creates a pipe whose handshake omits credentials, for
    /// sender-anonymous delivery.
    pub fn create_unidentified_message_pipe(&self) -> Result<MessagePipe> {
        self.create_pipe(None)
    }

    fn create_pipe(&self, credentials: Option<&Credentials>) -> Result<MessagePipe> {
        let primary = self.config.primary_url()?;
        let options = PipeOptions::for_endpoint(
            &primary.url,
            &self.config.user_agent,
            credentials,
            Duration::from_secs(self.config.keepalive_interval_secs),
            Duration::from_secs(self.config.keepalive_timeout_secs),
            Duration::from_secs(self.config.reconnect_backoff_secs),
        );
        Ok(MessagePipe::connect(
            options,
            Arc::clone(&self.timer),
            self.connectivity.clone(),
        ))
    }

    // -----------------------------------------------------------------
    // Assets
    // -----------------------------------------------------------------

    /// Retrieves an attachment: downloads bounded ciphertext into
    /// `destination`, then returns a decrypting, digest-verifying
    /// reader over it.
    ///
    /// Fails before any network transfer when the pointer carries no
    /// digest. A transfer that exceeds `ceiling` is aborted and the
    /// partial destination file is removed.
    pub async fn retrieve_attachment(
        &self,
        pointer: &AttachmentPointer,
        destination: &Path,
        ceiling: u64,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<AttachmentCipherReader<File>> {
        let digest = pointer.digest.ok_or_else(|| CircleError::Integrity {
            reason: "attachment pointer has no digest".into(),
        })?;

        let mut file = File::create(destination).map_err(|e| CircleError::Network {
            reason: format!("cannot create destination file: {e}"),
        })?;

        let transfer = self
            .socket
            .download_blob(pointer.remote_id, pointer.range, &mut file, ceiling, progress)
            .await;

        if let Err(e) = transfer {
            drop(file);
            if let Err(remove) = std::fs::remove_file(destination) {
                tracing::warn!(%remove, "failed to discard partial attachment");
            }
            return Err(e);
        }

        drop(file);
        let ciphertext = File::open(destination).map_err(|e| CircleError::Network {
            reason: format!("cannot reopen downloaded attachment: {e}"),
        })?;

        AttachmentCipherReader::new(
            ciphertext,
            &pointer.key,
            digest,
            pointer.size.map(u64::from),
        )
    }

    /// Fetches the profile for `address`.
    pub async fn retrieve_profile(&self, address: &ServiceAddress) -> Result<ProfileEntity> {
        self.socket.fetch_profile(address).await
    }

    /// Retrieves a profile avatar: downloads the bounded ciphertext at
    /// `path` into `destination` and returns a decrypting reader keyed
    /// by `profile_key`.
    pub async fn retrieve_profile_avatar(
        &self,
        path: &str,
        destination: &Path,
        profile_key: &AssetKey,
        ceiling: u64,
    ) -> Result<ProfileCipherReader<File>> {
        let mut file = File::create(destination).map_err(|e| CircleError::Network {
            reason: format!("cannot create destination file: {e}"),
        })?;

        let transfer = self.socket.download_avatar(path, &mut file, ceiling).await;

        if let Err(e) = transfer {
            drop(file);
            if let Err(remove) = std::fs::remove_file(destination) {
                tracing::warn!(%remove, "failed to discard partial avatar");
            }
            return Err(e);
        }

        drop(file);
        let ciphertext = File::open(destination).map_err(|e| CircleError::Network {
            reason: format!("cannot reopen downloaded avatar: {e}"),
        })?;

        ProfileCipherReader::new(ciphertext, profile_key, None)
    }
}
