//! reqwest-backed implementation of [`ServiceSocket`].
//!
//! Thin by design: one request per operation, basic auth from the
//! account credentials, the configured user agent on every request, and
//! an optional pinned DER certificate per endpoint. No internal retries.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use circleservice_types::config::ServiceConfig;
use circleservice_types::{ByteRange, CircleError, Credentials, Result, ServiceAddress};

use crate::entity::{EnvelopeEntity, EnvelopeEntityList, ProfileEntity};
use crate::socket::{ProgressListener, ServiceSocket};

// ---------------------------------------------------------------------------
// HttpServiceSocket
// ---------------------------------------------------------------------------

/// HTTP client bound to one service endpoint and one set of credentials.
pub struct HttpServiceSocket {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<Credentials>,
}

impl HttpServiceSocket {
    /// Builds a socket for the primary configured endpoint.
    ///
    /// # Errors
    ///
    /// [`CircleError::Config`] if no endpoint is configured or the
    /// pinned certificate is not valid DER; [`CircleError::Network`] if
    /// the HTTP client cannot be constructed.
    pub fn new(config: &ServiceConfig, credentials: Arc<Credentials>) -> Result<Self> {
        config.validate()?;
        let primary = config.primary_url()?;

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(anchor) = &primary.trust_anchor {
            let cert =
                reqwest::Certificate::from_der(anchor).map_err(|e| CircleError::Config {
                    reason: format!("invalid pinned certificate: {e}"),
                })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| CircleError::Network {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            base_url: primary.url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.basic_auth(
            self.credentials.auth_user(),
            Some(self.credentials.password()),
        )
    }

    /// Maps non-success statuses onto the error taxonomy: credential
    /// rejections are [`CircleError::AuthenticationFailed`], everything
    /// else is [`CircleError::Network`].
    fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CircleError::AuthenticationFailed {
                reason: format!("service returned {status}"),
            });
        }
        Err(CircleError::Network {
            reason: format!("service returned {status}"),
        })
    }

    /// Streams a response body into `sink`, enforcing the byte ceiling
    /// and reporting monotonically increasing totals to `progress`.
    async fn stream_into(
        response: reqwest::Response,
        sink: &mut (dyn Write + Send),
        ceiling: u64,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<u64> {
        let mut stream = response.bytes_stream();
        let mut total: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CircleError::Network {
                reason: format!("transfer interrupted: {e}"),
            })?;

            total += chunk.len() as u64;
            if total > ceiling {
                tracing::warn!(total, ceiling, "blob transfer exceeded ceiling, aborting");
                return Err(CircleError::SizeLimitExceeded {
                    limit: ceiling,
                    actual: total,
                });
            }

            sink.write_all(&chunk).map_err(|e| CircleError::Network {
                reason: format!("failed to write to destination: {e}"),
            })?;

            if let Some(listener) = progress {
                listener.on_progress(total);
            }
        }

        Ok(total)
    }
}

#[async_trait]
impl ServiceSocket for HttpServiceSocket {
    async fn fetch_pending_envelopes(&self) -> Result<Vec<EnvelopeEntity>> {
        let response = self
            .authorized(self.client.get(self.url("/v1/messages")))
            .send()
            .await
            .map_err(|e| CircleError::Network {
                reason: format!("message poll failed: {e}"),
            })?;

        let list: EnvelopeEntityList = Self::check_status(response)?
            .json()
            .await
            .map_err(|e| CircleError::Network {
                reason: format!("malformed envelope list: {e}"),
            })?;

        tracing::debug!(count = list.messages.len(), "fetched pending envelopes");
        Ok(list.messages)
    }

    async fn acknowledge_by_id(&self, id: &str) -> Result<()> {
        let response = self
            .authorized(
                self.client
                    .delete(self.url(&format!("/v1/messages/uuid/{id}"))),
            )
            .send()
            .await
            .map_err(|e| CircleError::Network {
                reason: format!("acknowledgment failed: {e}"),
            })?;
        Self::check_status(response)?;
        Ok(())
    }

    async fn acknowledge_by_address(
        &self,
        source: &ServiceAddress,
        timestamp: u64,
    ) -> Result<()> {
        let response = self
            .authorized(
                self.client
                    .delete(self.url(&format!("/v1/messages/{source}/{timestamp}"))),
            )
            .send()
            .await
            .map_err(|e| CircleError::Network {
                reason: format!("acknowledgment failed: {e}"),
            })?;
        Self::check_status(response)?;
        Ok(())
    }

    async fn download_blob(
        &self,
        remote_id: u64,
        range: Option<ByteRange>,
        sink: &mut (dyn Write + Send),
        ceiling: u64,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<u64> {
        let mut request = self.authorized(
            self.client
                .get(self.url(&format!("/v1/attachments/{remote_id}"))),
        );
        if let Some(range) = range {
            let end = range.offset + range.length.saturating_sub(1);
            request = request.header("Range", format!("bytes={}-{}", range.offset, end));
        }

        let response = request.send().await.map_err(|e| CircleError::Network {
            reason: format!("attachment download failed: {e}"),
        })?;

        Self::stream_into(Self::check_status(response)?, sink, ceiling, progress).await
    }

    async fn fetch_profile(&self, address: &ServiceAddress) -> Result<ProfileEntity> {
        let response = self
            .authorized(
                self.client
                    .get(self.url(&format!("/v1/profile/{address}"))),
            )
            .send()
            .await
            .map_err(|e| CircleError::Network {
                reason: format!("profile fetch failed: {e}"),
            })?;

        Self::check_status(response)?
            .json()
            .await
            .map_err(|e| CircleError::Network {
                reason: format!("malformed profile: {e}"),
            })
    }

    async fn download_avatar(
        &self,
        path: &str,
        sink: &mut (dyn Write + Send),
        ceiling: u64,
    ) -> Result<u64> {
        let relative = path.trim_start_matches('/');
        let response = self
            .authorized(self.client.get(self.url(&format!("/{relative}"))))
            .send()
            .await
            .map_err(|e| CircleError::Network {
                reason: format!("avatar download failed: {e}"),
            })?;

        Self::stream_into(Self::check_status(response)?, sink, ceiling, None).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
