//! The message pipe task and its handle.
//!
//! [`MessagePipe::connect`] spawns a tokio task that owns the websocket
//! connection, the connectivity tracker, and the keepalive schedule.
//! The handle exposes inbound frames in arrival order and an idempotent
//! [`MessagePipe::shutdown`]. Reconnection after a lost connection is
//! automatic (backoff through the injected timer); a credential
//! rejection during the handshake is terminal.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, WebSocketStream};

use circleservice_types::{CircleError, ConnectivityState, Credentials, Result};

use crate::connectivity::ConnectivityTracker;
use crate::frame::{KeepaliveTracker, PipeMessage, PipeRequest, PipeResponse};
use crate::timer::SleepTimer;

/// Buffered inbound frames before backpressure hits the websocket read.
const FRAME_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// PipeOptions
// ---------------------------------------------------------------------------

/// Connection parameters for one pipe.
#[derive(Clone, Debug)]
pub struct PipeOptions {
    /// Full websocket URL, credentials query included when identified.
    pub ws_url: String,
    /// User-agent presented during the handshake.
    pub user_agent: String,
    /// Idle time before the first keepalive on a fresh connection.
    pub keepalive_interval: Duration,
    /// Deadline for the acknowledgment of a sent keepalive; an
    /// acknowledged keepalive schedules the next one on this cadence.
    pub keepalive_timeout: Duration,
    /// Backoff before a reconnection attempt.
    pub reconnect_backoff: Duration,
}

impl PipeOptions {
    /// Builds options for `base_url` (an `http(s)` service URL).
    ///
    /// With credentials the handshake is identified (`login`/`password`
    /// query parameters, as the service expects); without them the pipe
    /// is unidentified, used for sender-anonymous delivery.
    pub fn for_endpoint(
        base_url: &str,
        user_agent: &str,
        credentials: Option<&Credentials>,
        keepalive_interval: Duration,
        keepalive_timeout: Duration,
        reconnect_backoff: Duration,
    ) -> Self {
        let ws_base = base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        let ws_base = ws_base.trim_end_matches('/');

        let ws_url = match credentials {
            Some(creds) => format!(
                "{}/v1/websocket/?login={}&password={}",
                ws_base,
                encode_query(&creds.auth_user()),
                encode_query(creds.password()),
            ),
            None => format!("{ws_base}/v1/websocket/"),
        };

        Self {
            ws_url,
            user_agent: user_agent.to_owned(),
            keepalive_interval,
            keepalive_timeout,
            reconnect_backoff,
        }
    }
}

/// Percent-encodes one query value (RFC 3986 unreserved set kept).
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// MessagePipe
// ---------------------------------------------------------------------------

/// Handle to one running pipe.
///
/// Scoped resource: the creator must call [`shutdown`](Self::shutdown)
/// when finished. Dropping the handle also ends the task, but explicit
/// shutdown closes the websocket cleanly.
pub struct MessagePipe {
    frames: mpsc::Receiver<PipeRequest>,
    shutdown: watch::Sender<bool>,
}

impl MessagePipe {
    /// Spawns the pipe task and returns its handle.
    ///
    /// Connectivity transitions are sent to `listener`; inbound frames
    /// are read through [`next_frame`](Self::next_frame).
    pub fn connect(
        options: PipeOptions,
        timer: Arc<dyn SleepTimer>,
        listener: mpsc::Sender<ConnectivityState>,
    ) -> Self {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_pipe(options, timer, listener, frames_tx, shutdown_rx));

        Self {
            frames: frames_rx,
            shutdown: shutdown_tx,
        }
    }

    /// Receives the next inbound frame, in arrival order.
    ///
    /// Returns `None` once the pipe has shut down or hit the terminal
    /// authentication-failure state.
    pub async fn next_frame(&mut self) -> Option<PipeRequest> {
        self.frames.recv().await
    }

    /// Stops the pipe. Idempotent; subsequent calls are no-ops.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Pipe task
// ---------------------------------------------------------------------------

enum ConnectionOutcome {
    /// Explicit shutdown; do not reconnect.
    Shutdown,
    /// Connection lost; reconnect after backoff.
    Lost,
}

async fn run_pipe(
    options: PipeOptions,
    timer: Arc<dyn SleepTimer>,
    listener: mpsc::Sender<ConnectivityState>,
    frames_tx: mpsc::Sender<PipeRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tracker = ConnectivityTracker::new(listener);
    let mut keepalive = KeepaliveTracker::new();

    loop {
        if *shutdown_rx.borrow() {
            tracker.transition(ConnectivityState::Disconnected);
            return;
        }

        tracker.transition(ConnectivityState::Connecting);

        let handshake = tokio::select! {
            result = open_connection(&options) => result,
            _ = shutdown_rx.changed() => {
                tracker.transition(ConnectivityState::Disconnected);
                return;
            }
        };

        match handshake {
            Ok(stream) => {
                tracker.transition(ConnectivityState::Connected);
                keepalive.reset();
                let outcome = drive_connection(
                    stream,
                    &options,
                    timer.as_ref(),
                    &frames_tx,
                    &mut keepalive,
                    &mut shutdown_rx,
                )
                .await;
                tracker.transition(ConnectivityState::Disconnected);
                if matches!(outcome, ConnectionOutcome::Shutdown) {
                    return;
                }
            }
            Err(CircleError::AuthenticationFailed { reason }) => {
                tracing::error!(%reason, "pipe handshake rejected, not retrying");
                tracker.transition(ConnectivityState::AuthenticationFailed);
                return;
            }
            Err(e) => {
                tracing::warn!(%e, "pipe handshake failed");
                tracker.transition(ConnectivityState::Disconnected);
            }
        }

        tokio::select! {
            _ = timer.sleep(options.reconnect_backoff) => {}
            _ = shutdown_rx.changed() => {
                tracker.transition(ConnectivityState::Disconnected);
                return;
            }
        }
    }
}

/// Performs the websocket handshake, classifying credential rejections.
async fn open_connection(
    options: &PipeOptions,
) -> Result<WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>> {
    let mut request = options
        .ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| CircleError::Pipe {
            reason: format!("invalid websocket URL: {e}"),
        })?;
    let agent = HeaderValue::from_str(&options.user_agent).map_err(|e| CircleError::Pipe {
        reason: format!("invalid user agent: {e}"),
    })?;
    request.headers_mut().insert(USER_AGENT, agent);

    match connect_async(request).await {
        Ok((stream, _response)) => Ok(stream),
        Err(WsError::Http(response))
            if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
        {
            Err(CircleError::AuthenticationFailed {
                reason: format!("handshake returned {}", response.status()),
            })
        }
        Err(e) => Err(CircleError::Network {
            reason: format!("websocket connect failed: {e}"),
        }),
    }
}

/// Runs one established connection until it is lost or shut down.
async fn drive_connection<S>(
    stream: WebSocketStream<S>,
    options: &PipeOptions,
    timer: &dyn SleepTimer,
    frames_tx: &mpsc::Sender<PipeRequest>,
    keepalive: &mut KeepaliveTracker,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnectionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();

    // One deadline future held across select iterations: inbound
    // traffic must not restart the keepalive schedule.
    let mut keepalive_sleep = timer.sleep(options.keepalive_interval);

    loop {
        tokio::select! {
            inbound = source.next() => {
                match inbound {
                    Some(Ok(message)) => {
                        match handle_message(message, frames_tx, keepalive, &mut sink).await {
                            Ok(true) => {}
                            Ok(false) => return ConnectionOutcome::Shutdown,
                            Err(e) => {
                                tracing::warn!(%e, "pipe connection error");
                                return ConnectionOutcome::Lost;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%e, "websocket read failed");
                        return ConnectionOutcome::Lost;
                    }
                    None => {
                        tracing::debug!("websocket closed by peer");
                        return ConnectionOutcome::Lost;
                    }
                }
            }

            _ = &mut keepalive_sleep => {
                match keepalive.tick() {
                    Some(request) => {
                        // The next fire is the ack deadline for this
                        // keepalive.
                        keepalive_sleep = timer.sleep(options.keepalive_timeout);
                        if let Err(e) = send_frame(&mut sink, &PipeMessage::Request(request)).await {
                            tracing::warn!(%e, "keepalive send failed");
                            return ConnectionOutcome::Lost;
                        }
                    }
                    None => {
                        tracing::warn!("keepalive unacknowledged, forcing disconnect");
                        return ConnectionOutcome::Lost;
                    }
                }
            }

            _ = shutdown_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return ConnectionOutcome::Shutdown;
            }
        }
    }
}

/// Processes one inbound websocket message.
///
/// Returns `Ok(false)` when the frame consumer is gone (treat as
/// shutdown), `Err` on connection-fatal conditions.
async fn handle_message<S>(
    message: Message,
    frames_tx: &mpsc::Sender<PipeRequest>,
    keepalive: &mut KeepaliveTracker,
    sink: &mut S,
) -> Result<bool>
where
    S: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    let payload = match message {
        Message::Text(text) => text.as_str().as_bytes().to_vec(),
        Message::Binary(bytes) => bytes.to_vec(),
        Message::Ping(data) => {
            sink.send(Message::Pong(data))
                .await
                .map_err(|e| CircleError::Pipe {
                    reason: format!("pong send failed: {e}"),
                })?;
            return Ok(true);
        }
        Message::Pong(_) => return Ok(true),
        Message::Close(_) => {
            return Err(CircleError::Pipe {
                reason: "peer closed connection".into(),
            })
        }
        Message::Frame(_) => return Ok(true),
    };

    let frame: PipeMessage =
        serde_json::from_slice(&payload).map_err(|e| CircleError::InvalidMessage {
            reason: format!("malformed pipe frame: {e}"),
        })?;

    match frame {
        PipeMessage::Request(request) => {
            let response = PipeResponse::ok(request.id);
            if frames_tx.send(request).await.is_err() {
                // Consumer dropped the handle; nothing left to deliver to.
                return Ok(false);
            }
            send_frame(sink, &PipeMessage::Response(response)).await?;
            Ok(true)
        }
        PipeMessage::Response(response) => {
            if !keepalive.acknowledge(response.id) {
                tracing::debug!(id = response.id, "response for unknown request id");
            }
            Ok(true)
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &PipeMessage) -> Result<()>
where
    S: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    let encoded = serde_json::to_string(frame).map_err(|e| CircleError::InvalidMessage {
        reason: format!("frame encode failed: {e}"),
    })?;
    sink.send(Message::Text(encoded.into()))
        .await
        .map_err(|e| CircleError::Pipe {
            reason: format!("frame send failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
