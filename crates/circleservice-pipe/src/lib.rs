//! Persistent duplex message pipe for the circleservice client.
//!
//! A [`MessagePipe`] holds one websocket connection to the primary
//! service endpoint and delivers inbound frames in arrival order over a
//! channel. Connectivity transitions (`Connecting → Connected →
//! Disconnected`, with the terminal `AuthenticationFailed` side exit)
//! are broadcast to the single registered listener, at most once per
//! actual transition. Reconnection backoff and the keepalive schedule
//! are driven by an injected [`timer::SleepTimer`] so tests can run the
//! state machine deterministically.
//!
//! # Modules
//!
//! - [`timer`] — sleep/backoff abstraction
//! - [`connectivity`] — transition tracking and listener notification
//! - [`frame`] — pipe wire frames and keepalive bookkeeping
//! - [`pipe`] — the pipe task and its handle

pub mod connectivity;
pub mod frame;
pub mod pipe;
pub mod timer;

pub use connectivity::ConnectivityTracker;
pub use frame::{PipeMessage, PipeRequest, PipeResponse};
pub use pipe::{MessagePipe, PipeOptions};
pub use timer::{SleepTimer, TokioSleepTimer};
