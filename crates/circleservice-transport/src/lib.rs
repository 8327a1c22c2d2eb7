//! Authenticated HTTP transport for the circleservice client.
//!
//! [`socket::ServiceSocket`] is the contract the rest of the workspace
//! consumes: fetch pending envelopes, acknowledge one, and transfer byte
//! blobs under a size ceiling. [`http::HttpServiceSocket`] is the thin
//! reqwest-backed implementation of that contract; tests substitute their
//! own mock implementations.
//!
//! # Modules
//!
//! - [`entity`] — wire entities (envelope list, profile)
//! - [`socket`] — the `ServiceSocket` trait and listener traits
//! - [`http`] — reqwest implementation

pub mod entity;
pub mod http;
pub mod socket;

pub use entity::{EnvelopeEntity, EnvelopeEntityList, ProfileEntity};
pub use http::HttpServiceSocket;
pub use socket::{ProgressListener, ServiceSocket};
