//! Shared wire contract for the billflow payment event pipeline.
//!
//! - [`signature`]: HMAC-SHA256 signing of raw webhook bodies.
//! - [`objects`]: the inbound payment envelope and the acknowledgement body.
//! - `client` (feature): a sender that signs and posts payment events.

#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
