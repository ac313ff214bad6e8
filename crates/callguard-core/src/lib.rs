//! # callguard-core
//!
//! Domain core of the fraud alert relay. Nothing in this crate performs I/O.
//!
//! - [`keywords::FraudKeywordSet`]: case-insensitive substring matcher
//! - [`dedup::CallDedupTracker`]: at-most-one fraud alert per call
//! - [`events::AlertEvent`]: the wire events pushed to listeners
//! - [`webhook::classify`]: normalizes inbound provider payloads into [`webhook::WebhookEvent`]

#![deny(unsafe_code)]

pub mod dedup;
pub mod events;
pub mod ids;
pub mod keywords;
pub mod webhook;

pub use dedup::CallDedupTracker;
pub use events::{AlertEvent, Severity};
pub use ids::CallId;
pub use keywords::FraudKeywordSet;
pub use webhook::{WebhookEvent, classify};
