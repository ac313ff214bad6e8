//! # callguard-server
//!
//! Axum server that receives voice-platform webhooks, detects fraud
//! indicators in call transcripts, and relays alert events to every
//! connected WebSocket listener.
//!
//! - [`server::AlertServer`]: router, background tasks, lifecycle
//! - [`processor::WebhookProcessor`]: classify, detect, dedup, dispatch
//! - [`dispatcher::EventDispatcher`]: typed event emission
//! - [`websocket`]: listener registry, liveness sweep, socket handling
//! - [`agent`]: outbound voice-agent dispatch

#![deny(unsafe_code)]

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod processor;
pub mod pruner;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AlertServer, ServerHandle};
pub use shutdown::ShutdownReport;
