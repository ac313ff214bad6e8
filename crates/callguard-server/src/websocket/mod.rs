//! Listener channel: connection state, registry, liveness sweep, and the
//! WebSocket upgrade handler.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-listener outbound queue, liveness flag, transport state |
//! | `registry` | Registered listeners, fan-out broadcast, sweep |
//! | `heartbeat` | Timer-driven liveness sweep task |
//! | `handler` | WebSocket upgrade and per-connection read/write loops |

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod registry;
