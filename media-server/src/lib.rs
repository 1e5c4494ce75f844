//! External media-server process control.
//!
//! The gateway does not carry media itself: an external media server
//! (MediaMTX or compatible) does the republishing. This crate owns that
//! process — configuration writes, spawn/respawn, graceful stop, crash
//! supervision with a bounded restart budget, and readiness polling
//! against its control API.

mod api;
mod controller;
mod error;

pub use api::{ApiClient, PathStat};
pub use controller::{MediaServerController, Status};
pub use error::MediaError;
