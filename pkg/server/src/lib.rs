//! HTTP server bootstrap: plain and mutual-TLS listeners, health probes,
//! logging setup.

pub mod health;
pub mod logging;
pub mod serve;

pub use health::{Probe, healthy, probe_router, ready};
pub use serve::{listen_and_serve, listen_and_serve_mtls, serve, serve_mtls, shutdown_signal};
