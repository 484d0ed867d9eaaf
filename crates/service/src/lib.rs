//! Service shell for the cove sync core.
//!
//! This crate wires the protocol engines in `cove-common` to concrete
//! clients: configuration loading, long-lived `State` owning the
//! store/storage/ABE clients, per-request `Session`s, and tracing
//! setup. The RPC layer on top is out of scope; consumers drive the
//! `Handler` a session exposes.

pub mod config;
pub mod session;
pub mod state;

pub use config::{Config, ConfigError, SwiftSettings};
pub use session::Session;
pub use state::State;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber: compact stdout output,
/// default level from the config, overridable via `RUST_LOG`.
pub fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer().compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}
