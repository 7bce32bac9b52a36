//! Telemetry setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the process subscriber. Components only ever talk to `tracing`,
/// so tests can scope their own subscriber instead.
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chat_core=debug,chat_infrastructure=debug"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}
