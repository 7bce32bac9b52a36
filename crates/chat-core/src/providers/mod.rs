//! Upstream provider traits (ports)

pub mod completion_provider;
pub mod readiness_probe;

pub use completion_provider::{CompletionProvider, RelayFragment, RelayStream};
pub use readiness_probe::ReadinessProbe;
