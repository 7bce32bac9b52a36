//! # Chat Core
//! 
//! Domain entities, ports, and the hot/cold message pipeline: cache
//! hydration and migration, scheduled migration, live chat sessions and
//! the shutdown sweep.

pub mod domain;
pub mod error;
pub mod providers;
pub mod repositories;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export domain entities
pub use domain::*;
pub use error::DomainError;
