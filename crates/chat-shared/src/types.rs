//! Common types

use uuid::Uuid;

pub type EntityId = Uuid;

/// Opaque identifier handed over by the identity provider.
pub type UserId = String;

pub fn new_id() -> EntityId {
    Uuid::new_v4()
}
