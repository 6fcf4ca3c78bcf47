//! Identity types for Tandem aggregates

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Aggregate identifier using UUIDv7 for timestamp-sortable IDs.
/// Contracts, assumptions, conflicts, sessions and edges are keyed by this.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Caller-supplied agent identifier (e.g. `backend_001`).
pub type AgentId = String;

/// Caller-supplied team identifier.
pub type TeamId = String;

/// Task identifier handed out by the external task store.
pub type TaskId = String;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Returns true when an identifier carries no usable content.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Reject blank required fields with `RequiredFieldMissing`.
pub fn require_field(field: &str, value: &str) -> Result<(), crate::ValidationError> {
    if is_blank(value) {
        return Err(crate::ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Reject negative or non-finite hour estimates.
pub fn require_hours(field: &str, hours: f64) -> Result<(), crate::ValidationError> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(crate::ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("hours must be finite and non-negative, got {}", hours),
        });
    }
    Ok(())
}
