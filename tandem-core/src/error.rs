//! Error types for Tandem operations

use crate::{ContractVersion, EntityId, EntityType};
use thiserror::Error;

/// Validation errors raised at the API boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Dependency edge on {artifact} points at itself")]
    SelfLoop { artifact: String },

    #[error("Dependency edge {source_ref} -> {target_ref} ({dependency_type}) already exists")]
    DuplicateEdge {
        source_ref: String,
        target_ref: String,
        dependency_type: String,
    },

    #[error("Invalid contract version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    #[error("Invalid artifact reference '{value}': expected <type>:<id>")]
    InvalidArtifactRef { value: String },

    #[error("Conflict {conflict_id} belongs to team {actual}, not {expected}")]
    TeamMismatch {
        conflict_id: EntityId,
        expected: String,
        actual: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Storage and external-store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage lock poisoned: {resource}")]
    LockPoisoned { resource: String },

    #[error("Task store operation {operation} failed: {reason}")]
    TaskStore { operation: String, reason: String },
}

/// Coarse error classification used by callers and remote surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidStateTransition,
    VersionConflict,
    Validation,
    Config,
    Storage,
}

impl ErrorKind {
    /// HTTP status code this kind maps to when exposed remotely.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidStateTransition => 409,
            ErrorKind::VersionConflict => 412,
            ErrorKind::Validation => 422,
            ErrorKind::Config => 500,
            ErrorKind::Storage => 503,
        }
    }

    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorKind::VersionConflict => "VERSION_CONFLICT",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Config => "CONFIG_ERROR",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Master error type for all Tandem errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TandemError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("{entity_type} {id} cannot transition from {from} to {to}")]
    InvalidStateTransition {
        entity_type: EntityType,
        id: String,
        from: String,
        to: String,
    },

    #[error("Conflict {conflict_id} is already resolved")]
    AlreadyResolved { conflict_id: EntityId },

    #[error("Version conflict on contract {team_id}/{name}: {proposed} is not newer than {current}")]
    VersionConflict {
        contract_id: Option<EntityId>,
        team_id: String,
        name: String,
        current: ContractVersion,
        proposed: ContractVersion,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TandemError {
    /// Build a not-found error for an aggregate.
    pub fn not_found(entity_type: EntityType, id: impl ToString) -> Self {
        TandemError::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Build an invalid-transition error for an aggregate.
    pub fn invalid_transition(
        entity_type: EntityType,
        id: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        TandemError::InvalidStateTransition {
            entity_type,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TandemError::NotFound { .. } => ErrorKind::NotFound,
            TandemError::InvalidStateTransition { .. } | TandemError::AlreadyResolved { .. } => {
                ErrorKind::InvalidStateTransition
            }
            TandemError::VersionConflict { .. } => ErrorKind::VersionConflict,
            TandemError::Validation(_) => ErrorKind::Validation,
            TandemError::Config(_) => ErrorKind::Config,
            TandemError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Identifier of the aggregate the error is about, when there is one.
    pub fn aggregate_id(&self) -> Option<String> {
        match self {
            TandemError::NotFound { id, .. } => Some(id.clone()),
            TandemError::InvalidStateTransition { id, .. } => Some(id.clone()),
            TandemError::AlreadyResolved { conflict_id } => Some(conflict_id.to_string()),
            TandemError::VersionConflict {
                contract_id,
                team_id,
                name,
                ..
            } => Some(
                contract_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| format!("{}/{}", team_id, name)),
            ),
            TandemError::Validation(ValidationError::TeamMismatch { conflict_id, .. }) => {
                Some(conflict_id.to_string())
            }
            TandemError::Validation(_) | TandemError::Config(_) | TandemError::Storage(_) => None,
        }
    }
}

/// Result type alias for Tandem operations.
pub type TandemResult<T> = Result<T, TandemError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_not_found_display_and_id() {
        let err = TandemError::not_found(EntityType::Contract, Uuid::nil());
        let msg = format!("{}", err);
        assert!(msg.contains("Contract not found"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.aggregate_id().as_deref(),
            Some("00000000-0000-0000-0000-000000000000")
        );
    }

    #[test]
    fn test_already_resolved_is_state_transition_kind() {
        let err = TandemError::AlreadyResolved {
            conflict_id: Uuid::nil(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(err.kind().http_status(), 409);
    }

    #[test]
    fn test_version_conflict_display() {
        let err = TandemError::VersionConflict {
            contract_id: None,
            team_id: "team-a".to_string(),
            name: "UserAPI".to_string(),
            current: ContractVersion::new(2, 0, 0),
            proposed: ContractVersion::new(1, 5, 0),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1.5"));
        assert!(msg.contains("2.0"));
        assert_eq!(err.aggregate_id().as_deref(), Some("team-a/UserAPI"));
    }

    #[test]
    fn test_validation_error_display_self_loop() {
        let err: TandemError = ValidationError::SelfLoop {
            artifact: "task:build".to_string(),
        }
        .into();
        assert!(format!("{}", err).contains("task:build"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.aggregate_id().is_none());
    }

    #[test]
    fn test_error_kinds_map_to_distinct_statuses() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::InvalidStateTransition,
            ErrorKind::VersionConflict,
            ErrorKind::Validation,
            ErrorKind::Config,
            ErrorKind::Storage,
        ];
        let statuses: std::collections::HashSet<u16> =
            kinds.iter().map(|k| k.http_status()).collect();
        assert_eq!(statuses.len(), kinds.len());
    }
}
