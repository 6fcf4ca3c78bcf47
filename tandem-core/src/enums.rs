//! Enum types for Tandem entities
//!
//! Every enum here is closed: free-text severities, statuses or artifact
//! kinds are parsed at the boundary and never travel further as strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an unknown enum token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub enum_name: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.enum_name, self.value)
    }
}

impl std::error::Error for EnumParseError {}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Generates the db-string conversions shared by all Tandem enums.
///
/// Parsing is case-insensitive and ignores `_`, `-` and whitespace, so
/// `contract_breach`, `ContractBreach` and `CONTRACT-BREACH` are equivalent.
macro_rules! db_enum {
    ($name:ident { $($variant:ident => $db:literal),+ $(,)? }) => {
        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Convert to database string representation.
            pub fn as_db_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $db),+
                }
            }

            /// Parse from database string representation.
            pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
                let token = normalize_token(s);
                $(
                    if token == normalize_token($db) {
                        return Ok($name::$variant);
                    }
                )+
                Err(EnumParseError {
                    enum_name: stringify!($name),
                    value: s.to_string(),
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_db_str())
            }
        }

        impl FromStr for $name {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_db_str(s)
            }
        }
    };
}

// ============================================================================
// DISCRIMINATORS
// ============================================================================

/// Aggregate type discriminator used in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Contract,
    Assumption,
    Conflict,
    ConvergenceSession,
}

db_enum!(EntityType {
    Contract => "Contract",
    Assumption => "Assumption",
    Conflict => "Conflict",
    ConvergenceSession => "ConvergenceSession",
});

/// Kind of artifact a dependency edge or assumption points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// A named, versioned contract lineage
    Contract,
    /// A unit of work in the external task store
    Task,
    /// An agent (consumer, author, participant)
    Agent,
    /// A tracked assumption
    Assumption,
    /// Source code produced by an agent
    Code,
    /// Design documents and mockups
    Design,
}

db_enum!(ArtifactType {
    Contract => "contract",
    Task => "task",
    Agent => "agent",
    Assumption => "assumption",
    Code => "code",
    Design => "design",
});

/// Relationship carried by a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Target cannot be done without source
    Requires,
    /// Target consumes the source (contract consumers)
    Consumes,
    /// Target implements the source
    Implements,
    /// Target was built on the source assumption
    InformedBy,
    /// Loose reference
    References,
}

db_enum!(DependencyType {
    Requires => "requires",
    Consumes => "consumes",
    Implements => "implements",
    InformedBy => "informed_by",
    References => "references",
});

// ============================================================================
// CONTRACTS
// ============================================================================

/// Lifecycle status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Proposed, not yet binding
    Draft,
    /// The binding version of its lineage
    Active,
    /// Superseded by a newer active version (terminal)
    Deprecated,
}

db_enum!(ContractStatus {
    Draft => "draft",
    Active => "active",
    Deprecated => "deprecated",
});

/// Kind of interface a contract describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    RestApi,
    GraphQl,
    Event,
    DataModel,
    Ui,
}

db_enum!(ContractType {
    RestApi => "rest_api",
    GraphQl => "graphql",
    Event => "event",
    DataModel => "data_model",
    Ui => "ui",
});

// ============================================================================
// ASSUMPTIONS
// ============================================================================

/// Lifecycle status of an assumption. Validated and Invalidated are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionStatus {
    Active,
    Validated,
    Invalidated,
}

db_enum!(AssumptionStatus {
    Active => "active",
    Validated => "validated",
    Invalidated => "invalidated",
});

impl AssumptionStatus {
    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssumptionStatus::Validated | AssumptionStatus::Invalidated)
    }
}

/// What an assumption is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionCategory {
    Performance,
    Interface,
    Data,
    Behavior,
    Infrastructure,
    Design,
}

db_enum!(AssumptionCategory {
    Performance => "performance",
    Interface => "interface",
    Data => "data",
    Behavior => "behavior",
    Infrastructure => "infrastructure",
    Design => "design",
});

// ============================================================================
// CONFLICTS & CONVERGENCE
// ============================================================================

/// Classification of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// A breaking contract evolution affecting existing consumers
    ContractBreach,
    /// An artifact change contradicting a tracked assumption
    AssumptionInvalidation,
    /// Manually reported divergence
    Other,
}

db_enum!(ConflictType {
    ContractBreach => "contract_breach",
    AssumptionInvalidation => "assumption_invalidation",
    Other => "other",
});

/// Conflict severity. Declaration order is the total order used for
/// convergence prioritization: Low < Medium < High < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

db_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Severity {
    /// High and Critical conflicts halt work linked through blocking edges.
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::High
    }
}

/// Status of a convergence session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

db_enum!(SessionStatus {
    InProgress => "in_progress",
    Completed => "completed",
});

/// What caused a convergence session to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    ConflictDetected,
    ContractEvolution,
    Milestone,
    Manual,
}

db_enum!(TriggerType {
    ConflictDetected => "conflict_detected",
    ContractEvolution => "contract_evolution",
    Milestone => "milestone",
    Manual => "manual",
});

// ============================================================================
// WORK STREAMS
// ============================================================================

/// Kind of parallel work stream spawned from an MVD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Backend,
    Frontend,
    Api,
    Design,
    Qa,
    Infrastructure,
}

db_enum!(StreamType {
    Backend => "backend",
    Frontend => "frontend",
    Api => "api",
    Design => "design",
    Qa => "qa",
    Infrastructure => "infrastructure",
});
