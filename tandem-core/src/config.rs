//! Configuration for the coordination engine

use crate::{ConfigError, TandemError, TandemResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the dependency graph does when an identical edge already exists.
/// Edges are identical when source, target and dependency type match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateEdgePolicy {
    /// Return the existing edge unchanged
    #[default]
    ReturnExisting,
    /// Fail with `ValidationError::DuplicateEdge`
    Reject,
}

impl DuplicateEdgePolicy {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DuplicateEdgePolicy::ReturnExisting => "return_existing",
            DuplicateEdgePolicy::Reject => "reject",
        }
    }
}

impl fmt::Display for DuplicateEdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for DuplicateEdgePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "return_existing" | "existing" => Ok(DuplicateEdgePolicy::ReturnExisting),
            "reject" => Ok(DuplicateEdgePolicy::Reject),
            _ => Err(ConfigError::InvalidValue {
                field: "duplicate_edge_policy".to_string(),
                value: s.to_string(),
                reason: "expected return_existing or reject".to_string(),
            }),
        }
    }
}

/// Tunables for estimation and fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TandemConfig {
    /// Rework estimate per existing consumer of a breaking contract change
    pub rework_hours_per_consumer: f64,
    /// Rework estimate per dependent artifact of a contradicted assumption
    pub assumption_rework_hours_per_artifact: f64,
    pub duplicate_edge_policy: DuplicateEdgePolicy,
    /// Upper bound on concurrent task-store calls during stream fan-out
    pub max_parallel_streams: usize,
}

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            rework_hours_per_consumer: 2.0,
            assumption_rework_hours_per_artifact: 1.0,
            duplicate_edge_policy: DuplicateEdgePolicy::ReturnExisting,
            max_parallel_streams: 8,
        }
    }
}

impl TandemConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Set but unparseable values are errors.
    ///
    /// - `TANDEM_REWORK_HOURS_PER_CONSUMER`
    /// - `TANDEM_ASSUMPTION_REWORK_HOURS`
    /// - `TANDEM_DUPLICATE_EDGE_POLICY`
    /// - `TANDEM_MAX_PARALLEL_STREAMS`
    pub fn from_env() -> TandemResult<Self> {
        let defaults = Self::default();
        let config = Self {
            rework_hours_per_consumer: env_or(
                "TANDEM_REWORK_HOURS_PER_CONSUMER",
                "rework_hours_per_consumer",
                defaults.rework_hours_per_consumer,
            )?,
            assumption_rework_hours_per_artifact: env_or(
                "TANDEM_ASSUMPTION_REWORK_HOURS",
                "assumption_rework_hours_per_artifact",
                defaults.assumption_rework_hours_per_artifact,
            )?,
            duplicate_edge_policy: match std::env::var("TANDEM_DUPLICATE_EDGE_POLICY") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.duplicate_edge_policy,
            },
            max_parallel_streams: env_or(
                "TANDEM_MAX_PARALLEL_STREAMS",
                "max_parallel_streams",
                defaults.max_parallel_streams,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - hour rates are finite and non-negative
    /// - max_parallel_streams > 0
    pub fn validate(&self) -> TandemResult<()> {
        check_rate("rework_hours_per_consumer", self.rework_hours_per_consumer)?;
        check_rate(
            "assumption_rework_hours_per_artifact",
            self.assumption_rework_hours_per_artifact,
        )?;

        if self.max_parallel_streams == 0 {
            return Err(TandemError::Config(ConfigError::InvalidValue {
                field: "max_parallel_streams".to_string(),
                value: self.max_parallel_streams.to_string(),
                reason: "max_parallel_streams must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}

fn check_rate(field: &str, value: f64) -> TandemResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TandemError::Config(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("{} must be finite and non-negative", field),
        }));
    }
    Ok(())
}

fn env_or<T: FromStr>(var: &str, field: &str, default: T) -> TandemResult<T> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            TandemError::Config(ConfigError::InvalidValue {
                field: field.to_string(),
                value: raw.clone(),
                reason: format!("could not parse {}", var),
            })
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TandemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rework_hours_per_consumer, 2.0);
        assert_eq!(config.assumption_rework_hours_per_artifact, 1.0);
        assert_eq!(config.duplicate_edge_policy, DuplicateEdgePolicy::ReturnExisting);
    }

    #[test]
    fn test_zero_parallel_streams_rejected() {
        let config = TandemConfig {
            max_parallel_streams: 0,
            ..Default::default()
        };
        match config.validate() {
            Err(TandemError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "max_parallel_streams")
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_edge_policy_parse() {
        assert_eq!(
            "reject".parse::<DuplicateEdgePolicy>().unwrap(),
            DuplicateEdgePolicy::Reject
        );
        assert_eq!(
            "Return-Existing".parse::<DuplicateEdgePolicy>().unwrap(),
            DuplicateEdgePolicy::ReturnExisting
        );
        assert!("sometimes".parse::<DuplicateEdgePolicy>().is_err());
    }
}
