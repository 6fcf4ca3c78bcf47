//! Contract version numbers

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic contract version.
///
/// Accepts `1`, `1.0`, `v2.1` and `1.2.3`; missing components are zero.
/// Ordering is lexicographic over (major, minor, patch). Displays as
/// `major.minor` when patch is zero, `major.minor.patch` otherwise, and
/// serializes as that display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ContractVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidVersion {
            value: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(invalid("version is empty"));
        }

        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid("at most three components are allowed"));
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("components must be non-negative integers"));
            }
            *slot = part
                .parse::<u32>()
                .map_err(|_| invalid("component out of range"))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl Default for ContractVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for ContractVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

impl FromStr for ContractVersion {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContractVersion {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContractVersion> for String {
    fn from(version: ContractVersion) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepted_forms() {
        assert_eq!(ContractVersion::parse("1").unwrap(), ContractVersion::new(1, 0, 0));
        assert_eq!(ContractVersion::parse("1.0").unwrap(), ContractVersion::new(1, 0, 0));
        assert_eq!(ContractVersion::parse("v2.1").unwrap(), ContractVersion::new(2, 1, 0));
        assert_eq!(ContractVersion::parse("1.2.3").unwrap(), ContractVersion::new(1, 2, 3));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "v", "1.x", "1..2", "1.2.3.4", "-1", "1.0-beta"] {
            assert!(
                matches!(
                    ContractVersion::parse(bad),
                    Err(ValidationError::InvalidVersion { .. })
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_display_drops_zero_patch() {
        assert_eq!(ContractVersion::new(2, 0, 0).to_string(), "2.0");
        assert_eq!(ContractVersion::new(1, 2, 3).to_string(), "1.2.3");
    }

    #[test]
    fn test_ordering_is_numeric_not_lexical() {
        let v1_10 = ContractVersion::parse("1.10").unwrap();
        let v1_9 = ContractVersion::parse("1.9").unwrap();
        assert!(v1_10 > v1_9);
        assert!(ContractVersion::parse("2.0").unwrap() > ContractVersion::parse("1.99.99").unwrap());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&ContractVersion::new(2, 1, 0)).unwrap();
        assert_eq!(json, "\"2.1\"");
        let back: ContractVersion = serde_json::from_str("\"v3\"").unwrap();
        assert_eq!(back, ContractVersion::new(3, 0, 0));
        assert!(serde_json::from_str::<ContractVersion>("\"nope\"").is_err());
    }
}
