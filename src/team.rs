//! Team name validation
//!
//! A team name is the tenant identity: lowercase alphanumerics and hyphens,
//! 1 to 16 characters. The backend workload and its network endpoint are
//! both named after it, so the constraint also keeps it a valid DNS label.

use std::fmt;

use crate::types::GatehouseError;

/// Maximum team name length
pub const MAX_TEAM_NAME_LEN: usize = 16;

/// Length of a join passcode
pub const PASSCODE_LEN: usize = 8;

/// A validated team name (`^[a-z0-9-]{1,16}$`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeamName(String);

impl TeamName {
    /// Parse and validate a team name.
    ///
    /// Rejection is a validation error, never a panic: team names arrive
    /// straight from request paths.
    pub fn parse(raw: &str) -> Result<Self, GatehouseError> {
        if raw.is_empty() || raw.len() > MAX_TEAM_NAME_LEN {
            return Err(GatehouseError::BadRequest(format!(
                "Team name must be 1-{} characters",
                MAX_TEAM_NAME_LEN
            )));
        }

        if !raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(GatehouseError::BadRequest(
                "Team name may only contain lowercase letters, digits, and hyphens".into(),
            ));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Internal resource name for the team's backend workload.
    pub fn resource_name(&self) -> String {
        format!("team-{}", self.0)
    }
}

impl fmt::Display for TeamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that a presented passcode has the expected shape
/// (8 uppercase alphanumeric characters) before it reaches the verifier.
pub fn is_valid_passcode_format(passcode: &str) -> bool {
    passcode.len() == PASSCODE_LEN
        && passcode
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_team_names() {
        for name in ["team42", "a", "my-team", "0", "abc-def-123", "sixteen-chars-ok"] {
            assert!(TeamName::parse(name).is_ok(), "expected valid: {}", name);
        }
    }

    #[test]
    fn test_invalid_team_names() {
        for name in [
            "",
            "Team42",
            "team_42",
            "team 42",
            "team.42",
            "seventeen-chars-x",
            "团队",
        ] {
            assert!(TeamName::parse(name).is_err(), "expected invalid: {}", name);
        }
    }

    #[test]
    fn test_resource_name() {
        let team = TeamName::parse("team42").unwrap();
        assert_eq!(team.resource_name(), "team-team42");
    }

    #[test]
    fn test_passcode_format() {
        assert!(is_valid_passcode_format("ABCD1234"));
        assert!(is_valid_passcode_format("ZZZZZZZZ"));
        assert!(is_valid_passcode_format("00000000"));

        assert!(!is_valid_passcode_format("abcd1234")); // lowercase
        assert!(!is_valid_passcode_format("ABCD123")); // too short
        assert!(!is_valid_passcode_format("ABCD12345")); // too long
        assert!(!is_valid_passcode_format("ABCD-123")); // punctuation
        assert!(!is_valid_passcode_format(""));
    }
}
