//! The provisioning policy applied when the library directory is not empty.

use crate::error::ConfigurationError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Behaviour when the target directory already has entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningPolicy {
    /// Leave existing contents untouched and stop.
    Skip,
    /// Remove every existing entry, then provision.
    Clean,
}

impl ProvisioningPolicy {
    /// Every accepted policy, in documentation order.
    pub const ALL: [Self; 2] = [Self::Skip, Self::Clean];

    /// Returns the configuration spelling of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Clean => "clean",
        }
    }
}

impl fmt::Display for ProvisioningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningPolicy {
    type Err = ConfigurationError;

    /// Parses a configured value. Matching is exact: surrounding whitespace
    /// or a different case is rejected rather than coerced.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibre_library_provisioner::policy::ProvisioningPolicy;
    ///
    /// assert_eq!("clean".parse::<ProvisioningPolicy>().ok(), Some(ProvisioningPolicy::Clean));
    /// assert!("Clean".parse::<ProvisioningPolicy>().is_err());
    /// ```
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == value)
            .ok_or_else(|| ConfigurationError::InvalidPolicy {
                value: value.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::skip("skip", ProvisioningPolicy::Skip)]
    #[case::clean("clean", ProvisioningPolicy::Clean)]
    fn parses_known_values(#[case] raw: &str, #[case] expected: ProvisioningPolicy) {
        assert_eq!(raw.parse::<ProvisioningPolicy>().ok(), Some(expected));
    }

    #[rstest]
    #[case::unknown("bad-value")]
    #[case::empty("")]
    #[case::uppercase("SKIP")]
    #[case::padded(" clean ")]
    fn rejects_anything_else(#[case] raw: &str) {
        let err = raw
            .parse::<ProvisioningPolicy>()
            .expect_err("value should be rejected");
        assert!(matches!(err, ConfigurationError::InvalidPolicy { value } if value == raw));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for policy in ProvisioningPolicy::ALL {
            assert_eq!(policy.to_string().parse::<ProvisioningPolicy>().ok(), Some(policy));
        }
    }
}
