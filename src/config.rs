//! Charm configuration.
//!
//! The charm has a single option, `library-write`, read from a TOML file:
//!
//! ```toml
//! library-write = "clean"
//! ```
//!
//! The value is kept as written and validated every time it is read, so an
//! invalid setting keeps the unit blocked until the operator corrects it.

use crate::error::{CharmError, Result};
use calibre_library_provisioner::error::ConfigurationError;
use calibre_library_provisioner::policy::ProvisioningPolicy;
use camino::Utf8Path;
use log::debug;
use serde::Deserialize;

/// Name of the library write option.
pub const LIBRARY_WRITE_CONFIG: &str = "library-write";

/// Charm options.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CharmConfig {
    /// What provisioning does when the library already has content.
    #[serde(rename = "library-write")]
    pub library_write: String,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            library_write: ProvisioningPolicy::Skip.as_str().to_owned(),
        }
    }
}

impl CharmConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed TOML or unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibre_web_charm::config::CharmConfig;
    ///
    /// let config = CharmConfig::from_toml_str("library-write = \"clean\"")?;
    /// assert_eq!(config.library_write, "clean");
    /// # Ok::<(), toml::de::Error>(())
    /// ```
    pub fn from_toml_str(source: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CharmError::ConfigRead`] if the file cannot be read and
    /// [`CharmError::ConfigParse`] if it is not valid.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{path} not found; using default configuration");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(CharmError::ConfigRead {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        Self::from_toml_str(&source).map_err(|source| CharmError::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    /// Validates and returns the configured provisioning policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidPolicy`] for any value other
    /// than `skip` or `clean`.
    pub fn library_write_behaviour(
        &self,
    ) -> std::result::Result<ProvisioningPolicy, ConfigurationError> {
        self.library_write.parse()
    }
}
