//! Operator actions and their results.

use crate::error::ActionFailure;
use calibre_library_provisioner::inspect::LibraryInfoFormat;
use std::collections::BTreeMap;

/// Name of the action that (re)writes the library.
pub const LIBRARY_WRITE_ACTION: &str = "library-write";

/// Name of the action that renders the library contents.
pub const LIBRARY_INFO_ACTION: &str = "library-info";

/// Parameter of [`LIBRARY_INFO_ACTION`] selecting the rendering.
pub const LIBRARY_INFO_FORMAT_PARAM: &str = "format";

/// Key/value results handed back to the operator.
pub type ActionResults = BTreeMap<String, String>;

/// Result of running an action.
pub type ActionResult = Result<ActionResults, ActionFailure>;

/// An operator-invoked action with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Provision the library under the configured policy.
    LibraryWrite,
    /// Render the library contents.
    LibraryInfo {
        /// Requested rendering, validated when the action runs.
        format: String,
    },
}

impl Action {
    /// Returns the action name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LibraryWrite => LIBRARY_WRITE_ACTION,
            Self::LibraryInfo { .. } => LIBRARY_INFO_ACTION,
        }
    }
}

/// The result text reported in place of a listing that did not fit in the
/// capture buffer.
///
/// # Examples
///
/// ```
/// use calibre_web_charm::action::too_large_message;
/// use calibre_library_provisioner::inspect::LibraryInfoFormat;
///
/// assert_eq!(
///     too_large_message(LibraryInfoFormat::Tree),
///     "library size too large, try ls-1"
/// );
/// ```
#[must_use]
pub const fn too_large_message(format: LibraryInfoFormat) -> &'static str {
    match format {
        LibraryInfoFormat::Tree => "library size too large, try ls-1",
        LibraryInfoFormat::Ls1 => "library size too large, sorry!",
    }
}

/// The failure message for an unsupported `format` parameter.
#[must_use]
pub fn invalid_format_message(value: &str) -> String {
    format!(
        "Invalid value {value} for {LIBRARY_INFO_FORMAT_PARAM} parameter of \
         {LIBRARY_INFO_ACTION} action."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_message_names_the_parameter() {
        assert_eq!(
            invalid_format_message("xml"),
            "Invalid value xml for format parameter of library-info action."
        );
    }

    #[test]
    fn ls_sentinel_differs_from_tree() {
        assert_eq!(
            too_large_message(LibraryInfoFormat::Ls1),
            "library size too large, sorry!"
        );
    }
}
