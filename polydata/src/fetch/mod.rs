//! Blocking network transfer and archive expansion.
//!
//! Both stages are split into small steps so the download stream can turn
//! each step into progress events without threads or callbacks:
//!
//! | Stage | Item progress |
//! |---|---|
//! | [`Transfer`] | 5 to 80 |
//! | [`Expansion`] | 80 to 100 |

mod transfer;
mod unpack;

use std::fmt;
use std::str::FromStr;

pub use transfer::{
    expected_blocks, transfer_progress, Transfer, TransferStep, CHUNK_SIZE, TRANSFER_END,
    TRANSFER_START,
};
pub use unpack::{unpack_progress, Expansion, UnpackStep, UNPACK_END, UNPACK_START};

#[cfg(test)]
pub(crate) use unpack::tests::build_zip;

/// When a downloaded archive is expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnpackPolicy {
    /// Expand every archive after download.
    #[default]
    Always,
    /// Expand only when an expanded copy already exists from an earlier install.
    IfPreviouslyExpanded,
}

impl UnpackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::IfPreviouslyExpanded => "existing",
        }
    }
}

impl fmt::Display for UnpackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnpackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always" | "true" | "yes" => Ok(Self::Always),
            "existing" | "if-expanded" | "false" | "no" => Ok(Self::IfPreviouslyExpanded),
            other => Err(format!(
                "unknown unpack policy '{}' (expected 'always' or 'existing')",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_policy_parsing() {
        assert_eq!("always".parse::<UnpackPolicy>(), Ok(UnpackPolicy::Always));
        assert_eq!(
            "Existing".parse::<UnpackPolicy>(),
            Ok(UnpackPolicy::IfPreviouslyExpanded)
        );
        assert_eq!("no".parse::<UnpackPolicy>(), Ok(UnpackPolicy::IfPreviouslyExpanded));
        assert!("sometimes".parse::<UnpackPolicy>().is_err());
        assert_eq!(UnpackPolicy::default().to_string(), "always");
    }
}
