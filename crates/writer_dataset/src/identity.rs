//! Writer identity extraction from filename conventions.

use crate::types::{DatasetError, DatasetResult};
use serde::{Deserialize, Serialize};

/// Dataset whose filenames separate the writer id with `_` instead of `-`.
pub const UNDERSCORE_DATASET: &str = "CERUG-EN";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDelimiter {
    /// A filename without the delimiter is an error.
    #[default]
    Reject,
    /// Use the whole filename as the identity.
    WholeName,
}

/// Filename convention mapping `<identity><delimiter><rest>` to `<identity>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRule {
    pub delimiter: char,
    #[serde(default)]
    pub on_missing: MissingDelimiter,
}

impl Default for IdentityRule {
    fn default() -> Self {
        Self {
            delimiter: '-',
            on_missing: MissingDelimiter::Reject,
        }
    }
}

impl IdentityRule {
    pub fn for_dataset(dataset: &str) -> Self {
        let delimiter = if dataset == UNDERSCORE_DATASET { '_' } else { '-' };
        Self {
            delimiter,
            ..Self::default()
        }
    }

    pub fn with_missing(mut self, on_missing: MissingDelimiter) -> Self {
        self.on_missing = on_missing;
        self
    }

    /// Identity is the text before the first delimiter, taken verbatim.
    pub fn extract(&self, filename: &str) -> DatasetResult<String> {
        let identity = match filename.split_once(self.delimiter) {
            Some((head, _)) => head,
            None => match self.on_missing {
                MissingDelimiter::Reject => {
                    return Err(DatasetError::Identity {
                        filename: filename.to_string(),
                        msg: format!("delimiter {:?} not found", self.delimiter),
                    })
                }
                MissingDelimiter::WholeName => filename,
            },
        };
        validate_identity(filename, identity)?;
        Ok(identity.to_string())
    }
}

fn validate_identity(filename: &str, identity: &str) -> DatasetResult<()> {
    if identity.is_empty() {
        return Err(DatasetError::Identity {
            filename: filename.to_string(),
            msg: "identity is empty".to_string(),
        });
    }
    if identity
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\')
    {
        return Err(DatasetError::Identity {
            filename: filename.to_string(),
            msg: format!("identity {identity:?} contains whitespace or a path separator"),
        });
    }
    Ok(())
}
