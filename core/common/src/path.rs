//! Validated vault-relative paths.
//!
//! Every path that crosses the wire or touches the object store goes through
//! [`SyncPath::parse`]. The constraints are the same on both sides: relative,
//! forward-slash separated, no traversal, and nothing under the reserved
//! internal prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::manifest::RESERVED_PREFIX;

/// A vault-relative forward-slash path (e.g. `notes/2024/plan.md`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncPath(String);

impl SyncPath {
    /// Parse and validate a raw path string.
    ///
    /// # Errors
    /// - empty path
    /// - leading `/` or `\`
    /// - any `..` segment (traversal)
    /// - path under the reserved internal prefix
    pub fn parse(raw: &str) -> Result<Self> {
        validate(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the path names a Markdown file.
    pub fn is_markdown(&self) -> bool {
        self.0.ends_with(".md")
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SyncPath {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<SyncPath> for String {
    fn from(path: SyncPath) -> Self {
        path.0
    }
}

/// Validate a raw path against the vault path constraints.
pub fn validate(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(Error::InvalidPath("path is empty".to_string()));
    }
    if raw.starts_with('/') || raw.starts_with('\\') {
        return Err(Error::InvalidPath(format!(
            "path must be relative: {raw}"
        )));
    }
    if raw.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(Error::InvalidPath(format!(
            "path traversal not allowed: {raw}"
        )));
    }
    let reserved = RESERVED_PREFIX.trim_end_matches('/');
    if raw == reserved || raw.starts_with(RESERVED_PREFIX) {
        return Err(Error::InvalidPath(format!(
            "path addresses the reserved internal prefix: {raw}"
        )));
    }
    Ok(())
}
