//! Exclude pattern matching.
//!
//! A narrow glob subset: `*` matches within one path segment, `**` matches
//! anything including separators, everything else is literal. Patterns are
//! anchored and must match the whole path.

use regex::Regex;

use quillvault_common::{Error, Result};

/// A compiled set of exclude patterns.
#[derive(Debug, Default)]
pub struct ExcludePatterns {
    patterns: Vec<Compiled>,
}

#[derive(Debug)]
struct Compiled {
    source: String,
    regex: Regex,
}

impl ExcludePatterns {
    /// Compile a list of patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let source = pattern.as_ref();
            let regex = Regex::new(&translate(source)).map_err(|e| {
                Error::InvalidInput(format!("bad exclude pattern {source:?}: {e}"))
            })?;
            compiled.push(Compiled {
                source: source.to_string(),
                regex,
            });
        }
        Ok(Self { patterns: compiled })
    }

    /// An empty set that excludes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a path matches any pattern.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(path))
    }

    /// The original pattern strings.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.source.as_str())
    }
}

/// Translate a glob pattern into an anchored regex.
fn translate(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                out.push_str(".*");
            } else {
                out.push_str("[^/]*");
            }
        } else {
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    out.push('$');
    out
}
