//! Output existence checks.
//!
//! Patterns are shell-style globs over file names (`*` and `?`, everything
//! else literal), so sharded names such as
//! `HG002.region1.labeled.tfrecords-?????-of-00016.gz` match exactly.

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Serialize;

use crate::{tlog_trace, tlog_warn, Result};

/// How much of an expected output set is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Partial,
    Missing,
}

impl std::fmt::Display for Completeness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completeness::Complete => write!(f, "complete"),
            Completeness::Partial => write!(f, "partial"),
            Completeness::Missing => write!(f, "missing"),
        }
    }
}

/// Result of one existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// At least one matching entry was found.
    pub exists: bool,
    pub found: usize,
    pub expected: usize,
    /// Matching file names, sorted.
    pub matched: Vec<String>,
}

impl CheckResult {
    pub fn missing(&self) -> bool {
        self.found < self.expected
    }

    pub fn completeness(&self) -> Completeness {
        if !self.missing() {
            Completeness::Complete
        } else if self.found > 0 {
            Completeness::Partial
        } else {
            Completeness::Missing
        }
    }
}

/// Compile a file-name glob into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}

/// Counts artifacts matching a naming pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputChecker;

impl OutputChecker {
    pub fn new() -> Self {
        Self
    }

    /// Count entries directly under `location` whose name matches `pattern`.
    ///
    /// A missing `location` is not an error: it simply means nothing exists
    /// yet. Finding more than `expected` matches is logged as a hint of
    /// duplicate outputs and otherwise ignored.
    pub fn check(&self, pattern: &str, location: &Path, expected: usize) -> Result<CheckResult> {
        if !location.is_dir() {
            tlog_trace!("OutputChecker: {} absent", location.display());
            return Ok(CheckResult {
                exists: false,
                found: 0,
                expected,
                matched: Vec::new(),
            });
        }

        let matched = self.matching(pattern, location)?;
        let found = matched.len();
        if found > expected {
            tlog_warn!(
                "found {} files matching '{}' in {} but expected {}; possible duplicate outputs",
                found,
                pattern,
                location.display(),
                expected
            );
        }
        tlog_trace!(
            "OutputChecker: '{}' in {} found={} expected={}",
            pattern,
            location.display(),
            found,
            expected
        );

        Ok(CheckResult {
            exists: found > 0,
            found,
            expected,
            matched,
        })
    }

    /// Number of entries matching `pattern`, for inputs with no fixed count.
    pub fn count(&self, pattern: &str, location: &Path) -> Result<usize> {
        if !location.is_dir() {
            return Ok(0);
        }
        Ok(self.matching(pattern, location)?.len())
    }

    fn matching(&self, pattern: &str, location: &Path) -> Result<Vec<String>> {
        let re = glob_to_regex(pattern)?;
        let mut matched = Vec::new();
        for entry in fs::read_dir(location)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if re.is_match(name) {
                    matched.push(name.to_string());
                }
            }
        }
        matched.sort();
        Ok(matched)
    }
}
