//! Scheduler job identifiers and restart-spec parsing.
//!
//! A restart spec arrives as text from the operator (or from the job ledger)
//! and is tagged here, once, by numeric width: exactly 8 digits is a real
//! scheduler job id, 1 to 7 digits is a task index to resubmit, and an
//! explicit placeholder means "not required". Nothing downstream inspects
//! string lengths again.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Width of a scheduler job id.
pub const JOB_ID_WIDTH: usize = 8;

/// Accepted spellings of the "not required" placeholder.
const NOT_REQUIRED_TOKENS: &[&str] = &["none", "na", "null", "-", ""];

/// A scheduler-assigned job id (always 8 ASCII digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a job id.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() == JOB_ID_WIDTH && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidIdentifier(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// One entry of a restart spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Already submitted; treat the task as satisfied.
    SchedulerId(JobId),
    /// 0-based task index to resubmit.
    TaskIndex(usize),
    /// Nothing to do for this slot.
    NotRequired,
}

impl Identifier {
    /// Tag one raw token.
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim();
        if NOT_REQUIRED_TOKENS.contains(&token.to_lowercase().as_str()) {
            return Ok(Identifier::NotRequired);
        }
        if !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidIdentifier(token.to_string()));
        }
        match token.len() {
            JOB_ID_WIDTH => Ok(Identifier::SchedulerId(JobId::parse(token)?)),
            1..JOB_ID_WIDTH => token
                .parse::<usize>()
                .map(Identifier::TaskIndex)
                .map_err(|_| Error::InvalidIdentifier(token.to_string())),
            _ => Err(Error::InvalidIdentifier(token.to_string())),
        }
    }

    pub fn is_not_required(&self) -> bool {
        matches!(self, Identifier::NotRequired)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::SchedulerId(id) => write!(f, "{}", id),
            Identifier::TaskIndex(i) => write!(f, "{}", i),
            Identifier::NotRequired => write!(f, "None"),
        }
    }
}

/// Serialized the way operators type it, so `status --json` output can be
/// pasted into `--restart`.
impl Serialize for Identifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl std::str::FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a comma- or whitespace-separated restart spec, e.g. `12345678,1,None`.
///
/// Surrounding brackets and quotes are tolerated so vectors can be pasted
/// back from log output.
pub fn parse_restart_spec(raw: &str) -> Result<Vec<Identifier>> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if trimmed.trim().is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| Identifier::parse(t.trim_matches(|c| c == '"' || c == '\'')))
        .collect()
}

/// Render a restart spec the way operators type it.
pub fn format_restart_spec(spec: &[Identifier]) -> String {
    spec.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
