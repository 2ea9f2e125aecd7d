use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid identifier '{0}': expected an 8-digit job id, a task index, or None")]
    InvalidIdentifier(String),

    #[error("{phase}: vector has {found} entries but the phase declares {expected} tasks")]
    LengthMismatch {
        phase: String,
        expected: usize,
        found: usize,
    },

    #[error("{phase}: task index {index} is outside 0..{expected}")]
    TaskIndexOutOfRange {
        phase: String,
        index: usize,
        expected: usize,
    },

    #[error("{phase}: asked to resubmit {requested} tasks but only {expected} exist")]
    TooManyTasks {
        phase: String,
        requested: usize,
        expected: usize,
    },

    #[error("{phase}: task {index} is both trusted as job {job} and listed for resubmission")]
    ConflictingRestart {
        phase: String,
        index: usize,
        job: String,
    },

    #[error("Missing required upstream artifact: {0}")]
    MissingUpstream(String),

    #[error("{phase}: upstream phase reported failed submissions")]
    UpstreamFailed { phase: String },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Submission failed: {0}")]
    Submission(String),
}

impl Error {
    /// Whether this error must abort the whole run.
    ///
    /// Only per-task submission failures are recoverable; the phase
    /// controller records them in the task's slot and keeps going.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Submission(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
