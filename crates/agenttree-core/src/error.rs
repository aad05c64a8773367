//! Error taxonomy shared by every AgentTree crate (spec §7).

use thiserror::Error;

/// The seven error kinds the workflow engine, hook executor, and agent
/// lifecycle manager distinguish between. Each kind carries its own
/// recovery contract — see the variant docs.
#[derive(Error, Debug)]
pub enum Error {
    /// A hook's precondition was unmet (empty section, unchecked item, no
    /// commits, ...). Recovered locally: the transition aborts and every
    /// failing hook's reason is surfaced together.
    #[error("validation failed: {}", .reasons.join("; "))]
    Validation { reasons: Vec<String> },

    /// A hook asked the workflow engine to retry against a different
    /// target stage (e.g. a rebase conflict redirects to `debug`).
    #[error("redirected to {to}: {reason}")]
    Redirect { to: String, reason: String },

    /// Issue, session, PR, or runtime not found. Not retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// An agent is already running for this `(issue, role)` pair.
    #[error("agent already running for issue {issue_id} role {role}")]
    AlreadyRunning { issue_id: String, role: String },

    /// The host environment is unfit (no git, no runtime, no `gh` auth).
    #[error("preflight check failed: {0}")]
    PreflightError(String),

    /// A network or subprocess timeout that the system should treat as a
    /// warning and continue past (sync loop, `gh` polling).
    #[error("transient failure: {0}")]
    Transient(String),

    /// Corrupted YAML, a missing template, git in a broken state — not
    /// recoverable by retrying the same operation.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reasons: vec![reason.into()] }
    }

    pub fn validation_many(reasons: Vec<String>) -> Self {
        Self::Validation { reasons }
    }

    pub fn redirect(to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Redirect { to: to.into(), reason: reason.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_running(issue_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self::AlreadyRunning { issue_id: issue_id.into(), role: role.into() }
    }

    /// Process exit code for CLI callers (spec §7 propagation table).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation { .. } => 10,
            Error::Redirect { .. } => 11,
            Error::NotFound(_) => 20,
            Error::AlreadyRunning { .. } => 21,
            Error::PreflightError(_) => 30,
            Error::Transient(_) => 40,
            Error::Fatal(_) | Error::Io(_) | Error::Yaml(_) => 1,
        }
    }

    /// HTTP status an out-of-scope adapter would map this to (spec §7).
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation { .. } | Error::PreflightError(_) => 400,
            Error::Redirect { .. } => 409,
            Error::NotFound(_) => 404,
            Error::AlreadyRunning { .. } => 409,
            Error::Transient(_) => 503,
            Error::Fatal(_) | Error::Io(_) | Error::Yaml(_) => 500,
        }
    }
}
