use std::path::PathBuf;
use std::time::Duration;

use crate::model::Language;
use crate::rules::RuleKind;
use crate::workfile::WorkingFileKind;

/// The engine rejected a snippet or a rule set, or could not finish a run.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Syntax, typing or runtime diagnostic reported by the engine.
    #[error("{0}")]
    Diagnostic(String),

    #[error("invalid {kind} rules: {reason}")]
    InvalidRules { kind: RuleKind, reason: String },

    #[error("engine invoked without {0} rules configured")]
    NotConfigured(RuleKind),

    #[error("execution timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// A non-interactive run asked for more input than was supplied.
    #[error("no input left for prompt {prompt:?}")]
    MissingInput { prompt: String },

    #[error("engine failure: {0}")]
    Engine(String),
}

/// Failures talking to the Asset Store, Rule Store, Snippet Manager or queue store.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Error: status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("queue store failure: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to create {kind} working file in {}: {source}", dir.display())]
    Create {
        kind: WorkingFileKind,
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize {kind} rules: {source}")]
    Serialize {
        kind: RuleKind,
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed authorization header")]
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Language {0} not implemented")]
    UnsupportedLanguage(Language),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
