use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DppError {
    #[error("malformed deployment spec: {0}")]
    MalformedSpec(String),

    #[error("cannot read deployment spec {}: {source}", path.display())]
    SpecRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown artifact repository format '{0}'")]
    UnknownFormat(String),

    #[error("no structured output: {0}")]
    NoStructuredOutput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, DppError>;
