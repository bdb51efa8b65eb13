use thiserror::Error;

use crate::executor::input::DispatchError;

#[derive(Debug, Error)]
pub enum DroidLensError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    #[error("Malformed element: {0}")]
    MalformedElement(String),

    #[error("Malformed bounds: {0}")]
    MalformedBounds(String),

    #[error("Bounds rejected: {0}")]
    BoundsRejected(String),

    #[error("No input dispatcher attached to this hierarchy")]
    Detached,

    #[error("No element matches {0}")]
    NotFound(String),

    /// Failure reported by a device collaborator, passed through untouched.
    #[error(transparent)]
    Collaborator(DispatchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type DroidLensResult<T> = Result<T, DroidLensError>;
