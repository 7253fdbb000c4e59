//! Error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("syntax error at position {position}: {message} (near '{fragment}')")]
    Syntax {
        position: usize,
        fragment: String,
        message: String,
    },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("ambiguous model name '{name}': can match to {}", candidates.join(", "))]
    AmbiguousName { name: String, candidates: Vec<String> },

    #[error("unknown relation '{relation}' for model {model}")]
    UnknownRelation { model: String, relation: String },

    #[error("relation '{relation}' is not allowed for model {model}")]
    RelationNotAllowed { model: String, relation: String },

    #[error("type mismatch: expecting {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("relation provider error: {0}")]
    Provider(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Errors raised while checking a query against the catalog, before any
    /// provider call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnknownModel(_)
                | Error::AmbiguousName { .. }
                | Error::UnknownRelation { .. }
                | Error::RelationNotAllowed { .. }
                | Error::InvalidQuery(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
