//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration load error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Figment(Box::new(err))
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
