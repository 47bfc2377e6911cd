use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Solve error: {0}")]
    Solve(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
