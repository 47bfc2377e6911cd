//! Error types for signmotion-engine

use signmotion_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("WebSocket is not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Network(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EngineError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        EngineError::Stream(err.to_string())
    }
}
