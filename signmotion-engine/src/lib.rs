//! signmotion-engine: motion delivery for text-to-sign avatars
//!
//! Provides the runtime around `signmotion-core`:
//! - Translation requests against the backend REST API
//! - Streaming sessions with bounded reconnect
//! - Correlation of stream messages to the translation that caused them
//! - A conversation cache the UI reads from
//! - Real-time playback of motion sequences on a tokio interval

pub mod api;
pub mod cache;
pub mod config;
pub mod correlation;
pub mod error;
pub mod message;
pub mod player;
pub mod session;
pub mod stream_address;

pub use api::{
    HttpTranslationApi, MessageDetail, StaticToken, TokenProvider, TranslationApi,
    TranslationRequest, TranslationResponse,
};
pub use cache::{CacheEvent, Conversation, ConversationCache, MessageEntry};
pub use config::{ApiConfig, EngineConfig, PlaybackConfig, RetargetConfig, SessionConfig};
pub use correlation::{EngineEvent, TranslationEngine};
pub use error::EngineError;
pub use message::{CompletedEvent, FailedEvent, ProgressEvent, StreamMessage, TranslationStatus};
pub use player::{AnimationPlayer, PlayerEvent, SharedPoseSink, SharedRig};
pub use session::{Connection, Connector, Frame, SessionEvent, SessionManager, SessionState, TungsteniteConnector};
