//! Translation backend client

use crate::config::ApiConfig;
use crate::error::EngineError;
use crate::message::{lenient_motion, CompletedEvent, TranslationStatus};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use signmotion_core::{MotionPayload, MotionSequence};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Supplies the bearer token. Refresh happens outside the engine.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub conversation_id: String,
    pub conversation_message_id: String,
    /// Stream address as reported by the backend
    #[serde(default)]
    pub websocket: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl TranslationResponse {
    pub fn translation_status(&self) -> TranslationStatus {
        self.status
            .as_deref()
            .map(TranslationStatus::from_wire)
            .unwrap_or(TranslationStatus::Processing)
    }
}

/// Stored translation result for one message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageDetail {
    #[serde(alias = "id")]
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub status: Option<String>,
    pub input_preview: Option<String>,
    pub output_preview: Option<String>,
    pub text_input: Option<String>,
    pub translation_id: Option<String>,
    pub glosses: Vec<String>,
    pub gloss_description: Option<String>,
    #[serde(deserialize_with = "lenient_motion")]
    pub motion_sequence: Option<MotionPayload>,
    pub pose_count: Option<u64>,
    pub processing_time: Option<f64>,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
}

impl MessageDetail {
    /// Detail seeded from a completion event, so playback need not wait for
    /// a fetch.
    pub fn from_completed(message_id: &str, conversation_id: &str, event: &CompletedEvent) -> Self {
        Self {
            message_id: message_id.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            status: Some(TranslationStatus::Completed.as_str().to_string()),
            input_preview: event.text_input.clone(),
            output_preview: event.message.clone().or_else(|| event.translation.clone()),
            text_input: event.text_input.clone(),
            translation_id: event.translation_id.clone(),
            glosses: event.glosses.clone(),
            gloss_description: event.gloss_description.clone(),
            motion_sequence: event.motion_sequence.clone(),
            pose_count: event.pose_count,
            processing_time: None,
            created_at: event.created_at.clone(),
            completed_at: event.completed_at.clone(),
        }
    }

    pub fn motion(&self) -> Option<&MotionSequence> {
        self.motion_sequence
            .as_ref()
            .map(|payload| &payload.sequence)
            .filter(|sequence| !sequence.is_empty())
    }
}

/// Backend operations the engine depends on.
#[async_trait]
pub trait TranslationApi: Send + Sync {
    async fn request_translation(&self, request: &TranslationRequest) -> Result<TranslationResponse, EngineError>;
    async fn fetch_message_details(&self, message_id: &str) -> Result<MessageDetail, EngineError>;
}

/// REST client over `reqwest`.
pub struct HttpTranslationApi {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

const MAX_ERROR_TEXT_SIZE: usize = 10_000;

impl HttpTranslationApi {
    pub fn new(config: &ApiConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, EngineError> {
        url::Url::parse(&config.base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| EngineError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, EngineError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Api(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let end = bytes.len().min(MAX_ERROR_TEXT_SIZE);
            let error_text = String::from_utf8_lossy(&bytes[..end]);
            return Err(EngineError::Api(format!(
                "API Error: {} {}",
                status,
                error_text.trim()
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::Api(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl TranslationApi for HttpTranslationApi {
    async fn request_translation(&self, request: &TranslationRequest) -> Result<TranslationResponse, EngineError> {
        let url = format!("{}/text-to-sign/", self.base_url);
        debug!("Requesting translation ({} chars)", request.text.chars().count());

        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::Api(format!("Failed to request translation: {}", e)))?;

        let response: TranslationResponse = Self::read_json(response).await?;
        info!(
            "Translation accepted: conversation {} message {}",
            response.conversation_id, response.conversation_message_id
        );
        Ok(response)
    }

    async fn fetch_message_details(&self, message_id: &str) -> Result<MessageDetail, EngineError> {
        if message_id.is_empty() {
            return Err(EngineError::Api("Message id cannot be empty".to_string()));
        }

        let encoded = utf8_percent_encode(message_id, NON_ALPHANUMERIC).to_string();
        let url = format!("{}/conversations/messages/{}/details", self.base_url, encoded);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| EngineError::Api(format!("Failed to fetch message details: {}", e)))?;

        let mut detail: MessageDetail = Self::read_json(response).await?;
        if detail.message_id.is_empty() {
            detail.message_id = message_id.to_string();
        }
        Ok(detail)
    }
}
