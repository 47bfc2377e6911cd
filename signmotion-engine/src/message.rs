//! Inbound stream messages and translation status.

use crate::error::EngineError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use signmotion_core::{MotionPayload, MotionSequence};
use tracing::warn;

/// Lifecycle of a translation as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    #[default]
    Idle,
    Sending,
    Processing,
    Completed,
    Failed,
}

impl TranslationStatus {
    /// Map a backend status string. Unknown and in-progress values
    /// (`pending`, `processing`, ...) are treated as processing.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "completed" => TranslationStatus::Completed,
            "error" | "failed" => TranslationStatus::Failed,
            "sending" => TranslationStatus::Sending,
            "idle" => TranslationStatus::Idle,
            _ => TranslationStatus::Processing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TranslationStatus::Completed | TranslationStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TranslationStatus::Idle => "idle",
            TranslationStatus::Sending => "sending",
            TranslationStatus::Processing => "processing",
            TranslationStatus::Completed => "completed",
            TranslationStatus::Failed => "error",
        }
    }
}

impl std::fmt::Display for TranslationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `text_to_sign_completed`: final translation with motion data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletedEvent {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub translation_id: Option<String>,
    pub text_input: Option<String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub conversation_message_id: Option<String>,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
    pub message: Option<String>,
    pub translation: Option<String>,
    pub pose_count: Option<u64>,
    pub glosses: Vec<String>,
    pub gloss_description: Option<String>,
    #[serde(deserialize_with = "lenient_motion")]
    pub motion_sequence: Option<MotionPayload>,
}

impl CompletedEvent {
    pub fn completed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.completed_at.as_deref().and_then(parse_timestamp)
    }

    /// Motion data, if the event carried a non-empty sequence.
    pub fn motion(&self) -> Option<&MotionSequence> {
        self.motion_sequence
            .as_ref()
            .map(|payload| &payload.sequence)
            .filter(|sequence| !sequence.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailedEvent {
    pub conversation_id: Option<String>,
    pub conversation_message_id: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressEvent {
    pub status: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub conversation_id: Option<String>,
    pub conversation_message_id: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub translation: Option<String>,
}

/// A decoded inbound stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Completed(CompletedEvent),
    Failed(FailedEvent),
    Progress(ProgressEvent),
}

impl StreamMessage {
    /// Classify and decode a raw message. `type: text_to_sign_completed` or
    /// `status: completed` is a completion, `status: error` a failure, and
    /// anything else progress.
    pub fn decode(value: &serde_json::Value) -> Result<Self, EngineError> {
        if !value.is_object() {
            return Err(EngineError::Stream(format!("Expected a JSON object, got {}", value)));
        }

        let kind = value.get("type").and_then(|v| v.as_str());
        let status = value.get("status").and_then(|v| v.as_str());

        let message = if kind == Some("text_to_sign_completed") || status == Some("completed") {
            StreamMessage::Completed(CompletedEvent::deserialize(value)?)
        } else if matches!(status, Some("error") | Some("failed")) {
            StreamMessage::Failed(FailedEvent::deserialize(value)?)
        } else {
            StreamMessage::Progress(ProgressEvent::deserialize(value)?)
        };
        Ok(message)
    }

    pub fn status(&self) -> TranslationStatus {
        match self {
            StreamMessage::Completed(_) => TranslationStatus::Completed,
            StreamMessage::Failed(_) => TranslationStatus::Failed,
            StreamMessage::Progress(event) => event
                .status
                .as_deref()
                .map(TranslationStatus::from_wire)
                .unwrap_or(TranslationStatus::Processing),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Completed(_) | StreamMessage::Failed(_))
    }

    /// Preview text: `message`, then `translation`.
    pub fn preview(&self) -> Option<&str> {
        let (message, translation) = match self {
            StreamMessage::Completed(e) => (e.message.as_deref(), e.translation.as_deref()),
            StreamMessage::Failed(e) => (e.message.as_deref(), None),
            StreamMessage::Progress(e) => (e.message.as_deref(), e.translation.as_deref()),
        };
        message.filter(|s| !s.is_empty()).or(translation.filter(|s| !s.is_empty()))
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            StreamMessage::Completed(e) => e.conversation_message_id.as_deref(),
            StreamMessage::Failed(e) => e.conversation_message_id.as_deref(),
            StreamMessage::Progress(e) => e.conversation_message_id.as_deref(),
        }
    }
}

/// Parse RFC 3339 timestamps, and naive ISO 8601 ones as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A malformed motion payload is dropped instead of failing the whole
/// message, so the terminal status still lands.
pub(crate) fn lenient_motion<'de, D>(deserializer: D) -> Result<Option<MotionPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match MotionSequence::from_value(value) {
        Ok(sequence) => Some(MotionPayload { sequence }),
        Err(e) => {
            warn!("Dropping malformed motion sequence: {}", e);
            None
        }
    }))
}
