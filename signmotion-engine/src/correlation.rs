//! Translation correlation.
//!
//! [`TranslationEngine`] ties one translation request to the streaming
//! session that reports its progress. Each `translate` call starts a new
//! correlation generation with its own [`SessionManager`] and pump task;
//! anything still arriving for an older generation is discarded.

use crate::api::{
    HttpTranslationApi, MessageDetail, StaticToken, TokenProvider, TranslationApi,
    TranslationRequest, TranslationResponse,
};
use crate::cache::{ConversationCache, MessageEntry};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::message::{StreamMessage, TranslationStatus};
use crate::session::{Connector, SessionEvent, SessionManager, TungsteniteConnector, MAX_ATTEMPTS_REACHED};
use crate::stream_address;
use parking_lot::Mutex;
use signmotion_core::MotionSequence;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER_SIZE: usize = 256;

/// Events for UI consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StatusChanged(TranslationStatus),
    MessageUpdated {
        conversation_id: String,
        message_id: String,
        status: TranslationStatus,
    },
    /// Motion data arrived with a completion and is ready to play.
    MotionReady {
        message_id: String,
        frames: MotionSequence,
    },
    SessionError(String),
    Finished {
        message_id: String,
        status: TranslationStatus,
    },
}

#[derive(Default)]
struct Correlation {
    generation: u64,
    message_id: Option<String>,
    conversation_id: Option<String>,
    session_address: Option<String>,
    session: Option<SessionManager>,
    pump: Option<JoinHandle<()>>,
    pending: bool,
    status: TranslationStatus,
    last_message: Option<serde_json::Value>,
    session_error: Option<String>,
}

impl Correlation {
    /// Retire the current generation and hand back its session and pump.
    fn supersede(&mut self) -> (Option<SessionManager>, Option<JoinHandle<()>>) {
        self.generation += 1;
        self.message_id = None;
        self.session_address = None;
        (self.session.take(), self.pump.take())
    }
}

struct EngineShared {
    cache: ConversationCache,
    config: EngineConfig,
    inner: Mutex<Correlation>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineShared {
    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: TranslationStatus) {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.status != status;
            inner.status = status;
            changed
        };
        if changed {
            debug!("Translation status: {}", status);
            self.emit(EngineEvent::StatusChanged(status));
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }
}

/// Retire a session and its pump outside the correlation lock.
fn shut_down(session: Option<SessionManager>, pump: Option<JoinHandle<()>>) {
    if let Some(session) = session {
        session.disconnect();
    }
    if let Some(pump) = pump {
        pump.abort();
    }
}

pub struct TranslationEngine {
    api: Arc<dyn TranslationApi>,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn Connector>,
    shared: Arc<EngineShared>,
}

impl TranslationEngine {
    pub fn new(
        config: EngineConfig,
        api: Arc<dyn TranslationApi>,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            api,
            tokens,
            connector,
            shared: Arc::new(EngineShared {
                cache: ConversationCache::new(),
                config,
                inner: Mutex::new(Correlation::default()),
                events,
            }),
        }
    }

    /// Engine over the HTTP backend and a WebSocket stream.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        let tokens: Arc<dyn TokenProvider> = Arc::new(StaticToken(config.api.token.clone()));
        let api = Arc::new(HttpTranslationApi::new(&config.api, Arc::clone(&tokens))?);
        let connector = Arc::new(TungsteniteConnector::new(config.session.max_message_bytes));
        Ok(Self::new(config, api, tokens, connector))
    }

    /// Request a translation and start streaming its progress.
    ///
    /// Any earlier correlation is superseded: its session is closed and its
    /// late messages are ignored.
    pub async fn translate(
        &self,
        text: &str,
        conversation_id: Option<&str>,
    ) -> Result<TranslationResponse, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::Api("Text cannot be empty".to_string()));
        }

        // Retire the previous correlation before the request goes out.
        let (generation, retired_session, retired_pump) = {
            let mut inner = self.shared.inner.lock();
            let (session, pump) = inner.supersede();
            inner.pending = true;
            inner.session_error = None;
            inner.last_message = None;
            (inner.generation, session, pump)
        };
        shut_down(retired_session, retired_pump);
        self.shared.set_status(TranslationStatus::Sending);

        let request = TranslationRequest {
            text: text.to_string(),
            conversation_id: conversation_id.map(str::to_string),
        };
        let result = self.api.request_translation(&request).await;

        if !self.shared.is_current(generation) {
            debug!("Translation request superseded while in flight");
            return result;
        }

        let started = result.and_then(|response| self.start_correlation(text, &response).map(|_| response));

        match started {
            Ok(response) => {
                self.shared.set_status(response.translation_status());
                Ok(response)
            }
            Err(e) => {
                error!("Translation request failed: {}", e);
                {
                    let mut inner = self.shared.inner.lock();
                    inner.pending = false;
                    inner.conversation_id = None;
                }
                self.shared.set_status(TranslationStatus::Failed);
                Err(e)
            }
        }
    }

    fn start_correlation(&self, text: &str, response: &TranslationResponse) -> Result<(), EngineError> {
        let conversation_id = response.conversation_id.clone();
        let message_id = response.conversation_message_id.clone();

        let token = self.tokens.access_token();
        let address = response
            .websocket
            .as_deref()
            .map(|raw| stream_address::resolve(raw, &self.shared.config.api, token.as_deref()))
            .transpose()?;

        if self.shared.cache.message(&conversation_id, &message_id).is_none() {
            let mut entry = MessageEntry::new(&message_id, response.translation_status());
            entry.input_preview = Some(text.to_string());
            self.shared.cache.upsert_message(&conversation_id, entry);
        }

        let (retired_session, retired_pump) = {
            let mut inner = self.shared.inner.lock();
            let retired = inner.supersede();
            inner.message_id = Some(message_id.clone());
            inner.conversation_id = Some(conversation_id.clone());
            inner.session_address = address.clone();
            inner.pending = false;
            inner.last_message = None;

            if let Some(ref address) = address {
                let (session, events) =
                    SessionManager::new(Arc::clone(&self.connector), self.shared.config.session.clone());
                session.connect(address);
                inner.session = Some(session);
                inner.pump = Some(tokio::spawn(pump(
                    Arc::clone(&self.shared),
                    inner.generation,
                    events,
                )));
            } else {
                warn!("No stream address for message {}, progress will not be streamed", message_id);
            }
            retired
        };
        shut_down(retired_session, retired_pump);

        info!("Tracking translation {} in conversation {}", message_id, conversation_id);
        Ok(())
    }

    /// Drop the active correlation and return to idle.
    pub fn reset(&self) {
        let (session, pump) = {
            let mut inner = self.shared.inner.lock();
            let retired = inner.supersede();
            inner.conversation_id = None;
            inner.pending = false;
            inner.last_message = None;
            inner.session_error = None;
            retired
        };
        shut_down(session, pump);
        self.shared.set_status(TranslationStatus::Idle);
    }

    /// Motion detail for a message, from the cache or fetched and cached.
    pub async fn motion_for(&self, message_id: &str) -> Result<MessageDetail, EngineError> {
        if let Some(detail) = self.shared.cache.detail(message_id) {
            return Ok(detail);
        }
        debug!("Fetching details for message {}", message_id);
        let detail = self.api.fetch_message_details(message_id).await?;
        self.shared.cache.put_detail(detail.clone());
        Ok(detail)
    }

    pub fn status(&self) -> TranslationStatus {
        self.shared.inner.lock().status
    }

    pub fn is_translating(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner.pending || inner.session_address.is_some()
    }

    pub fn active_message_id(&self) -> Option<String> {
        self.shared.inner.lock().message_id.clone()
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.shared.inner.lock().conversation_id.clone()
    }

    pub fn session_address(&self) -> Option<String> {
        self.shared.inner.lock().session_address.clone()
    }

    pub fn last_message(&self) -> Option<serde_json::Value> {
        self.shared.inner.lock().last_message.clone()
    }

    pub fn session_error(&self) -> Option<String> {
        self.shared.inner.lock().session_error.clone()
    }

    pub fn cache(&self) -> &ConversationCache {
        &self.shared.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for TranslationEngine {
    fn drop(&mut self) {
        let (session, pump) = self.shared.inner.lock().supersede();
        shut_down(session, pump);
    }
}

/// Route session events for one correlation generation.
async fn pump(
    shared: Arc<EngineShared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        if !shared.is_current(generation) {
            debug!("Dropping event for superseded translation");
            break;
        }

        match event {
            SessionEvent::Message(value) => {
                if handle_message(&shared, generation, value) {
                    break;
                }
            }
            SessionEvent::Error(message) => {
                shared.inner.lock().session_error = Some(message.clone());
                shared.emit(EngineEvent::SessionError(message));
            }
            SessionEvent::Exhausted => {
                handle_exhausted(&shared, generation);
                break;
            }
            SessionEvent::Opened => debug!("Translation stream open"),
            SessionEvent::Closed { code, clean } => {
                debug!("Translation stream closed (code {}, clean {})", code, clean)
            }
            SessionEvent::Reconnecting { attempt, delay } => {
                debug!("Translation stream reconnecting, attempt {} in {:?}", attempt, delay)
            }
        }
    }
}

/// Apply one inbound message. Returns `true` once the correlation is over.
fn handle_message(shared: &Arc<EngineShared>, generation: u64, value: serde_json::Value) -> bool {
    let message = match StreamMessage::decode(&value) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring undecodable stream message: {}", e);
            return false;
        }
    };

    let (conversation_id, message_id) = {
        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return true;
        }
        inner.last_message = Some(value);
        match (inner.conversation_id.clone(), inner.message_id.clone()) {
            (Some(conversation_id), Some(message_id)) => (conversation_id, message_id),
            _ => return false,
        }
    };

    if let Some(other) = message.message_id().filter(|id| *id != message_id) {
        warn!("Ignoring stream message for {} while tracking {}", other, message_id);
        return false;
    }

    let status = message.status();
    let preview = message.preview().map(str::to_string);
    shared.cache.update_message(&conversation_id, &message_id, |entry| {
        entry.status = status;
        if let Some(preview) = preview {
            entry.output_preview = Some(preview);
        }
    });
    shared.emit(EngineEvent::MessageUpdated {
        conversation_id: conversation_id.clone(),
        message_id: message_id.clone(),
        status,
    });
    shared.set_status(status);

    match &message {
        StreamMessage::Completed(event) => {
            if let Some(frames) = event.motion() {
                let frames = frames.clone();
                shared
                    .cache
                    .put_detail(MessageDetail::from_completed(&message_id, &conversation_id, event));
                info!("Motion ready for {} ({} frames)", message_id, frames.len());
                shared.emit(EngineEvent::MotionReady {
                    message_id: message_id.clone(),
                    frames,
                });
            }
        }
        StreamMessage::Failed(event) => {
            let reason = event.error.as_deref().or(event.message.as_deref()).unwrap_or("unknown error");
            warn!("Translation {} failed: {}", message_id, reason);
        }
        StreamMessage::Progress(_) => return false,
    }

    shared.cache.invalidate(&conversation_id);
    shared.cache.invalidate_list();

    let session = {
        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return true;
        }
        inner.message_id = None;
        inner.session_address = None;
        // The pump is this task; dropping its handle detaches it.
        inner.pump = None;
        inner.session.take()
    };
    shut_down(session, None);

    let grace = shared.config.session.completion_grace();
    let grace_shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let mut inner = grace_shared.inner.lock();
        if inner.generation == generation {
            inner.conversation_id = None;
        }
    });

    shared.emit(EngineEvent::Finished { message_id, status });
    true
}

fn handle_exhausted(shared: &Arc<EngineShared>, generation: u64) {
    let session = {
        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.session_address = None;
        inner.message_id = None;
        inner.pump = None;
        inner.session_error = Some(MAX_ATTEMPTS_REACHED.to_string());
        inner.session.take()
    };
    shut_down(session, None);

    error!("Translation stream gave up: {}", MAX_ATTEMPTS_REACHED);
    shared.emit(EngineEvent::SessionError(MAX_ATTEMPTS_REACHED.to_string()));
    shared.set_status(TranslationStatus::Failed);
}
