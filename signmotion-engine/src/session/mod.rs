//! Streaming session manager.
//!
//! A [`SessionManager`] owns at most one live connection. Each `connect`
//! starts a new generation; a connection task only mutates state or emits
//! events while its generation is current, so a superseded socket can never
//! clobber its successor.

pub mod transport;

pub use transport::{Connection, Connector, Frame, TungsteniteConnector, CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL};

use crate::config::SessionConfig;
use crate::error::EngineError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const NOT_CONNECTED: &str = "WebSocket is not connected";
pub const MAX_ATTEMPTS_REACHED: &str = "Max reconnection attempts reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    Message(serde_json::Value),
    Error(String),
    Closed { code: u16, clean: bool },
    Reconnecting { attempt: u32, delay: Duration },
    Exhausted,
}

struct Shared {
    state: SessionState,
    address: Option<String>,
    generation: u64,
    attempts: u32,
    last_error: Option<String>,
    last_message: Option<serde_json::Value>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

pub struct SessionManager {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager and the receiver its events arrive on, in order.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            state: SessionState::Disconnected,
            address: None,
            generation: 0,
            attempts: 0,
            last_error: None,
            last_message: None,
            outbound: None,
        };
        (
            Self {
                connector,
                config,
                shared: Arc::new(Mutex::new(shared)),
                events,
            },
            rx,
        )
    }

    /// Open a connection to `address`, superseding any existing one.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(&self, address: &str) {
        let mut shared = self.shared.lock();

        if shared.address.as_deref() == Some(address)
            && matches!(shared.state, SessionState::Open | SessionState::Connecting)
        {
            debug!("Session already connected or connecting, skipping");
            return;
        }

        // Dropping the old outbound sender makes the old task close with 1000
        // and exit.
        shared.generation += 1;
        shared.outbound = None;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        shared.address = Some(address.to_string());
        shared.attempts = 0;
        shared.state = SessionState::Connecting;
        shared.outbound = Some(outbound_tx);

        let worker = Worker {
            generation: shared.generation,
            address: address.to_string(),
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
        };
        tokio::spawn(worker.run(outbound_rx));
        info!("Session connecting (generation {})", shared.generation);
    }

    /// Close the connection and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        let mut shared = self.shared.lock();
        shared.attempts = self.config.max_reconnect_attempts;
        shared.generation += 1;
        let had_connection = shared.outbound.take().is_some();
        shared.state = SessionState::Disconnected;
        shared.address = None;
        shared.last_message = None;
        if had_connection {
            info!("Session disconnected");
        }
    }

    /// Serialize and send a message. Only valid while open.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), EngineError> {
        let mut shared = self.shared.lock();
        if shared.state != SessionState::Open {
            warn!("{}, cannot send message", NOT_CONNECTED);
            shared.last_error = Some(NOT_CONNECTED.to_string());
            return Err(EngineError::NotConnected);
        }

        let text = serde_json::to_string(message)?;
        match shared.outbound.as_ref().map(|tx| tx.send(text)) {
            Some(Ok(())) => Ok(()),
            _ => {
                shared.last_error = Some(NOT_CONNECTED.to_string());
                Err(EngineError::NotConnected)
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn address(&self) -> Option<String> {
        self.shared.lock().address.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.shared.lock().attempts
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn last_message(&self) -> Option<serde_json::Value> {
        self.shared.lock().last_message.clone()
    }
}

/// Retires the connection task: a pending reconnect is cancelled and a live
/// socket is closed with 1000 before the task exits.
impl Drop for SessionManager {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        shared.generation += 1;
        shared.outbound = None;
    }
}

/// How a live connection ended.
enum Ended {
    Closed { code: u16, clean: bool },
    /// The manager retired this connection.
    Retired,
}

/// Connection task for one generation.
struct Worker {
    generation: u64,
    address: String,
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Worker {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<String>) {
        loop {
            let ended = match tokio::time::timeout(
                self.config.connect_timeout(),
                self.connector.connect(&self.address),
            )
            .await
            {
                Ok(Ok(mut connection)) => {
                    if !self.on_open() {
                        let _ = connection.close(CLOSE_NORMAL, "Superseded").await;
                        return;
                    }
                    self.pump(connection.as_mut(), &mut outbound).await
                }
                Ok(Err(e)) => {
                    self.on_error(format!("Failed to establish WebSocket connection: {}", e));
                    Ended::Closed { code: CLOSE_ABNORMAL, clean: false }
                }
                Err(_) => {
                    self.on_error("WebSocket connection timed out".to_string());
                    Ended::Closed { code: CLOSE_ABNORMAL, clean: false }
                }
            };

            let Ended::Closed { code, clean } = ended else {
                return;
            };

            let Some(delay) = self.on_close(code, clean) else {
                return;
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                // Manager retired this generation while we waited.
                None = outbound.recv() => return,
            }

            if !self.reconnecting() {
                return;
            }
        }
    }

    async fn pump(
        &self,
        connection: &mut dyn Connection,
        outbound: &mut mpsc::UnboundedReceiver<String>,
    ) -> Ended {
        loop {
            tokio::select! {
                frame = connection.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => self.on_text(&text),
                    Some(Ok(Frame::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => self.on_text(&text),
                        Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Frame::Ping)) | Some(Ok(Frame::Pong)) => {}
                    Some(Ok(Frame::Close { code, reason })) => {
                        debug!("Peer closed stream: {} {}", code, reason);
                        return Ended::Closed { code, clean: code == CLOSE_NORMAL };
                    }
                    Some(Err(e)) => self.on_error(format!("WebSocket connection error: {}", e)),
                    None => return Ended::Closed { code: CLOSE_ABNORMAL, clean: false },
                },
                message = outbound.recv() => match message {
                    Some(text) => {
                        if let Err(e) = connection.send_text(text).await {
                            self.on_error(format!("Failed to send message: {}", e));
                        }
                    }
                    None => {
                        if let Err(e) = connection.close(CLOSE_NORMAL, "Client disconnect").await {
                            debug!("Close after disconnect failed: {}", e);
                        }
                        return Ended::Retired;
                    }
                },
            }
        }
    }

    /// Run `f` against shared state if this generation is still current.
    fn with_current<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> Option<R> {
        let mut shared = self.shared.lock();
        if shared.generation != self.generation {
            return None;
        }
        Some(f(&mut shared))
    }

    fn emit(&self, shared: &Shared, event: SessionEvent) {
        if shared.generation == self.generation {
            let _ = self.events.send(event);
        }
    }

    fn on_open(&self) -> bool {
        self.with_current(|shared| {
            shared.state = SessionState::Open;
            shared.attempts = 0;
            shared.last_error = None;
            info!("WebSocket connected");
            self.emit(shared, SessionEvent::Opened);
        })
        .is_some()
    }

    fn on_text(&self, text: &str) {
        if text.len() > self.config.max_message_bytes {
            warn!("Dropping oversized message ({} bytes)", text.len());
            return;
        }
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse WebSocket message: {}", e);
                return;
            }
        };
        self.with_current(|shared| {
            shared.last_message = Some(value.clone());
            self.emit(shared, SessionEvent::Message(value));
        });
    }

    fn on_error(&self, message: String) {
        self.with_current(|shared| {
            error!("{}", message);
            shared.last_error = Some(message.clone());
            self.emit(shared, SessionEvent::Error(message));
        });
    }

    /// Record a close and decide whether to reconnect; returns the backoff.
    fn on_close(&self, code: u16, clean: bool) -> Option<Duration> {
        self.with_current(|shared| {
            self.emit(shared, SessionEvent::Closed { code, clean });

            if clean {
                shared.state = SessionState::Closed;
                return None;
            }

            if shared.attempts < self.config.max_reconnect_attempts {
                shared.attempts += 1;
                let delay = self.config.reconnect_delay(shared.attempts);
                shared.state = SessionState::Reconnecting;
                info!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    shared.attempts,
                    self.config.max_reconnect_attempts
                );
                self.emit(shared, SessionEvent::Reconnecting { attempt: shared.attempts, delay });
                Some(delay)
            } else {
                error!("{}", MAX_ATTEMPTS_REACHED);
                shared.last_error = Some(MAX_ATTEMPTS_REACHED.to_string());
                shared.state = SessionState::Closed;
                self.emit(shared, SessionEvent::Exhausted);
                None
            }
        })
        .flatten()
    }

    fn reconnecting(&self) -> bool {
        self.with_current(|shared| {
            shared.state = SessionState::Connecting;
        })
        .is_some()
    }
}
