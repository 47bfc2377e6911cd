//! Scripted transport and backend shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use signmotion_engine::{
    Connection, Connector, EngineError, Frame, MessageDetail, TranslationApi, TranslationRequest,
    TranslationResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Server end of one accepted mock connection.
pub struct Peer {
    pub address: String,
    frames: mpsc::UnboundedSender<Frame>,
    pub sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<Mutex<Option<u16>>>,
}

impl Peer {
    pub fn send_json(&self, value: serde_json::Value) {
        let _ = self.frames.send(Frame::Text(value.to_string()));
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.frames.send(Frame::Text(text.to_string()));
    }

    pub fn close(&self, code: u16) {
        let _ = self.frames.send(Frame::Close {
            code,
            reason: String::new(),
        });
    }

    /// Close code the client sent, if it closed.
    pub fn closed_with(&self) -> Option<u16> {
        *self.closed.lock()
    }
}

struct MockConnection {
    frames: mpsc::UnboundedReceiver<Frame>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<Mutex<Option<u16>>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn recv(&mut self) -> Option<Result<Frame, EngineError>> {
        self.frames.recv().await.map(Ok)
    }

    async fn send_text(&mut self, text: String) -> Result<(), EngineError> {
        self.sent
            .send(text)
            .map_err(|_| EngineError::Stream("peer gone".to_string()))
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<(), EngineError> {
        *self.closed.lock() = Some(code);
        Ok(())
    }
}

pub struct MockConnector {
    refuse: AtomicBool,
    connects: AtomicUsize,
    addresses: Mutex<Vec<String>>,
    peers: mpsc::UnboundedSender<Peer>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                refuse: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                addresses: Mutex::new(Vec::new()),
                peers,
            }),
            rx,
        )
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>, EngineError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().push(address.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(EngineError::Network("connection refused".to_string()));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(Mutex::new(None));
        let _ = self.peers.send(Peer {
            address: address.to_string(),
            frames: frames_tx,
            sent: sent_rx,
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(MockConnection {
            frames: frames_rx,
            sent: sent_tx,
            closed,
        }))
    }
}

/// Backend with queued translation responses and canned message details.
#[derive(Default)]
pub struct MockApi {
    responses: Mutex<VecDeque<Result<TranslationResponse, String>>>,
    details: Mutex<HashMap<String, MessageDetail>>,
    pub requests: Mutex<Vec<TranslationRequest>>,
    detail_fetches: AtomicUsize,
}

impl MockApi {
    pub fn respond(&self, conversation_id: &str, message_id: &str) {
        self.responses.lock().push_back(Ok(TranslationResponse {
            conversation_id: conversation_id.to_string(),
            conversation_message_id: message_id.to_string(),
            websocket: Some(format!("ws://localhost:8000/ws/translations/{}", message_id)),
            status: Some("pending".to_string()),
        }));
    }

    pub fn fail_next(&self, error: &str) {
        self.responses.lock().push_back(Err(error.to_string()));
    }

    pub fn add_detail(&self, detail: MessageDetail) {
        self.details.lock().insert(detail.message_id.clone(), detail);
    }

    pub fn detail_fetches(&self) -> usize {
        self.detail_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationApi for MockApi {
    async fn request_translation(&self, request: &TranslationRequest) -> Result<TranslationResponse, EngineError> {
        self.requests.lock().push(request.clone());
        match self.responses.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(EngineError::Api(error)),
            None => Err(EngineError::Api("no scripted response".to_string())),
        }
    }

    async fn fetch_message_details(&self, message_id: &str) -> Result<MessageDetail, EngineError> {
        self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        self.details
            .lock()
            .get(message_id)
            .cloned()
            .ok_or_else(|| EngineError::Api(format!("API Error: 404 Not Found {}", message_id)))
    }
}

/// Receive the next item or fail the test after a generous paused-time wait.
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

/// Let spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
