//! WebSocket API handler and connection management.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        ConnectInfo, Extension, Query, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use callwire_session::{Listener, Relay, SessionUpdate};
use callwire_types::{EventKind, IntelligenceRef, Phase, RelayEvent, SessionCode, Turn};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Maximum accepted length of an inbound text frame (64 KiB).
pub const MAX_WS_FRAME_LEN: usize = 65_536;

/// Capacity of the per-connection queue for locally generated frames and
/// attach requests.
const LOCAL_QUEUE: usize = 16;

/// Query parameters for the WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Incoming WebSocket message types.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
pub enum IncomingMessage {
    #[serde(rename = "pollHistory")]
    PollHistory {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    #[serde(rename = "endCall")]
    EndCall,
}

/// Outgoing WebSocket message types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum OutgoingMessage {
    #[serde(rename = "history")]
    History { data: Vec<Turn> },
    #[serde(rename = "aiIntro")]
    AiIntro { data: Vec<Turn> },
    #[serde(rename = "startCall")]
    StartCall,
    #[serde(rename = "endCall")]
    EndCall,
    #[serde(rename = "voiceIntelligenceSid")]
    VoiceIntelligenceSid { data: Value },
    #[serde(rename = "error")]
    Error { message: String },
}

impl OutgoingMessage {
    fn intelligence(reference: IntelligenceRef) -> Self {
        let IntelligenceRef {
            transcript_sid,
            mut payload,
        } = reference;
        match payload.as_object_mut() {
            Some(fields) => {
                fields.insert("transcript_sid".to_string(), Value::String(transcript_sid));
            }
            None => payload = serde_json::json!({ "transcript_sid": transcript_sid }),
        }
        Self::VoiceIntelligenceSid { data: payload }
    }

    fn for_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Ringing => None,
            Phase::Ongoing => Some(Self::StartCall),
            Phase::Ended => Some(Self::EndCall),
        }
    }
}

/// Translates a registry update into the wire frames a client expects.
///
/// A join snapshot expands to the full history, then the current phase
/// (if past ringing), then the analysis reference (if any).
pub fn frames_for(update: SessionUpdate) -> Vec<OutgoingMessage> {
    match update {
        SessionUpdate::Joined(snapshot) => {
            let mut frames = vec![OutgoingMessage::History {
                data: snapshot.history,
            }];
            frames.extend(OutgoingMessage::for_phase(snapshot.phase));
            frames.extend(snapshot.intelligence.map(OutgoingMessage::intelligence));
            frames
        }
        SessionUpdate::History(turns) => vec![OutgoingMessage::History { data: turns }],
        SessionUpdate::Intro(turns) => vec![OutgoingMessage::AiIntro { data: turns }],
        SessionUpdate::PhaseChanged(phase) => OutgoingMessage::for_phase(phase).into_iter().collect(),
        SessionUpdate::IntelligenceReady(reference) => {
            vec![OutgoingMessage::intelligence(reference)]
        }
    }
}

/// Work handed from a connection to its writer task.
enum Outbound {
    /// A locally generated frame.
    Frame(OutgoingMessage),
    /// Update queue of a newly attached session. Replaces the previous one.
    Attach(mpsc::Receiver<SessionUpdate>),
}

/// Receiving halves of a connection's outbound queues, drained by the
/// connection's writer task.
pub struct ConnectionQueues {
    updates: Option<mpsc::Receiver<SessionUpdate>>,
    outbound: mpsc::Receiver<Outbound>,
}

async fn next_update(updates: &mut Option<mpsc::Receiver<SessionUpdate>>) -> Option<SessionUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl ConnectionQueues {
    /// Waits for the next batch of frames. Returns `None` once the
    /// connection has been dropped.
    ///
    /// Attach requests are taken before session updates, so whatever is
    /// still queued from a previous session is discarded with its queue.
    pub async fn next_frames(&mut self) -> Option<Vec<OutgoingMessage>> {
        loop {
            let outbound = tokio::select! {
                biased;
                outbound = self.outbound.recv() => outbound,
                Some(update) = next_update(&mut self.updates) => return Some(frames_for(update)),
            };
            match outbound? {
                Outbound::Frame(frame) => return Some(vec![frame]),
                Outbound::Attach(updates) => self.updates = Some(updates),
            }
        }
    }
}

/// Opens connections and tracks how many are live.
#[derive(Clone)]
pub struct ConnectionManager {
    relay: Relay,
    queue_capacity: usize,
    open: Arc<AtomicUsize>,
}

impl ConnectionManager {
    pub fn new(relay: Relay, queue_capacity: usize) -> Self {
        Self {
            relay,
            queue_capacity,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }

    /// Creates a detached connection and its outbound queues.
    pub fn open(&self) -> (Connection, ConnectionQueues) {
        let (outbound_tx, outbound) = mpsc::channel(LOCAL_QUEUE);
        self.open.fetch_add(1, Ordering::Relaxed);
        let connection = Connection {
            id: Uuid::new_v4(),
            relay: self.relay.clone(),
            queue_capacity: self.queue_capacity,
            subscription: None,
            outbound: outbound_tx,
            open: self.open.clone(),
        };
        let queues = ConnectionQueues {
            updates: None,
            outbound,
        };
        (connection, queues)
    }
}

/// One client's relay connection: the session it is attached to and the
/// listener registered there.
///
/// Every attach registers a fresh listener with its own update queue.
pub struct Connection {
    id: Uuid,
    relay: Relay,
    queue_capacity: usize,
    subscription: Option<(SessionCode, Listener)>,
    outbound: mpsc::Sender<Outbound>,
    open: Arc<AtomicUsize>,
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn attached(&self) -> Option<&SessionCode> {
        self.subscription.as_ref().map(|(code, _)| code)
    }

    fn send_error(&self, message: impl Into<String>) {
        let frame = OutgoingMessage::Error {
            message: message.into(),
        };
        if let Err(e) = self.outbound.try_send(Outbound::Frame(frame)) {
            tracing::warn!(
                connection = %self.id,
                "failed to send WebSocket error to client: {}",
                e
            );
        }
    }

    async fn detach(&mut self) -> Option<SessionCode> {
        let (code, listener) = self.subscription.take()?;
        self.relay
            .registry()
            .unsubscribe(&code, listener.id())
            .await;
        Some(code)
    }

    /// Attaches the connection to `code`, leaving any previous session.
    /// The new session delivers its join sequence through a new update
    /// queue; updates still pending from the previous session are dropped.
    pub async fn attach(&mut self, code: SessionCode) -> bool {
        if let Some(previous) = self.detach().await {
            tracing::debug!(
                connection = %self.id,
                from = %previous,
                to = %code,
                "connection switching session"
            );
        }

        let (listener, updates) = Listener::channel(self.queue_capacity);
        if self.outbound.send(Outbound::Attach(updates)).await.is_err() {
            tracing::debug!(connection = %self.id, "writer gone, not attaching");
            return false;
        }
        if self.relay.registry().subscribe(&code, &listener).await {
            self.subscription = Some((code, listener));
            true
        } else {
            self.send_error(format!("could not subscribe to session {}", code));
            false
        }
    }

    /// Handles one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) {
        if text.len() > MAX_WS_FRAME_LEN {
            self.send_error(format!(
                "frame exceeds maximum length of {} bytes",
                MAX_WS_FRAME_LEN
            ));
            return;
        }

        let incoming = match serde_json::from_str::<IncomingMessage>(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!(
                    connection = %self.id,
                    "dropping malformed client frame: {}",
                    e
                );
                self.send_error(format!("malformed message: {}", e));
                return;
            }
        };

        match incoming {
            IncomingMessage::PollHistory { session_id } => self.poll_history(session_id).await,
            IncomingMessage::EndCall => self.end_call().await,
        }
    }

    async fn poll_history(&mut self, session_id: Option<String>) {
        let code = match session_id.as_deref().map(SessionCode::parse) {
            Some(Ok(code)) => code,
            Some(Err(e)) => {
                self.send_error(format!("invalid sessionId: {}", e));
                return;
            }
            None => {
                self.send_error("pollHistory requires a sessionId");
                return;
            }
        };

        if let Some((current, listener)) = &self.subscription {
            if *current == code && self.relay.registry().resend(&code, listener.id()).await {
                return;
            }
        }
        // Different code, or the session was evicted and recreated.
        self.attach(code).await;
    }

    async fn end_call(&mut self) {
        let Some(code) = self.attached().cloned() else {
            self.send_error("endCall requires an attached session");
            return;
        };
        let outcome = self
            .relay
            .dispatch(RelayEvent::new(code.clone(), EventKind::CallEnded))
            .await;
        tracing::info!(
            session = %code,
            connection = %self.id,
            outcome = outcome.label(),
            "client requested call end"
        );
    }

    /// Detaches from the current session.
    pub async fn close(mut self) {
        self.detach().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::Relaxed);
    }
}

/// WebSocket handler: `GET /api/ws/callConversation?sessionId=...`.
///
/// The session code is optional at connect time; a client that does not
/// know its code yet attaches later with `pollHistory`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    Query(params): Query<WsConnectParams>,
) -> impl IntoResponse {
    tracing::info!(
        remote_addr = %addr,
        session = params.session_id.as_deref().unwrap_or("<none>"),
        "websocket connection opened"
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.session_id))
}

async fn write_frames<W>(mut sender: W, mut queues: ConnectionQueues)
where
    W: Sink<AxumMessage> + Unpin,
{
    while let Some(frames) = queues.next_frames().await {
        for frame in frames {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to serialize WebSocket frame: {}", e);
                    continue;
                }
            };
            if sender.send(AxumMessage::Text(json.into())).await.is_err() {
                return;
            }
        }
    }
}

/// Drives a connection until the client goes away or a write to it fails,
/// then detaches it.
async fn run_connection<R, W, E>(
    mut receiver: R,
    sender: W,
    mut connection: Connection,
    queues: ConnectionQueues,
) where
    R: Stream<Item = Result<AxumMessage, E>> + Unpin,
    E: std::fmt::Display,
    W: Sink<AxumMessage> + Send + Unpin + 'static,
{
    let connection_id = connection.id();

    // Spawn a task to forward queued frames to the websocket sender
    let mut send_task = tokio::spawn(write_frames(sender, queues));

    // Handle incoming messages
    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(AxumMessage::Text(text))) => connection.handle_text(text.as_str()).await,
                Some(Ok(AxumMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection = %connection_id, "websocket read error: {}", e);
                    break;
                }
            },
            _ = &mut send_task => {
                tracing::debug!(connection = %connection_id, "websocket write failed");
                break;
            }
        }
    }

    let session = connection.attached().map(ToString::to_string);
    connection.close().await;
    send_task.abort();
    tracing::info!(
        connection = %connection_id,
        session = session.as_deref().unwrap_or("<none>"),
        "websocket connection closed"
    );
}

/// Handles the WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: Option<String>) {
    let (sender, receiver) = socket.split();
    let (mut connection, queues) = state.connection_manager.open();

    if let Some(raw) = session_id.filter(|raw| !raw.trim().is_empty()) {
        match SessionCode::parse(&raw) {
            Ok(code) => {
                connection.attach(code).await;
            }
            Err(e) => connection.send_error(format!("invalid sessionId: {}", e)),
        }
    }

    run_connection(receiver, sender, connection, queues).await;
}
