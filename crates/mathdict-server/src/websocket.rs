//! WebSocket event types and broadcasting for live quiz sessions.
//!
//! Every session transition worth showing elsewhere (another tab,
//! a classroom display) is broadcast inside the server; each client
//! subscribes to one session with `/ws?session=<id>` and only receives that
//! session's events. A session opened by a signed-in user also needs that
//! user's token, as `&token=<jwt>` or a bearer header.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, with the number of sessions
//! - `quiz_loaded` - A selected quiz finished loading (or failed to)
//! - `started` - An attempt started
//! - `tick` - One second of a countdown elapsed
//! - `completed` - An attempt completed (finished or timed out)
//! - `rating_submitted` - A rating was stored
//! - `error` - A session operation failed
//!
//! # Example
//!
//! ```no_run
//! use mathdict_server::websocket::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::connected(0));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use mathdict_core::{QuizPreview, QuizResults};
use mathdict_store::{Identity, Store};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{bearer, session_caller, ApiResult, AppState};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Number of open quiz sessions.
    pub sessions: usize,
}

/// Payload for the `quiz_loaded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizLoadedPayload {
    /// The session that selected the quiz.
    pub session_id: Uuid,
    /// The loaded quiz, when the load succeeded.
    pub quiz: Option<QuizPreview>,
    /// Why the load failed.
    pub error: Option<String>,
}

/// Payload for the `started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPayload {
    /// The session.
    pub session_id: Uuid,
    /// Attempt number.
    pub attempt: u64,
    /// Number of questions.
    pub question_count: usize,
    /// Countdown length, if timed.
    pub remaining_seconds: Option<u32>,
}

/// Payload for the `tick` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    /// The session.
    pub session_id: Uuid,
    /// Attempt number.
    pub attempt: u64,
    /// Seconds left.
    pub remaining_seconds: u32,
}

/// Payload for the `completed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPayload {
    /// The session.
    pub session_id: Uuid,
    /// Attempt number.
    pub attempt: u64,
    /// Score in percent.
    pub score: u32,
    /// Number of correct answers.
    pub correct: usize,
    /// Number of questions.
    pub total: usize,
    /// Whether the countdown ended the attempt.
    pub timed_out: bool,
}

/// Payload for the `rating_submitted` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSubmittedPayload {
    /// The session.
    pub session_id: Uuid,
    /// The rated quiz.
    pub quiz_id: Uuid,
    /// The stored rating.
    pub rating: u8,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// The session, if the error belongs to one.
    pub session_id: Option<Uuid>,
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket events for quiz sessions.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when a selected quiz finished loading.
    QuizLoaded(QuizLoadedPayload),
    /// Sent when an attempt starts.
    Started(StartedPayload),
    /// Sent every second of a countdown.
    Tick(TickPayload),
    /// Sent when an attempt completes.
    Completed(CompletedPayload),
    /// Sent when a rating is stored.
    RatingSubmitted(RatingSubmittedPayload),
    /// Sent when a session operation fails.
    Error(ErrorPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(sessions: usize) -> Self {
        Self::Connected(ConnectedPayload { sessions })
    }

    /// Creates a `QuizLoaded` event.
    #[must_use]
    pub const fn quiz_loaded(
        session_id: Uuid,
        quiz: Option<QuizPreview>,
        error: Option<String>,
    ) -> Self {
        Self::QuizLoaded(QuizLoadedPayload {
            session_id,
            quiz,
            error,
        })
    }

    /// Creates a `Started` event.
    #[must_use]
    pub const fn started(
        session_id: Uuid,
        attempt: u64,
        question_count: usize,
        remaining_seconds: Option<u32>,
    ) -> Self {
        Self::Started(StartedPayload {
            session_id,
            attempt,
            question_count,
            remaining_seconds,
        })
    }

    /// Creates a `Tick` event.
    #[must_use]
    pub const fn tick(session_id: Uuid, attempt: u64, remaining_seconds: u32) -> Self {
        Self::Tick(TickPayload {
            session_id,
            attempt,
            remaining_seconds,
        })
    }

    /// Creates a `Completed` event from an attempt's results.
    #[must_use]
    pub const fn completed(session_id: Uuid, attempt: u64, results: &QuizResults) -> Self {
        Self::Completed(CompletedPayload {
            session_id,
            attempt,
            score: results.summary.score_percent,
            correct: results.summary.correct,
            total: results.summary.total,
            timed_out: results.summary.timed_out,
        })
    }

    /// Creates a `RatingSubmitted` event.
    #[must_use]
    pub const fn rating_submitted(session_id: Uuid, quiz_id: Uuid, rating: u8) -> Self {
        Self::RatingSubmitted(RatingSubmittedPayload {
            session_id,
            quiz_id,
            rating,
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(session_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            session_id,
            message: message.into(),
        })
    }

    /// The session an event belongs to; `None` for connection-level events.
    #[must_use]
    pub const fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::Connected(_) => None,
            Self::QuizLoaded(p) => Some(p.session_id),
            Self::Started(p) => Some(p.session_id),
            Self::Tick(p) => Some(p.session_id),
            Self::Completed(p) => Some(p.session_id),
            Self::RatingSubmitted(p) => Some(p.session_id),
            Self::Error(p) => p.session_id,
        }
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::QuizLoaded(_) => "quiz_loaded",
            Self::Started(_) => "started",
            Self::Tick(_) => "tick",
            Self::Completed(_) => "completed",
            Self::RatingSubmitted(_) => "rating_submitted",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all connected WebSocket clients.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event and returns the number of receivers.
    pub fn send(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Query parameters of `/ws`.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// The session to follow.
    pub session: Uuid,
    /// Access token of the session's owner; browsers cannot set headers on
    /// a WebSocket handshake.
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler for `/ws?session=<id>`.
///
/// The session must exist, and a session opened by a signed-in user is
/// only followed with that user's token.
pub async fn ws_handler<S: Store, I: Identity>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<S, I>>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    info!(session_id = %query.session, "New WebSocket connection request");
    let token = query.token.as_deref().or_else(|| bearer(&headers));
    session_caller(&state, query.session, token).await?;

    let session = query.session;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session)))
}

fn encode(event: &SessionEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(event = event.event_name(), "Failed to serialize event: {}", e);
            None
        }
    }
}

/// Handles a single WebSocket connection.
///
/// Sends `connected`, then forwards the events of `session`. Pings every 30
/// seconds and closes after three unanswered pings.
async fn handle_socket<S: Store, I: Identity>(
    socket: WebSocket,
    state: Arc<AppState<S, I>>,
    session: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.sessions.events().subscribe();

    let connected = SessionEvent::connected(state.sessions.len().await);
    let Some(connected_json) = encode(&connected) else {
        return;
    };
    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }
    info!(session_id = %session, "WebSocket client connected");

    let mut heartbeat = interval(HEARTBEAT);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring message from client");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if event.session_id() != Some(session) {
                            continue;
                        }
                        let Some(json) = encode(&event) else {
                            continue;
                        };
                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
