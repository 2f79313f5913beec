//! Integration tests for the session event stream.
//!
//! A WebSocket client watches while quiz sessions are driven over HTTP.

use std::net::TcpListener;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mathdict_core::Config;
use mathdict_server::{create_router, AppState, SessionEvent};
use mathdict_store::{MemoryIdentity, MemoryStore};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the test server and returns its address.
async fn spawn_test_server() -> String {
    let state = AppState::new(
        Config {
            admin_role: None,
            ..Config::default()
        },
        MemoryStore::new(),
        MemoryIdentity::new(),
    );
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    let router = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Connects a WebSocket client to one session and consumes the
/// `connected` event.
async fn connect_client(addr: &str, session: &str, token: Option<&str>) -> (WsClient, usize) {
    let url = match token {
        Some(token) => format!("ws://{addr}/ws?session={session}&token={token}"),
        None => format!("ws://{addr}/ws?session={session}"),
    };
    let (mut client, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    match receive_event(&mut client).await {
        SessionEvent::Connected(payload) => (client, payload.sessions),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

/// Receives the next event, answering pings on the way.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

async fn post_as(client: &Client, addr: &str, path: &str, body: Value, token: Option<&str>) -> Value {
    let mut request = client.post(format!("http://{addr}/api{path}")).json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON")
}

async fn post(client: &Client, addr: &str, path: &str, body: Value) -> Value {
    post_as(client, addr, path, body, None).await
}

/// Creates a one-question quiz and returns its id.
async fn create_quiz(client: &Client, addr: &str, minutes: Option<u32>) -> String {
    let quiz = post(
        client,
        addr,
        "/admin/quizzes",
        json!({
            "title": "Triangles",
            "time_limit_minutes": minutes,
            "questions": [{"question": "Sides of a triangle?", "options": ["3", "4"], "correct_answer": 0}]
        }),
    )
    .await;
    quiz["row"]["quiz"]["id"].as_str().expect("quiz id").to_string()
}

/// Opens a session, tied to the user behind `token` when one is given.
async fn open_session(client: &Client, addr: &str, token: Option<&str>) -> String {
    let session = post_as(client, addr, "/sessions", json!({}), token).await;
    session["id"].as_str().expect("session id").to_string()
}

async fn select(client: &Client, addr: &str, id: &str, quiz_id: &str) {
    post(client, addr, &format!("/sessions/{id}/select"), json!({"quizId": quiz_id})).await;
}

#[tokio::test]
async fn test_connected_event_counts_sessions() {
    let addr = spawn_test_server().await;
    let client = Client::new();

    let first = open_session(&client, &addr, None).await;
    let (_ws, sessions) = connect_client(&addr, &first, None).await;
    assert_eq!(sessions, 1);

    open_session(&client, &addr, None).await;
    let (_ws, sessions) = connect_client(&addr, &first, None).await;
    assert_eq!(sessions, 2);
}

#[tokio::test]
async fn test_attempt_lifecycle_events() {
    let addr = spawn_test_server().await;
    let client = Client::new();
    let quiz_id = create_quiz(&client, &addr, None).await;
    let id = open_session(&client, &addr, None).await;
    let (mut ws, _) = connect_client(&addr, &id, None).await;

    select(&client, &addr, &id, &quiz_id).await;
    match receive_event(&mut ws).await {
        SessionEvent::QuizLoaded(payload) => {
            assert_eq!(payload.session_id.to_string(), id);
            assert_eq!(payload.quiz.expect("quiz").title, "Triangles");
            assert!(payload.error.is_none());
        }
        other => panic!("Expected QuizLoaded event, got: {other:?}"),
    }

    let started = post(&client, &addr, &format!("/sessions/{id}/start"), json!({})).await;
    match receive_event(&mut ws).await {
        SessionEvent::Started(payload) => {
            assert_eq!(payload.attempt, 1);
            assert_eq!(payload.question_count, 1);
            assert_eq!(payload.remaining_seconds, None);
        }
        other => panic!("Expected Started event, got: {other:?}"),
    }

    let option = started["session"]["current_question"]["options"]
        .as_array()
        .expect("options")
        .iter()
        .position(|o| o == "3")
        .expect("option");
    post(&client, &addr, &format!("/sessions/{id}/answer"), json!({"option": option})).await;
    post(&client, &addr, &format!("/sessions/{id}/next"), json!({})).await;
    match receive_event(&mut ws).await {
        SessionEvent::Completed(payload) => {
            assert_eq!(payload.score, 100);
            assert_eq!(payload.correct, 1);
            assert!(!payload.timed_out);
        }
        other => panic!("Expected Completed event, got: {other:?}"),
    }

    post(&client, &addr, &format!("/sessions/{id}/rating"), json!({"rating": 5})).await;
    match receive_event(&mut ws).await {
        SessionEvent::RatingSubmitted(payload) => {
            assert_eq!(payload.quiz_id.to_string(), quiz_id);
            assert_eq!(payload.rating, 5);
        }
        other => panic!("Expected RatingSubmitted event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_timed_attempt_ticks() {
    let addr = spawn_test_server().await;
    let client = Client::new();
    let quiz_id = create_quiz(&client, &addr, Some(1)).await;
    let id = open_session(&client, &addr, None).await;
    let (mut ws, _) = connect_client(&addr, &id, None).await;

    select(&client, &addr, &id, &quiz_id).await;
    receive_event(&mut ws).await;
    post(&client, &addr, &format!("/sessions/{id}/start"), json!({})).await;

    match receive_event(&mut ws).await {
        SessionEvent::Started(payload) => assert_eq!(payload.remaining_seconds, Some(60)),
        other => panic!("Expected Started event, got: {other:?}"),
    }
    match receive_event(&mut ws).await {
        SessionEvent::Tick(payload) => {
            assert_eq!(payload.attempt, 1);
            assert_eq!(payload.remaining_seconds, 59);
        }
        other => panic!("Expected Tick event, got: {other:?}"),
    }

    // Leaving the attempt stops the countdown.
    post(&client, &addr, &format!("/sessions/{id}/choose-another"), json!({})).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let quiet = timeout(Duration::from_millis(1500), receive_event(&mut ws)).await;
    assert!(quiet.is_err(), "Expected no more ticks, got: {quiet:?}");
}

#[tokio::test]
async fn test_stream_carries_only_its_session() {
    let addr = spawn_test_server().await;
    let client = Client::new();
    let quiz_id = create_quiz(&client, &addr, None).await;
    let watched = open_session(&client, &addr, None).await;
    let other = open_session(&client, &addr, None).await;
    let (mut ws, _) = connect_client(&addr, &watched, None).await;

    select(&client, &addr, &other, &quiz_id).await;
    post(&client, &addr, &format!("/sessions/{other}/start"), json!({})).await;
    select(&client, &addr, &watched, &quiz_id).await;

    match receive_event(&mut ws).await {
        SessionEvent::QuizLoaded(payload) => assert_eq!(payload.session_id.to_string(), watched),
        other => panic!("Expected QuizLoaded for the watched session, got: {other:?}"),
    }
    let quiet = timeout(Duration::from_millis(300), receive_event(&mut ws)).await;
    assert!(quiet.is_err(), "Expected no further events, got: {quiet:?}");
}

#[tokio::test]
async fn test_unknown_session_is_refused() {
    let addr = spawn_test_server().await;
    let url = format!("ws://{addr}/ws?session={}", uuid::Uuid::new_v4());
    assert!(connect_async(url).await.is_err());

    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
}

#[tokio::test]
async fn test_owned_session_stream_needs_owner_token() {
    let addr = spawn_test_server().await;
    let client = Client::new();

    let signed_up = post(
        &client,
        &addr,
        "/auth/sign-up",
        json!({"email": "ann@example.com", "password": "secret1", "username": "ann"}),
    )
    .await;
    let token = signed_up["session"]["access_token"]
        .as_str()
        .expect("access token")
        .to_string();
    let id = open_session(&client, &addr, Some(&token)).await;

    let anonymous = connect_async(format!("ws://{addr}/ws?session={id}")).await;
    assert!(anonymous.is_err());

    let (_ws, sessions) = connect_client(&addr, &id, Some(&token)).await;
    assert_eq!(sessions, 1);
}
