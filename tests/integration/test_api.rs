//! Integration tests for the HTTP API over a real listener.
//!
//! These tests drive the dictionary pages, quiz sessions, the admin panel
//! and accounts with `reqwest`, backed by the in-memory store.

use std::net::TcpListener;
use std::time::Duration;

use mathdict_core::Config;
use mathdict_server::{create_router, AppState};
use mathdict_store::{MemoryIdentity, MemoryStore, Store, Table};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// A running server and a client pointed at it.
struct TestServer {
    base: String,
    client: Client,
    store: MemoryStore,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let store = MemoryStore::new();
        let state = AppState::new(config, store.clone(), MemoryIdentity::new());

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

        Self {
            base: format!("http://{addr}/api"),
            client: Client::new(),
            store,
        }
    }

    async fn open() -> Self {
        Self::start(Config {
            admin_role: None,
            ..Config::default()
        })
        .await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .expect("Request failed");
        read(response).await
    }

    async fn post(&self, path: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = self.client.post(format!("{}{path}", self.base)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        read(request.send().await.expect("Request failed")).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .put(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .expect("Request failed");
        read(response).await
    }

    async fn delete(&self, path: &str) -> StatusCode {
        self.client
            .delete(format!("{}{path}", self.base))
            .send()
            .await
            .expect("Request failed")
            .status()
    }
}

async fn read(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let text = response.text().await.expect("Failed to read body");
    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, value)
}

/// Creates a two-question quiz and returns its id.
async fn create_quiz(server: &TestServer, minutes: Option<u32>) -> String {
    let (status, body) = server
        .post(
            "/admin/quizzes",
            json!({
                "title": "Angles",
                "description": "Right, acute and obtuse",
                "time_limit_minutes": minutes,
                "difficulty_level": "easy",
                "questions": [
                    {"question": "Degrees in a right angle?", "options": ["90", "180", "45", ""], "correct_answer": 0},
                    {"question": "An angle under 90 degrees is...", "options": ["obtuse", "acute", "", ""], "correct_answer": 1}
                ]
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "quiz not created: {body}");
    body["row"]["quiz"]["id"].as_str().expect("quiz id").to_string()
}

/// Picks the display index of `text` on the current question.
fn option_index(session: &Value, text: &str) -> usize {
    session["current_question"]["options"]
        .as_array()
        .expect("options")
        .iter()
        .position(|o| o == text)
        .expect("option present")
}

// ============================================================================
// Dictionary pages
// ============================================================================

#[tokio::test]
async fn test_catalog_with_deleted_topic() {
    let server = TestServer::open().await;

    let (_, topic) = server
        .post("/admin/topics", json!({"name": "Geometry"}), None)
        .await;
    let topic_id = topic["row"]["id"].as_str().expect("topic id").to_string();
    server
        .post("/admin/grade-levels", json!({"level": 7, "name": "7th grade"}), None)
        .await;
    for term in [
        json!({"name": "Angle", "definition": "Two rays from one point", "topic_id": topic_id, "grade_level": 7}),
        json!({"name": "Area", "definition": "Size of a surface", "grade_level": 5}),
        json!({"name": "Median", "definition": "Middle value"}),
    ] {
        let (status, _) = server.post("/admin/terms", term, None).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = server.get("/terms?letter=a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 2);
    let angle = &page["terms"][0];
    assert_eq!(angle["name"], "Angle");
    assert_eq!(angle["topic_badge"]["name"], "Geometry");
    assert_eq!(angle["grade_badge"]["label"], "7th grade");
    assert_eq!(page["terms"][1]["grade_badge"]["label"], "Grade 5");

    let (_, page) = server.get("/terms?search=nothing-like-this").await;
    assert_eq!(page["is_empty"], true);
    assert_eq!(page["count"], 0);

    assert_eq!(
        server.delete(&format!("/admin/topics/{topic_id}")).await,
        StatusCode::OK
    );
    let (status, page) = server.get("/terms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 3);
    assert!(page["terms"][0]["topic_badge"].is_null());
}

#[tokio::test]
async fn test_quiz_list_newest_first() {
    let server = TestServer::open().await;
    let first = create_quiz(&server, None).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = create_quiz(&server, Some(5)).await;

    let (status, quizzes) = server.get("/quizzes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quizzes[0]["id"], second.as_str());
    assert_eq!(quizzes[1]["id"], first.as_str());
    assert_eq!(quizzes[0]["question_count"], 2);
    assert!(quizzes[0]["rating"]["average"].is_null());
}

// ============================================================================
// Quiz sessions
// ============================================================================

#[tokio::test]
async fn test_full_attempt_with_navigation_and_rating() {
    let server = TestServer::open().await;
    let quiz_id = create_quiz(&server, Some(10)).await;

    let (status, created) = server.post("/sessions", json!({}), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().expect("session id").to_string();
    assert_eq!(created["session"]["phase"], "browsing");

    let (_, loaded) = server
        .post(&format!("/sessions/{id}/select"), json!({"quizId": quiz_id}), None)
        .await;
    assert_eq!(loaded["session"]["quiz"]["title"], "Angles");

    let (_, started) = server
        .post(&format!("/sessions/{id}/start"), json!({}), None)
        .await;
    assert_eq!(started["session"]["remaining_seconds"], 600);

    // Advancing without an answer is a prompt and keeps the position.
    let (status, prompt) = server
        .post(&format!("/sessions/{id}/next"), json!({}), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(prompt["category"], "prompt");

    let first = option_index(&started["session"], "90");
    server
        .post(&format!("/sessions/{id}/answer"), json!({"option": first}), None)
        .await;
    let (_, moved) = server
        .post(&format!("/sessions/{id}/next"), json!({}), None)
        .await;
    assert_eq!(moved["session"]["current_index"], 1);

    // Back and forward again keeps the recorded answer.
    let (_, back) = server
        .post(&format!("/sessions/{id}/previous"), json!({}), None)
        .await;
    assert_eq!(back["session"]["selected"], first);
    let (_, forward) = server
        .post(&format!("/sessions/{id}/next"), json!({}), None)
        .await;

    let wrong = option_index(&forward["session"], "obtuse");
    server
        .post(&format!("/sessions/{id}/answer"), json!({"option": wrong}), None)
        .await;
    let (_, done) = server
        .post(&format!("/sessions/{id}/next"), json!({}), None)
        .await;
    let results = &done["session"]["results"];
    assert_eq!(done["session"]["phase"], "completed");
    assert_eq!(results["correct"], 1);
    assert_eq!(results["incorrect"], 1);
    assert_eq!(results["score_percent"], 50);
    assert_eq!(results["timed_out"], false);

    let (status, rated) = server
        .post(&format!("/sessions/{id}/rating"), json!({"rating": 4}), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rated["notice"]["level"], "success");

    let (status, _) = server
        .post(&format!("/sessions/{id}/rating"), json!({"rating": 2}), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(server.store.rows(Table::QuizRatings).await.len(), 1);

    let (_, card) = server.get(&format!("/quizzes/{quiz_id}")).await;
    assert_eq!(card["rating"]["count"], 1);
    assert_eq!(card["rating"]["average"], 4.0);

    // Retry returns to the preview of the same quiz for a fresh attempt.
    let (_, retried) = server
        .post(&format!("/sessions/{id}/retry"), json!({}), None)
        .await;
    assert_eq!(retried["session"]["phase"], "previewing");
    assert_eq!(retried["session"]["quiz"]["title"], "Angles");
    let (_, restarted) = server
        .post(&format!("/sessions/{id}/start"), json!({}), None)
        .await;
    assert_eq!(restarted["session"]["attempt"], 2);
    assert_eq!(restarted["session"]["answered"], 0);

    assert_eq!(
        server.delete(&format!("/sessions/{id}")).await,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn test_quiz_without_questions_cannot_start() {
    let server = TestServer::open().await;
    let (status, rejected) = server
        .post(
            "/admin/quizzes",
            json!({"title": "Empty", "questions": [{"question": "", "options": ["", ""]}]}),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(rejected["error"].as_str().expect("error").contains("questions"));
    assert!(server.store.rows(Table::Quizzes).await.is_empty());

    // Rows written outside the editor can still leave a quiz without questions.
    let rows = server
        .store
        .insert(Table::Quizzes, vec![json!({"title": "Empty"})])
        .await
        .expect("insert quiz");
    let quiz_id = rows[0]["id"].as_str().expect("quiz id").to_string();

    let (_, created) = server.post("/sessions", json!({}), None).await;
    let id = created["id"].as_str().expect("session id").to_string();
    server
        .post(&format!("/sessions/{id}/select"), json!({"quizId": quiz_id}), None)
        .await;

    let (status, body) = server
        .post(&format!("/sessions/{id}/start"), json!({}), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().expect("error").contains("no questions"));
}

// ============================================================================
// Admin panel and accounts
// ============================================================================

#[tokio::test]
async fn test_admin_requires_role() {
    let server = TestServer::start(Config::default()).await;

    let (status, _) = server
        .post("/admin/topics", json!({"name": "Statistics"}), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, signed_up) = server
        .post(
            "/auth/sign-up",
            json!({"email": "ada@example.com", "password": "secret1", "username": "ada"}),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id: Uuid = signed_up["user"]["id"]
        .as_str()
        .expect("user id")
        .parse()
        .expect("uuid");

    let (status, session) = server
        .post(
            "/auth/sign-in",
            json!({"email": "ada@example.com", "password": "secret1"}),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = session["access_token"].as_str().expect("token").to_string();

    let (status, _) = server
        .post("/admin/topics", json!({"name": "Statistics"}), Some(&token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    server
        .store
        .update(Table::Profiles, user_id, json!({"role": "admin"}))
        .await
        .expect("promote");
    let (status, created) = server
        .post("/admin/topics", json!({"name": "Statistics"}), Some(&token))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["row"]["name"], "Statistics");

    let (status, _) = server.post("/auth/sign-out", json!({}), Some(&token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = server
        .post("/admin/topics", json!({"name": "Probability"}), Some(&token))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_quiz_editing_syncs_questions() {
    let server = TestServer::open().await;
    let quiz_id = create_quiz(&server, None).await;

    let (_, mut form) = server.get(&format!("/admin/quizzes/{quiz_id}/form")).await;
    let kept_id = form["questions"][0]["id"].clone();
    form["questions"][1] = json!({
        "question": "Degrees in a straight angle?",
        "options": ["90", "180", "", ""],
        "correct_answer": 1
    });

    let (status, saved) = server.put(&format!("/admin/quizzes/{quiz_id}"), form).await;
    assert_eq!(status, StatusCode::OK);
    let questions = saved["row"]["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().any(|q| q["id"] == kept_id));
    assert!(questions
        .iter()
        .any(|q| q["question"] == "Degrees in a straight angle?"));
    assert_eq!(server.store.rows(Table::QuizQuestions).await.len(), 2);

    assert_eq!(
        server.delete(&format!("/admin/quizzes/{quiz_id}")).await,
        StatusCode::OK
    );
    assert!(server.store.rows(Table::QuizQuestions).await.is_empty());
}

#[tokio::test]
async fn test_admin_quiz_reorder_persists() {
    let server = TestServer::open().await;
    let quiz_id = create_quiz(&server, None).await;

    let (_, mut form) = server.get(&format!("/admin/quizzes/{quiz_id}/form")).await;
    let questions = form["questions"].as_array_mut().expect("questions");
    questions.reverse();
    let first = questions[0]["question"].clone();

    let (status, saved) = server.put(&format!("/admin/quizzes/{quiz_id}"), form).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["row"]["questions"][0]["question"], first);

    let (_, reloaded) = server.get(&format!("/admin/quizzes/{quiz_id}/form")).await;
    assert_eq!(reloaded["questions"][0]["question"], first);
}

#[tokio::test]
async fn test_session_of_signed_in_user_is_private() {
    let server = TestServer::open().await;
    let quiz_id = create_quiz(&server, None).await;

    let mut tokens = Vec::new();
    for email in ["ann@example.com", "bob@example.com"] {
        let (_, signed_up) = server
            .post(
                "/auth/sign-up",
                json!({"email": email, "password": "secret1"}),
                None,
            )
            .await;
        let token = signed_up["session"]["access_token"].as_str().expect("token");
        tokens.push(token.to_string());
    }
    let (ann, bob) = (&tokens[0], &tokens[1]);

    let (status, created) = server.post("/sessions", json!({}), Some(ann)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().expect("session id").to_string();
    let select = json!({"quizId": quiz_id});

    let (status, _) = server
        .post(&format!("/sessions/{id}/select"), select.clone(), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = server
        .post(&format!("/sessions/{id}/select"), select.clone(), Some(bob))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["category"], "auth");
    assert_eq!(server.get(&format!("/sessions/{id}")).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(server.delete(&format!("/sessions/{id}")).await, StatusCode::UNAUTHORIZED);

    let (status, selected) = server
        .post(&format!("/sessions/{id}/select"), select, Some(ann))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(selected["session"]["phase"], "previewing");
}

#[tokio::test]
async fn test_unknown_routes_and_ids() {
    let server = TestServer::open().await;
    let (status, _) = server.get(&format!("/sessions/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get("/admin/tabs/nope").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        server.delete(&format!("/admin/terms/{}", Uuid::new_v4())).await,
        StatusCode::NOT_FOUND
    );
}
