//! HTTP API endpoints for the mathematics dictionary.
//!
//! # Endpoints
//!
//! Pages:
//! - `GET /api/terms?search=&topic=&grade=&letter=` - Filtered term catalog
//! - `GET /api/topics`, `GET /api/grade-levels`, `GET /api/letters`
//! - `GET /api/quizzes`, `GET /api/quizzes/:id` - Quiz cards with ratings
//!
//! Quiz sessions (a session opened with a bearer token answers only to
//! that user's token):
//! - `POST /api/sessions`, `GET|DELETE /api/sessions/:id`
//! - `POST /api/sessions/:id/{select,start,answer,next,previous,retry,choose-another,rating}`
//! - `GET /api/sessions/:id/report?format=markdown|json`
//!
//! Admin (bearer token of an admin profile; writes are sent under it):
//! - `GET /api/admin/tabs/:tab`
//! - `POST /api/admin/{terms,topics,grade-levels,quizzes}`
//! - `PUT|DELETE /api/admin/{terms,topics,grade-levels,quizzes}/:id`
//! - `GET /api/admin/quizzes/:id/form`
//!
//! Accounts:
//! - `POST /api/auth/{sign-in,sign-up,sign-out}`
//!
//! Events:
//! - `GET /ws?session=<id>&token=<jwt>` - WebSocket stream of one session's events
//!
//! # Example
//!
//! ```no_run
//! use mathdict_core::Config;
//! use mathdict_server::{create_router, AppState};
//! use mathdict_store::{MemoryIdentity, MemoryStore};
//!
//! # async fn example() {
//! let state = AppState::new(Config::default(), MemoryStore::new(), MemoryIdentity::new());
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use mathdict_core::{
    Accounts, AdminListing, AdminPanel, AdminTab, CatalogPage, Config, Credentials,
    DictError, ErrorCategory, GradeLevel, GradeLevelForm, Notice, Quiz, QuizCard, QuizForm,
    QuizWithQuestions, Registration, Repository, SessionPhase, SessionView, Term, TermFilter,
    TermForm, Topic, TopicForm,
};
use mathdict_report::{json::JsonGenerator, MarkdownGenerator};
use mathdict_store::{Identity, Session, SignUp, Store};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::sessions::SessionRegistry;
use crate::websocket::{ws_handler, EventBroadcaster, SessionEvent};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
    /// How the client should treat it.
    pub category: String,
}

/// Query string of the term catalog. Empty values do not filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TermsQuery {
    /// Search text.
    pub search: Option<String>,
    /// Topic id.
    pub topic: Option<String>,
    /// Grade number.
    pub grade: Option<String>,
    /// First letter.
    pub letter: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<TermsQuery> for TermFilter {
    type Error = DictError;

    fn try_from(query: TermsQuery) -> Result<Self, Self::Error> {
        let topic = non_empty(query.topic)
            .map(|t| t.parse::<Uuid>())
            .transpose()
            .map_err(|_| DictError::validation("topic", "must be a topic id"))?;
        let grade = non_empty(query.grade)
            .map(|g| g.parse::<i32>())
            .transpose()
            .map_err(|_| DictError::validation("grade", "must be a number"))?;
        Ok(Self {
            search: non_empty(query.search),
            topic,
            grade,
            letter: non_empty(query.letter),
        })
    }
}

/// A session and its snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Session id.
    pub id: Uuid,
    /// Current snapshot.
    pub session: SessionView,
}

/// Body of `POST /api/sessions/:id/select`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    /// Quiz to load.
    pub quiz_id: Uuid,
}

/// Body of `POST /api/sessions/:id/answer`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    /// Display index of the chosen option.
    pub option: usize,
}

/// Body of `POST /api/sessions/:id/rating`.
#[derive(Debug, Clone, Deserialize)]
pub struct RatingRequest {
    /// Rating, 1-5.
    pub rating: u8,
}

/// Outcome of a rating submission. A failed submission is a notice, not
/// an error: the results stay and the rating can be sent again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingResponse {
    /// Session id.
    pub id: Uuid,
    /// Snapshot after the submission.
    pub session: SessionView,
    /// What to tell the user.
    pub notice: Notice,
}

/// Query string of the report endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    /// `markdown` (default) or `json`.
    pub format: Option<String>,
}

/// Outcome of an admin action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminResponse<T> {
    /// What to tell the user.
    pub notice: Notice,
    /// The stored row, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<T>,
}

impl<T> AdminResponse<T> {
    fn saved(message: &str, row: T) -> Json<Self> {
        Json(Self {
            notice: Notice::success(message),
            row: Some(row),
        })
    }

    fn deleted(message: &str) -> Json<Self> {
        Json(Self {
            notice: Notice::success(message),
            row: None,
        })
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug)]
pub struct AppState<S, I> {
    /// Loaded configuration.
    pub config: Config,
    /// Cached data access.
    pub repo: Arc<Repository<S>>,
    /// Admin actions.
    pub admin: AdminPanel<S>,
    /// Accounts and the admin gate.
    pub accounts: Accounts<S, I>,
    /// Open quiz sessions.
    pub sessions: SessionRegistry,
}

impl<S: Store, I: Identity> AppState<S, I> {
    /// Creates the state over a store and an identity service.
    pub fn new(config: Config, store: S, identity: I) -> Self {
        let ttl = Duration::from_secs(config.store.cache_seconds);
        let repo = Arc::new(Repository::new(store).with_ttl(ttl));
        let admin_role = config.admin_role.clone();
        Self {
            admin: AdminPanel::new(Arc::clone(&repo)),
            accounts: Accounts::new(Arc::clone(&repo), identity, admin_role),
            sessions: SessionRegistry::new(EventBroadcaster::default()),
            repo,
            config,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError(DictError);

impl From<DictError> for ApiError {
    fn from(err: DictError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// The HTTP status an error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        if matches!(
            self.0,
            DictError::Forbidden { .. } | DictError::SessionForbidden { .. }
        ) {
            return StatusCode::FORBIDDEN;
        }
        match self.0.category() {
            ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
            ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Prompt => StatusCode::CONFLICT,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Fetch | ErrorCategory::Mutation => StatusCode::BAD_GATEWAY,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, error = %self.0, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            category: self.0.category().to_string(),
        });
        (status, body).into_response()
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Admits `token` to session `id` and returns the session's owner.
///
/// A session opened anonymously admits anyone. A session opened by a
/// signed-in user admits only a token that resolves to that user.
pub(crate) async fn session_caller<S: Store, I: Identity>(
    state: &AppState<S, I>,
    id: Uuid,
    token: Option<&str>,
) -> ApiResult<Option<Uuid>> {
    let Some(owner) = state.sessions.user_id(id).await? else {
        return Ok(None);
    };
    let token = token.ok_or_else(|| DictError::unauthorized("sign in to continue this quiz"))?;
    let caller = state.accounts.current_user(token).await?;
    if caller.id != owner {
        warn!(session_id = %id, user_id = %caller.id, "session access denied");
        return Err(DictError::SessionForbidden { id }.into());
    }
    Ok(Some(owner))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the `/ws` stream.
///
/// Inside a Tokio runtime this also starts the sweeper that closes idle
/// quiz sessions.
pub fn create_router<S: Store, I: Identity>(state: AppState<S, I>) -> Router {
    if tokio::runtime::Handle::try_current().is_ok() {
        let idle_minutes = state.config.server.session_idle_minutes;
        state
            .sessions
            .spawn_sweeper(Duration::from_secs(idle_minutes.saturating_mul(60)));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Pages
        .route("/terms", get(list_terms::<S, I>))
        .route("/topics", get(list_topics::<S, I>))
        .route("/grade-levels", get(list_grade_levels::<S, I>))
        .route("/letters", get(list_letters::<S, I>))
        .route("/quizzes", get(list_quizzes::<S, I>))
        .route("/quizzes/:id", get(get_quiz::<S, I>))
        // Quiz sessions
        .route("/sessions", post(create_session::<S, I>))
        .route(
            "/sessions/:id",
            get(get_session::<S, I>).delete(delete_session::<S, I>),
        )
        .route("/sessions/:id/select", post(select_quiz::<S, I>))
        .route("/sessions/:id/start", post(start_quiz::<S, I>))
        .route("/sessions/:id/answer", post(answer::<S, I>))
        .route("/sessions/:id/next", post(next_question::<S, I>))
        .route("/sessions/:id/previous", post(previous_question::<S, I>))
        .route("/sessions/:id/retry", post(retry::<S, I>))
        .route("/sessions/:id/choose-another", post(choose_another::<S, I>))
        .route("/sessions/:id/rating", post(rate::<S, I>))
        .route("/sessions/:id/report", get(report::<S, I>))
        // Admin
        .route("/admin/tabs/:tab", get(admin_tab::<S, I>))
        .route("/admin/terms", post(create_term::<S, I>))
        .route(
            "/admin/terms/:id",
            put(update_term::<S, I>).delete(delete_term::<S, I>),
        )
        .route("/admin/topics", post(create_topic::<S, I>))
        .route(
            "/admin/topics/:id",
            put(update_topic::<S, I>).delete(delete_topic::<S, I>),
        )
        .route("/admin/grade-levels", post(create_grade_level::<S, I>))
        .route(
            "/admin/grade-levels/:id",
            put(update_grade_level::<S, I>).delete(delete_grade_level::<S, I>),
        )
        .route("/admin/quizzes", post(create_quiz::<S, I>))
        .route(
            "/admin/quizzes/:id",
            put(update_quiz::<S, I>).delete(delete_quiz::<S, I>),
        )
        .route("/admin/quizzes/:id/form", get(quiz_form::<S, I>))
        // Accounts
        .route("/auth/sign-in", post(sign_in::<S, I>))
        .route("/auth/sign-up", post(sign_up::<S, I>))
        .route("/auth/sign-out", post(sign_out::<S, I>));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler::<S, I>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

type AppStateRef<S, I> = State<Arc<AppState<S, I>>>;

// ============================================================================
// Page Handlers
// ============================================================================

/// Handler for `GET /api/terms`.
async fn list_terms<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Query(query): Query<TermsQuery>,
) -> ApiResult<Json<CatalogPage>> {
    let filter = TermFilter::try_from(query)?;
    let terms = state.repo.terms().await?;
    let grades = state.repo.grade_levels().await?;
    Ok(Json(CatalogPage::build(&terms, &grades, filter)))
}

/// Handler for `GET /api/topics`.
async fn list_topics<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
) -> ApiResult<Json<Vec<Topic>>> {
    Ok(Json(state.repo.topics().await?))
}

/// Handler for `GET /api/grade-levels`.
async fn list_grade_levels<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
) -> ApiResult<Json<Vec<GradeLevel>>> {
    Ok(Json(state.repo.grade_levels().await?))
}

/// Handler for `GET /api/letters`.
async fn list_letters<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
) -> ApiResult<Json<Vec<String>>> {
    let terms = state.repo.terms().await?;
    Ok(Json(mathdict_core::letters(&terms)))
}

async fn quiz_card<S: Store>(repo: &Repository<S>, quiz: &Quiz) -> ApiResult<QuizCard> {
    let questions = repo.questions(quiz.id).await?;
    let ratings = repo.ratings(quiz.id).await?;
    Ok(QuizCard::new(quiz, questions.len(), &ratings))
}

/// Handler for `GET /api/quizzes`.
async fn list_quizzes<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
) -> ApiResult<Json<Vec<QuizCard>>> {
    let quizzes = state.repo.quizzes().await?;
    let mut cards = Vec::with_capacity(quizzes.len());
    for quiz in &quizzes {
        cards.push(quiz_card(&state.repo, quiz).await?);
    }
    Ok(Json(cards))
}

/// Handler for `GET /api/quizzes/:id`.
async fn get_quiz<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuizCard>> {
    let quiz = state.repo.quiz(id).await?;
    Ok(Json(quiz_card(&state.repo, &quiz).await?))
}

// ============================================================================
// Session Handlers
// ============================================================================

/// Handler for `POST /api/sessions`.
///
/// A bearer token, when given, ties the session's ratings to the user.
async fn create_session<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let user_id = match bearer(&headers) {
        Some(token) => Some(state.accounts.current_user(token).await?.id),
        None => None,
    };
    let (id, session) = state.sessions.create(user_id).await;
    Ok((StatusCode::CREATED, Json(SessionResponse { id, session })))
}

/// Handler for `GET /api/sessions/:id`.
async fn get_session<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let session = state.sessions.view(id).await?;
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `DELETE /api/sessions/:id`.
async fn delete_session<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    session_caller(&state, id, bearer(&headers)).await?;
    state.sessions.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/sessions/:id/select`.
///
/// Loads the quiz and all of its questions in one batch. If another
/// selection happens meanwhile, this load is dropped.
async fn select_quiz<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<SelectRequest>,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let quiz_id = request.quiz_id;
    let (ticket, _) = state
        .sessions
        .update(id, move |session| session.select_quiz(quiz_id))
        .await?;

    let loaded = match state.repo.quiz(quiz_id).await {
        Ok(quiz) => state
            .repo
            .questions(quiz_id)
            .await
            .map(|questions| (quiz, questions)),
        Err(e) => Err(e),
    };
    let load_error = loaded.as_ref().err().map(ToString::to_string);

    let (applied, session) = state
        .sessions
        .update(id, move |session| {
            Ok(match loaded {
                Ok((quiz, questions)) => {
                    session.apply_loaded(ticket, quiz, &questions, &mut rand::thread_rng())
                }
                Err(e) => session.load_failed(ticket, e.to_string()),
            })
        })
        .await?;

    if applied {
        let error = load_error.or_else(|| session.load_error.clone());
        state
            .sessions
            .events()
            .send(SessionEvent::quiz_loaded(id, session.quiz.clone(), error));
    }
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `POST /api/sessions/:id/start`.
async fn start_quiz<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let session = state.sessions.start(id).await?;
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `POST /api/sessions/:id/answer`.
async fn answer<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let ((), session) = state
        .sessions
        .update(id, move |session| session.select_answer(request.option))
        .await?;
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `POST /api/sessions/:id/next`.
async fn next_question<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let (_, session) = state.sessions.update(id, |session| session.next()).await?;
    if session.phase == SessionPhase::Completed {
        if let Some(results) = &session.results {
            state
                .sessions
                .events()
                .send(SessionEvent::completed(id, session.attempt, results));
        }
    }
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `POST /api/sessions/:id/previous`.
async fn previous_question<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let ((), session) = state
        .sessions
        .update(id, |session| session.previous())
        .await?;
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `POST /api/sessions/:id/retry`.
async fn retry<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let ((), session) = state.sessions.update(id, |session| session.retry()).await?;
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `POST /api/sessions/:id/choose-another`.
async fn choose_another<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    session_caller(&state, id, bearer(&headers)).await?;
    let ((), session) = state
        .sessions
        .update(id, |session| {
            session.choose_another();
            Ok(())
        })
        .await?;
    Ok(Json(SessionResponse { id, session }))
}

/// Handler for `POST /api/sessions/:id/rating`.
///
/// The rating of a signed-in user's session is written under their token.
async fn rate<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<RatingRequest>,
) -> ApiResult<Json<RatingResponse>> {
    let token = bearer(&headers);
    let user_id = session_caller(&state, id, token).await?;
    let repo = match (user_id, token) {
        (Some(_), Some(token)) => state.repo.acting_as(token)?,
        _ => (*state.repo).clone(),
    };
    let (draft, _) = state
        .sessions
        .update(id, move |session| session.begin_rating(request.rating, user_id))
        .await?;

    let (notice, session) = match repo.submit_rating(&draft).await {
        Ok(rating) => {
            let (_, session) = state
                .sessions
                .update(id, |session| Ok(session.rating_succeeded()))
                .await?;
            state.sessions.events().send(SessionEvent::rating_submitted(
                id,
                rating.quiz_id,
                rating.rating,
            ));
            info!(session_id = %id, quiz_id = %rating.quiz_id, "rating stored");
            (Notice::success("Thank you for rating this quiz!"), session)
        }
        Err(e) => {
            warn!(session_id = %id, error = %e, "rating not stored");
            let message = e.to_string();
            let (_, session) = state
                .sessions
                .update(id, move |session| Ok(session.rating_failed(message)))
                .await?;
            state
                .sessions
                .events()
                .send(SessionEvent::error(Some(id), e.to_string()));
            (Notice::error(&e), session)
        }
    };

    Ok(Json(RatingResponse {
        id,
        session,
        notice,
    }))
}

/// Handler for `GET /api/sessions/:id/report`.
async fn report<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    session_caller(&state, id, bearer(&headers)).await?;
    let view = state.sessions.view(id).await?;
    let (Some(results), Some(quiz)) = (view.results.as_ref(), view.quiz.as_ref()) else {
        return Err(DictError::invalid_transition(view.phase, "report").into());
    };
    let report = results.to_report(&quiz.title, Some(quiz.id))?;

    match query.format.as_deref().unwrap_or("markdown") {
        "markdown" | "md" => {
            let body = MarkdownGenerator::new(&report).generate();
            Ok((
                [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
                body,
            )
                .into_response())
        }
        "json" => {
            let body = JsonGenerator::new(&report)
                .generate_pretty()
                .map_err(DictError::from)?;
            Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
        }
        other => Err(DictError::validation(
            "format",
            format!("unknown report format '{other}'"),
        )
        .into()),
    }
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// Admits the caller to the admin panel and returns the panel acting as
/// them.
async fn admin_panel<S: Store, I: Identity>(
    state: &AppState<S, I>,
    headers: &HeaderMap,
) -> ApiResult<AdminPanel<S>> {
    let token = bearer(headers);
    state.accounts.require_admin(token).await?;
    Ok(state.admin.acting_as(token)?)
}

/// Handler for `GET /api/admin/tabs/:tab`.
async fn admin_tab<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(tab): Path<String>,
) -> ApiResult<Json<AdminListing>> {
    let admin = admin_panel(&state, &headers).await?;
    let tab: AdminTab = tab
        .parse()
        .map_err(|message: String| DictError::validation("tab", message))?;
    Ok(Json(admin.list(tab).await?))
}

/// Handler for `POST /api/admin/terms`.
async fn create_term<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Json(form): Json<TermForm>,
) -> ApiResult<(StatusCode, Json<AdminResponse<Term>>)> {
    let admin = admin_panel(&state, &headers).await?;
    let term = admin.save_term(None, &form).await?;
    Ok((StatusCode::CREATED, AdminResponse::saved("Term created", term)))
}

/// Handler for `PUT /api/admin/terms/:id`.
async fn update_term<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(form): Json<TermForm>,
) -> ApiResult<Json<AdminResponse<Term>>> {
    let admin = admin_panel(&state, &headers).await?;
    let term = admin.save_term(Some(id), &form).await?;
    Ok(AdminResponse::saved("Term updated", term))
}

/// Handler for `DELETE /api/admin/terms/:id`.
async fn delete_term<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdminResponse<()>>> {
    let admin = admin_panel(&state, &headers).await?;
    admin.delete_term(id).await?;
    Ok(AdminResponse::deleted("Term deleted"))
}

/// Handler for `POST /api/admin/topics`.
async fn create_topic<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Json(form): Json<TopicForm>,
) -> ApiResult<(StatusCode, Json<AdminResponse<Topic>>)> {
    let admin = admin_panel(&state, &headers).await?;
    let topic = admin.save_topic(None, &form).await?;
    Ok((StatusCode::CREATED, AdminResponse::saved("Topic created", topic)))
}

/// Handler for `PUT /api/admin/topics/:id`.
async fn update_topic<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(form): Json<TopicForm>,
) -> ApiResult<Json<AdminResponse<Topic>>> {
    let admin = admin_panel(&state, &headers).await?;
    let topic = admin.save_topic(Some(id), &form).await?;
    Ok(AdminResponse::saved("Topic updated", topic))
}

/// Handler for `DELETE /api/admin/topics/:id`.
async fn delete_topic<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdminResponse<()>>> {
    let admin = admin_panel(&state, &headers).await?;
    admin.delete_topic(id).await?;
    Ok(AdminResponse::deleted("Topic deleted"))
}

/// Handler for `POST /api/admin/grade-levels`.
async fn create_grade_level<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Json(form): Json<GradeLevelForm>,
) -> ApiResult<(StatusCode, Json<AdminResponse<GradeLevel>>)> {
    let admin = admin_panel(&state, &headers).await?;
    let grade = admin.save_grade_level(None, &form).await?;
    Ok((StatusCode::CREATED, AdminResponse::saved("Grade level created", grade)))
}

/// Handler for `PUT /api/admin/grade-levels/:id`.
async fn update_grade_level<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(form): Json<GradeLevelForm>,
) -> ApiResult<Json<AdminResponse<GradeLevel>>> {
    let admin = admin_panel(&state, &headers).await?;
    let grade = admin.save_grade_level(Some(id), &form).await?;
    Ok(AdminResponse::saved("Grade level updated", grade))
}

/// Handler for `DELETE /api/admin/grade-levels/:id`.
async fn delete_grade_level<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdminResponse<()>>> {
    let admin = admin_panel(&state, &headers).await?;
    admin.delete_grade_level(id).await?;
    Ok(AdminResponse::deleted("Grade level deleted"))
}

/// Handler for `POST /api/admin/quizzes`.
async fn create_quiz<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Json(form): Json<QuizForm>,
) -> ApiResult<(StatusCode, Json<AdminResponse<QuizWithQuestions>>)> {
    let admin = admin_panel(&state, &headers).await?;
    let quiz = admin.save_quiz(None, &form).await?;
    Ok((StatusCode::CREATED, AdminResponse::saved("Quiz created", quiz)))
}

/// Handler for `PUT /api/admin/quizzes/:id`.
async fn update_quiz<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(form): Json<QuizForm>,
) -> ApiResult<Json<AdminResponse<QuizWithQuestions>>> {
    let admin = admin_panel(&state, &headers).await?;
    let quiz = admin.save_quiz(Some(id), &form).await?;
    Ok(AdminResponse::saved("Quiz updated", quiz))
}

/// Handler for `DELETE /api/admin/quizzes/:id`.
async fn delete_quiz<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdminResponse<()>>> {
    let admin = admin_panel(&state, &headers).await?;
    admin.delete_quiz(id).await?;
    Ok(AdminResponse::deleted("Quiz deleted"))
}

/// Handler for `GET /api/admin/quizzes/:id/form`.
async fn quiz_form<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuizForm>> {
    let admin = admin_panel(&state, &headers).await?;
    Ok(Json(admin.quiz_form(id).await?))
}

// ============================================================================
// Account Handlers
// ============================================================================

/// Handler for `POST /api/auth/sign-in`.
async fn sign_in<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<Session>> {
    Ok(Json(state.accounts.sign_in(&credentials).await?))
}

/// Handler for `POST /api/auth/sign-up`.
async fn sign_up<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    Json(registration): Json<Registration>,
) -> ApiResult<(StatusCode, Json<SignUp>)> {
    let signed_up = state.accounts.sign_up(&registration).await?;
    Ok((StatusCode::CREATED, Json(signed_up)))
}

/// Handler for `POST /api/auth/sign-out`.
async fn sign_out<S: Store, I: Identity>(
    State(state): AppStateRef<S, I>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let token = bearer(&headers).ok_or_else(|| DictError::unauthorized("missing bearer token"))?;
    state.accounts.sign_out(token).await?;
    Ok(StatusCode::NO_CONTENT)
}
