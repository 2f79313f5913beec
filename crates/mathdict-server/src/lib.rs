//! mathdict Server
//!
//! HTTP API over the dictionary, the quiz session registry with its
//! countdowns, and the WebSocket event stream.

pub mod api;
pub mod sessions;
pub mod websocket;

pub use api::{
    create_router, AdminResponse, AnswerRequest, ApiError, AppState, ErrorResponse,
    RatingRequest, RatingResponse, ReportQuery, SelectRequest, SessionResponse, TermsQuery,
};
pub use sessions::SessionRegistry;
pub use websocket::{EventBroadcaster, SessionEvent};
