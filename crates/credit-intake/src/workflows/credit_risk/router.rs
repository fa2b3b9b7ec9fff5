use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::repository::{RepositoryError, SessionId, SessionRepository};
use super::responses::raw_answer;
use super::schema::SchemaError;
use super::service::{QuestionnaireService, QuestionnaireServiceError};
use super::session::{PresentationMode, SessionError};
use super::submission::ScoringService;

/// Router builder exposing the questionnaire session endpoints.
pub fn questionnaire_router<R, S>(service: Arc<QuestionnaireService<R, S>>) -> Router
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    Router::new()
        .route("/api/v1/credit/schema", get(schema_handler::<R, S>))
        .route("/api/v1/credit/sessions", post(start_handler::<R, S>))
        .route(
            "/api/v1/credit/sessions/:session_id",
            get(status_handler::<R, S>).delete(discard_handler::<R, S>),
        )
        .route(
            "/api/v1/credit/sessions/:session_id/responses/:field_id",
            put(answer_handler::<R, S>),
        )
        .route(
            "/api/v1/credit/sessions/:session_id/next",
            post(next_handler::<R, S>),
        )
        .route(
            "/api/v1/credit/sessions/:session_id/back",
            post(back_handler::<R, S>),
        )
        .route(
            "/api/v1/credit/sessions/:session_id/submit",
            post(submit_handler::<R, S>),
        )
        .route(
            "/api/v1/credit/sessions/:session_id/retry",
            post(retry_handler::<R, S>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartRequest {
    #[serde(default)]
    mode: Option<PresentationMode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    #[serde(default)]
    value: Value,
}

pub(crate) async fn schema_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    let payload = json!({
        "default_mode": service.default_mode(),
        "fields": service.schema_view(),
    });
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn start_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    body: Bytes,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    // An empty body starts a session in the configured default mode.
    let mode = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<StartRequest>(&body) {
            Ok(request) => request.mode,
            Err(err) => {
                let payload = json!({ "error": format!("invalid session request: {err}") });
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
            }
        }
    };
    match service.start(mode) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    match service.get(&SessionId(session_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn discard_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    match service.discard(&SessionId(session_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn answer_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    Path((session_id, field_id)): Path<(String, String)>,
    Json(request): Json<AnswerRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    let Some(raw) = raw_answer(&request.value) else {
        let payload = json!({
            "error": "value must be a string, number, boolean, or null",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
    };

    match service.answer(&SessionId(session_id), &field_id, &raw) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn next_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    match service.advance(&SessionId(session_id)).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn back_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    match service.retreat(&SessionId(session_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    match service.submit(&SessionId(session_id)).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn retry_handler<R, S>(
    State(service): State<Arc<QuestionnaireService<R, S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    match service.retry(&SessionId(session_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: QuestionnaireServiceError) -> Response {
    let (status, payload) = match err {
        QuestionnaireServiceError::Repository(RepositoryError::NotFound) => (
            StatusCode::NOT_FOUND,
            json!({ "error": "session not found" }),
        ),
        QuestionnaireServiceError::Repository(RepositoryError::Conflict) => (
            StatusCode::CONFLICT,
            json!({ "error": "session already exists" }),
        ),
        QuestionnaireServiceError::Repository(other @ RepositoryError::Unavailable(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": other.to_string() }),
        ),
        QuestionnaireServiceError::Session(SessionError::Schema(SchemaError::UnknownField(
            field,
        ))) => (
            StatusCode::NOT_FOUND,
            json!({ "error": format!("unknown field '{field}'") }),
        ),
        QuestionnaireServiceError::Session(SessionError::Rejected { field, message }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": message.clone(),
                "errors": { field: message },
            }),
        ),
        QuestionnaireServiceError::Session(SessionError::Incomplete(missing)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": SessionError::Incomplete(missing.clone()).to_string(),
                "errors": missing,
            }),
        ),
        QuestionnaireServiceError::Session(
            other @ (SessionError::SubmissionPending
            | SessionError::Closed
            | SessionError::FieldNotReached(_)
            | SessionError::NotInWizardMode
            | SessionError::AwaitingRetry
            | SessionError::NothingToRetry),
        ) => (StatusCode::CONFLICT, json!({ "error": other.to_string() })),
    };
    (status, Json(payload)).into_response()
}
