use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{
    utils,
    web::{
        AppState,
        auth::AuthUser,
        responses::{EnvelopeError, envelope, envelope_error, envelope_message},
    },
};

const ANONYMOUS_SUBMITTER: &str = "Ẩn danh";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ideas", get(list_ideas).post(create_idea))
        .route(
            "/api/ideas/:id",
            axum::routing::put(update_idea).delete(delete_idea),
        )
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct IdeaRow {
    id: Uuid,
    title: String,
    description: String,
    submitter: String,
    email: String,
    phone: Option<String>,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const IDEA_COLUMNS: &str =
    "id, title, description, submitter, email, phone, status, notes, created_at, updated_at";

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_ideas(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> EnvelopeResult<impl IntoResponse> {
    let result = match query.status {
        Some(status) => {
            sqlx::query_as::<_, IdeaRow>(&format!(
                "SELECT {IDEA_COLUMNS} FROM ideas WHERE status = $1 ORDER BY created_at DESC"
            ))
            .bind(status)
            .fetch_all(state.pool_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, IdeaRow>(&format!(
                "SELECT {IDEA_COLUMNS} FROM ideas ORDER BY created_at DESC"
            ))
            .fetch_all(state.pool_ref())
            .await
        }
    };

    result.map(envelope).map_err(|err| {
        error!(?err, "failed to fetch ideas");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch ideas")
    })
}

#[derive(Deserialize)]
struct IdeaPayload {
    title: Option<String>,
    description: Option<String>,
    email: Option<String>,
    submitter: Option<String>,
    phone: Option<String>,
    status: Option<String>,
    notes: Option<String>,
}

async fn create_idea(
    State(state): State<AppState>,
    Json(payload): Json<IdeaPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let title = payload.title.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() {
        return Err(envelope_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    let description = payload.description.as_deref().map(str::trim).unwrap_or("");
    if description.is_empty() {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Description is required",
        ));
    }
    let email = payload.email.as_deref().map(str::trim).unwrap_or("");
    if email.is_empty() {
        return Err(envelope_error(StatusCode::BAD_REQUEST, "Email is required"));
    }

    let submitter = payload
        .submitter
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_SUBMITTER);
    let phone = payload
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let idea = sqlx::query_as::<_, IdeaRow>(&format!(
        "INSERT INTO ideas (id, title, description, email, submitter, phone, status)
         VALUES ($1, $2, $3, $4, $5, $6, 'pending')
         RETURNING {IDEA_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(utils::collapse_whitespace(title))
    .bind(description)
    .bind(email)
    .bind(submitter)
    .bind(phone)
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create idea");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create idea")
    })?;

    Ok((StatusCode::CREATED, envelope(idea)))
}

async fn update_idea(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<IdeaPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update idea",
        ));
    };

    let trim = |value: Option<String>| value.map(|v| v.trim().to_string());

    sqlx::query_as::<_, IdeaRow>(&format!(
        "UPDATE ideas SET
             title = COALESCE($2, title),
             description = COALESCE($3, description),
             email = COALESCE($4, email),
             submitter = COALESCE($5, submitter),
             phone = COALESCE($6, phone),
             status = COALESCE($7, status),
             notes = COALESCE($8, notes),
             updated_at = NOW()
         WHERE id = $1
         RETURNING {IDEA_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.title.map(|t| utils::collapse_whitespace(&t)))
    .bind(trim(payload.description))
    .bind(trim(payload.email))
    .bind(trim(payload.submitter))
    .bind(trim(payload.phone))
    .bind(payload.status)
    .bind(trim(payload.notes))
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update idea");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update idea")
    })?
    .map(envelope)
    .ok_or_else(|| envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update idea"))
}

async fn delete_idea(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete idea",
        ));
    };

    sqlx::query("DELETE FROM ideas WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete idea");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete idea")
        })?;

    Ok(envelope_message("Idea deleted successfully"))
}
