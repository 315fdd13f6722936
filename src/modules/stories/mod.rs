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

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stories", get(list_stories).post(create_story))
        .route(
            "/api/stories/:id",
            get(get_story).put(update_story).delete(delete_story),
        )
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct StoryRow {
    id: Uuid,
    title: String,
    slug: String,
    content: String,
    author: Option<String>,
    author_email: Option<String>,
    image: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const STORY_COLUMNS: &str =
    "id, title, slug, content, author, author_email, image, status, created_at, updated_at";

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_stories(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> EnvelopeResult<impl IntoResponse> {
    let result = match query.status {
        Some(status) => {
            sqlx::query_as::<_, StoryRow>(&format!(
                "SELECT {STORY_COLUMNS} FROM stories WHERE status = $1 ORDER BY created_at DESC"
            ))
            .bind(status)
            .fetch_all(state.pool_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, StoryRow>(&format!(
                "SELECT {STORY_COLUMNS} FROM stories ORDER BY created_at DESC"
            ))
            .fetch_all(state.pool_ref())
            .await
        }
    };

    result.map(envelope).map_err(|err| {
        error!(?err, "failed to fetch stories");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch stories")
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryPayload {
    title: Option<String>,
    content: Option<String>,
    author: Option<String>,
    author_email: Option<String>,
    image: Option<String>,
}

async fn create_story(
    State(state): State<AppState>,
    Json(payload): Json<StoryPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let title = payload.title.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() {
        return Err(envelope_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    let content = payload.content.as_deref().map(str::trim).unwrap_or("");
    if content.is_empty() {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Content is required",
        ));
    }

    let slug = utils::story_slug(title);

    let optional = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let story = sqlx::query_as::<_, StoryRow>(&format!(
        "INSERT INTO stories (id, title, slug, content, author, author_email, image, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
         RETURNING {STORY_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(title)
    .bind(&slug)
    .bind(content)
    .bind(optional(payload.author))
    .bind(optional(payload.author_email))
    .bind(optional(payload.image))
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create story");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create story")
    })?;

    Ok((StatusCode::CREATED, envelope(story)))
}

async fn get_story(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(StatusCode::NOT_FOUND, "Story not found"));
    };

    sqlx::query_as::<_, StoryRow>(&format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = $1"))
        .bind(id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch story");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch story")
        })?
        .map(envelope)
        .ok_or_else(|| envelope_error(StatusCode::NOT_FOUND, "Story not found"))
}

#[derive(Deserialize)]
struct UpdatePayload {
    status: Option<String>,
}

async fn update_story(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update story",
        ));
    };

    sqlx::query_as::<_, StoryRow>(&format!(
        "UPDATE stories SET status = COALESCE($2, status), updated_at = NOW()
         WHERE id = $1 RETURNING {STORY_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.status)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update story");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update story")
    })?
    .map(envelope)
    .ok_or_else(|| envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update story"))
}

async fn delete_story(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete story",
        ));
    };

    sqlx::query("DELETE FROM stories WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete story");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete story")
        })?;

    Ok(envelope_message("Story deleted successfully"))
}
