use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::web::{
    AppState,
    auth::AuthUser,
    responses::{EnvelopeError, envelope, envelope_error},
};

const DEFAULT_KEY: &str = "default";

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/talk-section",
        get(get_talk_section).put(upsert_talk_section),
    )
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct TalkSectionRow {
    key: String,
    title: Option<String>,
    description: Option<String>,
    live_input: Option<String>,
    replay_input: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const TALK_COLUMNS: &str =
    "key, title, description, live_input, replay_input, created_at, updated_at";

async fn get_talk_section(State(state): State<AppState>) -> EnvelopeResult<impl IntoResponse> {
    let section = sqlx::query_as::<_, TalkSectionRow>(&format!(
        "SELECT {TALK_COLUMNS} FROM talk_section WHERE key = $1"
    ))
    .bind(DEFAULT_KEY)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch talk section");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch talk section",
        )
    })?;

    Ok(envelope(section))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertPayload {
    title: Option<String>,
    description: Option<String>,
    live_input: Option<String>,
    replay_input: Option<String>,
}

async fn upsert_talk_section(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpsertPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let section = sqlx::query_as::<_, TalkSectionRow>(&format!(
        "INSERT INTO talk_section (key, title, description, live_input, replay_input)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (key) DO UPDATE SET
             title = EXCLUDED.title,
             description = EXCLUDED.description,
             live_input = EXCLUDED.live_input,
             replay_input = EXCLUDED.replay_input,
             updated_at = NOW()
         RETURNING {TALK_COLUMNS}"
    ))
    .bind(DEFAULT_KEY)
    .bind(payload.title)
    .bind(payload.description)
    .bind(payload.live_input)
    .bind(payload.replay_input)
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to save talk section");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save talk section",
        )
    })?;

    Ok(envelope(section))
}
