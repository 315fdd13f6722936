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

use crate::web::{
    AppState,
    auth::AuthUser,
    responses::{EnvelopeError, envelope, envelope_error, envelope_message},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/press", get(list_press).post(create_press))
        .route(
            "/api/press/:id",
            get(get_press)
                .put(update_press)
                .patch(update_press)
                .delete(delete_press),
        )
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct PressRow {
    id: i32,
    source: String,
    title: String,
    description: Option<String>,
    date: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    kind: String,
    link: Option<String>,
    image: Option<String>,
    featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PRESS_COLUMNS: &str =
    "id, source, title, description, date, type, link, image, featured, created_at, updated_at";

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    featured: Option<String>,
}

async fn list_press(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> EnvelopeResult<impl IntoResponse> {
    let mut sql = format!("SELECT {PRESS_COLUMNS} FROM press WHERE TRUE");
    let mut placeholder = 0;
    if query.kind.is_some() {
        placeholder += 1;
        sql.push_str(&format!(" AND type = ${placeholder}"));
    }
    if query.featured.is_some() {
        placeholder += 1;
        sql.push_str(&format!(" AND featured = ${placeholder}"));
    }
    sql.push_str(" ORDER BY date DESC");

    let mut q = sqlx::query_as::<_, PressRow>(&sql);
    if let Some(kind) = &query.kind {
        q = q.bind(kind);
    }
    if let Some(featured) = &query.featured {
        q = q.bind(featured == "true");
    }

    let press = q.fetch_all(state.pool_ref()).await.map_err(|err| {
        error!(?err, "failed to fetch press");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch press")
    })?;

    Ok(envelope(press))
}

fn parse_press_id(raw: &str) -> Result<i32, (StatusCode, Json<EnvelopeError>)> {
    raw.parse()
        .map_err(|_| envelope_error(StatusCode::BAD_REQUEST, "Invalid press id"))
}

async fn get_press(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let id = parse_press_id(&id)?;

    sqlx::query_as::<_, PressRow>(&format!("SELECT {PRESS_COLUMNS} FROM press WHERE id = $1"))
        .bind(id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch press item");
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch press item",
            )
        })?
        .map(envelope)
        .ok_or_else(|| envelope_error(StatusCode::NOT_FOUND, "Press item not found"))
}

#[derive(Deserialize)]
struct PressPayload {
    source: Option<String>,
    title: Option<String>,
    description: Option<String>,
    date: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    link: Option<String>,
    image: Option<String>,
    featured: Option<bool>,
}

async fn create_press(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PressPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let press = sqlx::query_as::<_, PressRow>(&format!(
        "INSERT INTO press (source, title, description, date, type, link, image, featured)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {PRESS_COLUMNS}"
    ))
    .bind(payload.source.unwrap_or_default())
    .bind(payload.title.unwrap_or_default())
    .bind(payload.description)
    .bind(payload.date.unwrap_or_default())
    .bind(payload.kind.unwrap_or_else(|| "article".to_string()))
    .bind(payload.link)
    .bind(payload.image)
    .bind(payload.featured.unwrap_or_default())
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create press item");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create press item",
        )
    })?;

    Ok((StatusCode::CREATED, envelope(press)))
}

async fn update_press(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PressPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let id = parse_press_id(&id)?;

    sqlx::query_as::<_, PressRow>(&format!(
        "UPDATE press SET
             source = COALESCE($2, source),
             title = COALESCE($3, title),
             description = COALESCE($4, description),
             date = COALESCE($5, date),
             type = COALESCE($6, type),
             link = COALESCE($7, link),
             image = COALESCE($8, image),
             featured = COALESCE($9, featured),
             updated_at = NOW()
         WHERE id = $1
         RETURNING {PRESS_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.source)
    .bind(payload.title)
    .bind(payload.description)
    .bind(payload.date)
    .bind(payload.kind)
    .bind(payload.link)
    .bind(payload.image)
    .bind(payload.featured)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update press item");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update press item",
        )
    })?
    .map(envelope)
    .ok_or_else(|| {
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update press item",
        )
    })
}

async fn delete_press(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let id = parse_press_id(&id)?;

    sqlx::query("DELETE FROM press WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete press item");
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete press item",
            )
        })?;

    Ok(envelope_message("Press item deleted successfully"))
}
