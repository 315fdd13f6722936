use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::web::{
    AppState,
    auth::AuthUser,
    responses::{ErrorBody, json_error, message},
};

const EVENT_STATUSES: [&str; 4] = ["draft", "published", "ongoing", "ended"];
const REGISTRATION_STATUSES: [&str; 2] = ["unread", "read"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/check-slug", get(check_slug))
        .route(
            "/api/events/admin/registrations",
            get(list_registrations_admin),
        )
        .route(
            "/api/events/admin/registrations/:id/status",
            patch(update_registration_status),
        )
        .route(
            "/api/events/admin/registrations/:id",
            delete(delete_registration),
        )
        .route("/api/events/admin/:id", get(get_event_admin))
        .route("/api/events/:slug/status", patch(update_event_status))
        .route("/api/events/:slug/registrations", post(create_registration))
        .route(
            "/api/events/:slug",
            get(get_event_by_slug).put(update_event).delete(delete_event),
        )
}

type JsonResult<T> = Result<T, (StatusCode, Json<ErrorBody>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct EventRow {
    id: Uuid,
    title: String,
    subtitle: Option<String>,
    slug: String,
    description: String,
    event_intro: Option<String>,
    event_details: Option<String>,
    image: Option<String>,
    location: Option<String>,
    opening_hours: Option<String>,
    date_display: Option<String>,
    venue_map: Option<String>,
    pricing_image: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const EVENT_COLUMNS: &str = "id, title, subtitle, slug, description, event_intro, event_details, \
     image, location, opening_hours, date_display, venue_map, pricing_image, status, created_at, updated_at";

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> JsonResult<Json<Vec<EventRow>>> {
    let result = match query.status {
        Some(status) => {
            sqlx::query_as::<_, EventRow>(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE status = $1 ORDER BY created_at DESC"
            ))
            .bind(status)
            .fetch_all(state.pool_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, EventRow>(&format!(
                "SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at DESC"
            ))
            .fetch_all(state.pool_ref())
            .await
        }
    };

    result.map(Json).map_err(|err| {
        error!(?err, "failed to fetch events");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch events")
    })
}

async fn get_event_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> JsonResult<Json<EventRow>> {
    let event = sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE slug = $1"
    ))
    .bind(&slug)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch event");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch event")
    })?;

    match event {
        Some(event) if event.status == "published" => Ok(Json(event)),
        _ => Err(json_error(StatusCode::NOT_FOUND, "Event not found")),
    }
}

async fn get_event_admin(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult<Json<EventRow>> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(StatusCode::NOT_FOUND, "Event not found"));
    };

    sqlx::query_as::<_, EventRow>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
        .bind(id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch event");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch event")
        })?
        .map(Json)
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Event not found"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    title: Option<String>,
    subtitle: Option<String>,
    slug: Option<String>,
    description: Option<String>,
    event_intro: Option<String>,
    event_details: Option<String>,
    image: Option<String>,
    location: Option<String>,
    opening_hours: Option<String>,
    date_display: Option<String>,
    venue_map: Option<String>,
    pricing_image: Option<String>,
    status: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

async fn create_event(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<EventPayload>,
) -> JsonResult<impl IntoResponse> {
    let title = payload.title.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    let description = payload.description.as_deref().map(str::trim).unwrap_or("");
    if description.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Description is required",
        ));
    }
    let slug = payload.slug.as_deref().map(str::trim).unwrap_or("");
    if slug.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Slug is required"));
    }

    let event = sqlx::query_as::<_, EventRow>(&format!(
        "INSERT INTO events (id, title, subtitle, slug, description, event_intro, event_details, \
         image, location, opening_hours, date_display, venue_map, pricing_image, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         RETURNING {EVENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(title)
    .bind(trimmed(payload.subtitle))
    .bind(slug)
    .bind(description)
    .bind(trimmed(payload.event_intro))
    .bind(trimmed(payload.event_details))
    .bind(payload.image)
    .bind(payload.location)
    .bind(payload.opening_hours)
    .bind(payload.date_display)
    .bind(payload.venue_map)
    .bind(payload.pricing_image)
    .bind(payload.status.unwrap_or_else(|| "draft".to_string()))
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create event");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create event")
    })?;

    Ok((StatusCode::CREATED, Json(event)))
}

async fn update_event(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EventPayload>,
) -> JsonResult<Json<EventRow>> {
    if payload.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(json_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    if payload
        .description
        .as_deref()
        .is_some_and(|d| d.trim().is_empty())
    {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Description is required",
        ));
    }
    if payload.slug.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(json_error(StatusCode::BAD_REQUEST, "Slug is required"));
    }

    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update event",
        ));
    };

    sqlx::query_as::<_, EventRow>(&format!(
        "UPDATE events SET
             title = COALESCE($2, title),
             subtitle = COALESCE($3, subtitle),
             slug = COALESCE($4, slug),
             description = COALESCE($5, description),
             event_intro = COALESCE($6, event_intro),
             event_details = COALESCE($7, event_details),
             image = COALESCE($8, image),
             location = COALESCE($9, location),
             opening_hours = COALESCE($10, opening_hours),
             date_display = COALESCE($11, date_display),
             venue_map = COALESCE($12, venue_map),
             pricing_image = COALESCE($13, pricing_image),
             status = COALESCE($14, status),
             updated_at = NOW()
         WHERE id = $1
         RETURNING {EVENT_COLUMNS}"
    ))
    .bind(id)
    .bind(trimmed(payload.title))
    .bind(trimmed(payload.subtitle))
    .bind(trimmed(payload.slug))
    .bind(trimmed(payload.description))
    .bind(trimmed(payload.event_intro))
    .bind(trimmed(payload.event_details))
    .bind(payload.image)
    .bind(payload.location)
    .bind(payload.opening_hours)
    .bind(payload.date_display)
    .bind(payload.venue_map)
    .bind(payload.pricing_image)
    .bind(payload.status)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update event");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update event")
    })?
    .map(Json)
    .ok_or_else(|| json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update event"))
}

#[derive(Deserialize)]
struct StatusPayload {
    status: Option<String>,
}

async fn update_event_status(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<StatusPayload>,
) -> JsonResult<Json<EventRow>> {
    let status = payload.status.as_deref().map(str::trim).unwrap_or("");
    if status.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Status is required"));
    }
    if !EVENT_STATUSES.contains(&status) {
        return Err(json_error(StatusCode::BAD_REQUEST, "Invalid status value"));
    }

    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update event status",
        ));
    };

    sqlx::query_as::<_, EventRow>(&format!(
        "UPDATE events SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {EVENT_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update event status");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update event status",
        )
    })?
    .map(Json)
    .ok_or_else(|| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update event status",
        )
    })
}

#[derive(Deserialize)]
struct DeletePayload {
    password: Option<String>,
}

async fn delete_event(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<DeletePayload>,
) -> JsonResult<impl IntoResponse> {
    let Some(password) = payload.password.filter(|p| !p.is_empty()) else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Vui lòng nhập mật khẩu",
        ));
    };

    let stored_hash: Option<String> = sqlx::query_scalar("SELECT password FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch user for delete confirmation");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete event")
        })?;

    let Some(stored_hash) = stored_hash else {
        return Err(json_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    if !crate::web::auth::verify_password(&password, &stored_hash) {
        return Err(json_error(StatusCode::FORBIDDEN, "Mật khẩu không đúng"));
    }

    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete event",
        ));
    };

    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete event");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete event")
        })?;

    Ok(message("Event deleted successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckSlugQuery {
    slug: Option<String>,
    exclude_id: Option<String>,
}

#[derive(Serialize)]
struct SlugExists {
    exists: bool,
}

async fn check_slug(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<CheckSlugQuery>,
) -> JsonResult<Json<SlugExists>> {
    let Some(slug) = query.slug.filter(|s| !s.is_empty()) else {
        return Err(json_error(StatusCode::BAD_REQUEST, "Slug is required"));
    };

    let sanitized = slug.trim().to_lowercase();
    let exclude = query.exclude_id.and_then(|id| Uuid::parse_str(&id).ok());

    slug_exists(state.pool_ref(), "events", &sanitized, exclude)
        .await
        .map(|exists| Json(SlugExists { exists }))
        .map_err(|err| {
            error!(?err, "failed to check event slug");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to check slug")
        })
}

pub async fn slug_exists(
    pool: &PgPool,
    table: &str,
    slug: &str,
    exclude_id: Option<Uuid>,
) -> sqlx::Result<bool> {
    let query = match exclude_id {
        Some(_) => format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE slug = $1 AND id <> $2)"),
        None => format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE slug = $1)"),
    };

    let mut q = sqlx::query_scalar::<_, bool>(&query).bind(slug);
    if let Some(id) = exclude_id {
        q = q.bind(id);
    }
    q.fetch_one(pool).await
}

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct RegistrationRow {
    id: Uuid,
    event_id: Uuid,
    full_name: String,
    email: Option<String>,
    phone: String,
    note: Option<String>,
    status: String,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationPayload {
    full_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    note: Option<String>,
}

#[derive(Serialize)]
struct RegistrationCreated {
    message: String,
    data: RegistrationRow,
}

async fn create_registration(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<RegistrationPayload>,
) -> JsonResult<impl IntoResponse> {
    let full_name = payload.full_name.as_deref().map(str::trim).unwrap_or("");
    if full_name.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Họ và tên là bắt buộc",
        ));
    }
    let phone = payload.phone.as_deref().map(str::trim).unwrap_or("");
    if phone.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Số điện thoại là bắt buộc",
        ));
    }

    let event: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, status FROM events WHERE slug = $1")
            .bind(&slug)
            .fetch_optional(state.pool_ref())
            .await
            .map_err(|err| {
                error!(?err, "failed to fetch event for registration");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Không thể đăng ký tham gia sự kiện",
                )
            })?;

    let event_id = match event {
        Some((id, status)) if status == "published" => id,
        _ => {
            return Err(json_error(
                StatusCode::NOT_FOUND,
                "Sự kiện không tồn tại hoặc chưa được xuất bản",
            ));
        }
    };

    let registration = sqlx::query_as::<_, RegistrationRow>(
        "INSERT INTO event_registrations (id, event_id, full_name, email, phone, note, status)
         VALUES ($1, $2, $3, $4, $5, $6, 'unread')
         RETURNING id, event_id, full_name, email, phone, note, status, read_at, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(event_id)
    .bind(full_name)
    .bind(trimmed(payload.email).filter(|e| !e.is_empty()))
    .bind(phone)
    .bind(trimmed(payload.note).filter(|n| !n.is_empty()))
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create event registration");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Không thể đăng ký tham gia sự kiện",
        )
    })?;

    Ok((
        StatusCode::CREATED,
        Json(RegistrationCreated {
            message: "Đăng ký thành công".to_string(),
            data: registration,
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventRef {
    id: Uuid,
    title: String,
    slug: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationWithEvent {
    #[serde(flatten)]
    registration: RegistrationRow,
    event: EventRef,
}

#[derive(sqlx::FromRow)]
struct RegistrationJoinRow {
    id: Uuid,
    event_id: Uuid,
    full_name: String,
    email: Option<String>,
    phone: String,
    note: Option<String>,
    status: String,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    event_title: String,
    event_slug: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationsQuery {
    event_id: Option<String>,
}

async fn list_registrations_admin(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<RegistrationsQuery>,
) -> JsonResult<Json<Vec<RegistrationWithEvent>>> {
    const SELECT: &str = "SELECT r.id, r.event_id, r.full_name, r.email, r.phone, r.note, \
         r.status, r.read_at, r.created_at, r.updated_at, e.title AS event_title, e.slug AS event_slug
         FROM event_registrations r JOIN events e ON e.id = r.event_id";

    let event_filter = query.event_id.and_then(|id| Uuid::parse_str(&id).ok());

    let rows = match event_filter {
        Some(event_id) => {
            sqlx::query_as::<_, RegistrationJoinRow>(&format!(
                "{SELECT} WHERE r.event_id = $1 ORDER BY r.created_at DESC"
            ))
            .bind(event_id)
            .fetch_all(state.pool_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, RegistrationJoinRow>(&format!(
                "{SELECT} ORDER BY r.created_at DESC"
            ))
            .fetch_all(state.pool_ref())
            .await
        }
    }
    .map_err(|err| {
        error!(?err, "failed to fetch event registrations");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Không thể tải danh sách đăng ký",
        )
    })?;

    let registrations = rows
        .into_iter()
        .map(|row| RegistrationWithEvent {
            event: EventRef {
                id: row.event_id,
                title: row.event_title,
                slug: row.event_slug,
            },
            registration: RegistrationRow {
                id: row.id,
                event_id: row.event_id,
                full_name: row.full_name,
                email: row.email,
                phone: row.phone,
                note: row.note,
                status: row.status,
                read_at: row.read_at,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        })
        .collect();

    Ok(Json(registrations))
}

async fn update_registration_status(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<StatusPayload>,
) -> JsonResult<Json<RegistrationRow>> {
    let Some(status) = payload.status.filter(|s| REGISTRATION_STATUSES.contains(&s.as_str()))
    else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Trạng thái không hợp lệ",
        ));
    };

    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(StatusCode::BAD_REQUEST, "ID là bắt buộc"));
    };

    let read_at = if status == "read" {
        Some(Utc::now())
    } else {
        None
    };

    sqlx::query_as::<_, RegistrationRow>(
        "UPDATE event_registrations SET status = $2, read_at = $3, updated_at = NOW()
         WHERE id = $1
         RETURNING id, event_id, full_name, email, phone, note, status, read_at, created_at, updated_at",
    )
    .bind(id)
    .bind(status)
    .bind(read_at)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update registration status");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Không thể cập nhật trạng thái",
        )
    })?
    .map(Json)
    .ok_or_else(|| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Không thể cập nhật trạng thái",
        )
    })
}

async fn delete_registration(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(StatusCode::BAD_REQUEST, "ID là bắt buộc"));
    };

    sqlx::query("DELETE FROM event_registrations WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete registration");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Không thể xóa đăng ký")
        })?;

    Ok(message("Đã xóa đăng ký thành công"))
}
