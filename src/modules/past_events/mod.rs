use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::{
    modules::events::slug_exists,
    web::{
        AppState,
        auth::AuthUser,
        responses::{ErrorBody, json_error, message},
    },
};

const MAX_FEATURE_IMAGES: usize = 4;
const MAX_GALLERY_IMAGES: usize = 9;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/past-events", get(list_past_events).post(create_past_event))
        .route("/api/past-events/years", get(year_groups))
        .route("/api/past-events/check-slug", get(check_slug))
        .route(
            "/api/past-events/:id",
            get(get_past_event)
                .put(update_past_event)
                .delete(delete_past_event),
        )
}

type JsonResult<T> = Result<T, (StatusCode, Json<ErrorBody>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct PastEventRow {
    id: Uuid,
    title: String,
    slug: String,
    subtitle: Option<String>,
    description: Option<String>,
    thumbnail_image: Option<String>,
    year: i32,
    hero: Value,
    intro: Value,
    feature_list: Value,
    gallery: Value,
    conclusion: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PAST_EVENT_COLUMNS: &str = "id, title, slug, subtitle, description, thumbnail_image, year, \
     hero, intro, feature_list, gallery, conclusion, created_at, updated_at";

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct PastEventListRow {
    id: Uuid,
    title: String,
    slug: String,
    description: Option<String>,
    thumbnail_image: Option<String>,
    year: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Payload validation. Mirrors the admin form contract: structured documents
// for the hero, intro, feature list, gallery and conclusion sections, each
// with its own rules, reported back as `{ formErrors, fieldErrors }`.

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrors {
    form_errors: Vec<String>,
    field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hero {
    #[serde(default)]
    background_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Intro {
    #[serde(default)]
    content: String,
    #[serde(default = "default_align")]
    align: String,
}

fn default_align() -> String {
    "start".to_string()
}

#[derive(Debug, Deserialize)]
struct FeatureItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FeatureList {
    #[serde(default)]
    items: Vec<FeatureItem>,
}

#[derive(Debug, Deserialize)]
struct GalleryImage {
    #[serde(default)]
    url: String,
    #[serde(default)]
    alt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Gallery {
    #[serde(default)]
    images: Vec<GalleryImage>,
}

#[derive(Debug, Deserialize)]
struct Conclusion {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PastEventPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnail_image: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    hero: Option<Value>,
    #[serde(default)]
    intro: Option<Value>,
    #[serde(default)]
    feature_list: Option<Value>,
    #[serde(default)]
    gallery: Option<Value>,
    #[serde(default)]
    conclusion: Option<Value>,
}

#[derive(Debug)]
struct PreparedPastEvent {
    title: String,
    slug: String,
    subtitle: Option<String>,
    description: Option<String>,
    thumbnail_image: Option<String>,
    year: i32,
    hero: Value,
    intro: Value,
    feature_list: Value,
    gallery: Value,
    conclusion: Value,
}

fn is_image_url(value: &str) -> bool {
    value.starts_with("/uploads/") || value.starts_with("http://") || value.starts_with("https://")
}

fn prepare(payload: PastEventPayload) -> Result<PreparedPastEvent, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let title = payload.title.unwrap_or_default();
    if title.is_empty() {
        errors.push("title", "Title is required");
    }
    let slug = payload.slug.unwrap_or_default();
    if slug.is_empty() {
        errors.push("slug", "Slug is required");
    }
    let year = payload.year;
    if year.is_none() {
        errors.push("year", "Year is required");
    }
    if let Some(thumbnail) = payload.thumbnail_image.as_deref() {
        if !is_image_url(thumbnail) {
            errors.push("thumbnailImage", "Invalid image URL");
        }
    }

    // Invalid hero documents degrade to an empty hero rather than failing.
    let hero = payload
        .hero
        .and_then(|value| serde_json::from_value::<Hero>(value).ok())
        .and_then(|hero| hero.background_image)
        .filter(|url| !url.is_empty() && is_image_url(url))
        .map(|url| serde_json::json!({ "backgroundImage": url }))
        .unwrap_or_else(|| serde_json::json!({}));

    let intro = match payload
        .intro
        .ok_or(())
        .and_then(|value| serde_json::from_value::<Intro>(value).map_err(|_| ()))
    {
        Ok(intro) => {
            if intro.content.is_empty() {
                errors.push("intro", "Intro content is required");
            }
            if intro.align != "start" && intro.align != "center" {
                errors.push("intro", "Intro align must be start or center");
            }
            serde_json::json!({ "content": intro.content, "align": intro.align })
        }
        Err(()) => {
            errors.push("intro", "Intro content is required");
            Value::Null
        }
    };

    let feature_list = match payload
        .feature_list
        .ok_or(())
        .and_then(|value| serde_json::from_value::<FeatureList>(value).map_err(|_| ()))
    {
        Ok(list) => {
            if list.items.is_empty() {
                errors.push("featureList", "Feature list requires at least one item");
            }
            for (index, item) in list.items.iter().enumerate() {
                if item.title.is_empty() {
                    errors.push("featureList", format!("Feature item {index} title is required"));
                }
                if item.content.is_empty() {
                    errors.push(
                        "featureList",
                        format!("Feature item {index} content is required"),
                    );
                }
                if let Some(images) = &item.images {
                    if images.len() > MAX_FEATURE_IMAGES {
                        errors.push(
                            "featureList",
                            format!("Feature item {index} allows at most {MAX_FEATURE_IMAGES} images"),
                        );
                    }
                    if images.iter().any(|url| !is_image_url(url)) {
                        errors.push(
                            "featureList",
                            format!("Feature item {index} has an invalid image URL"),
                        );
                    }
                }
            }
            serde_json::json!({
                "items": list
                    .items
                    .iter()
                    .map(|item| serde_json::json!({
                        "title": item.title,
                        "subtitle": item.subtitle,
                        "content": item.content,
                        "images": item.images,
                    }))
                    .collect::<Vec<_>>()
            })
        }
        Err(()) => {
            errors.push("featureList", "Feature list requires at least one item");
            Value::Null
        }
    };

    let gallery = match payload
        .gallery
        .ok_or(())
        .and_then(|value| serde_json::from_value::<Gallery>(value).map_err(|_| ()))
    {
        Ok(gallery) => {
            if gallery.images.len() > MAX_GALLERY_IMAGES {
                errors.push(
                    "gallery",
                    format!("Gallery allows at most {MAX_GALLERY_IMAGES} images"),
                );
            }
            for image in &gallery.images {
                if !is_image_url(&image.url) {
                    errors.push("gallery", "Gallery image URL is invalid");
                }
            }
            serde_json::json!({
                "images": gallery
                    .images
                    .iter()
                    .map(|image| serde_json::json!({ "url": image.url, "alt": image.alt }))
                    .collect::<Vec<_>>()
            })
        }
        Err(()) => {
            errors.push("gallery", "Gallery is required");
            Value::Null
        }
    };

    let conclusion = match payload
        .conclusion
        .ok_or(())
        .and_then(|value| serde_json::from_value::<Conclusion>(value).map_err(|_| ()))
    {
        Ok(conclusion) => {
            if conclusion.content.is_empty() {
                errors.push("conclusion", "Conclusion content is required");
            }
            serde_json::json!({ "content": conclusion.content })
        }
        Err(()) => {
            errors.push("conclusion", "Conclusion content is required");
            Value::Null
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(PreparedPastEvent {
        title,
        slug,
        subtitle: payload.subtitle,
        description: payload.description,
        thumbnail_image: payload.thumbnail_image,
        year: year.unwrap_or_default(),
        hero,
        intro,
        feature_list,
        gallery,
        conclusion,
    })
}

#[derive(Serialize)]
struct ValidationErrorBody {
    error: ValidationErrors,
}

fn validation_response(errors: ValidationErrors) -> (StatusCode, Json<ValidationErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ValidationErrorBody { error: errors }),
    )
}

// ---------------------------------------------------------------------------
// Handlers.

#[derive(Deserialize)]
struct ListQuery {
    year: Option<String>,
}

async fn list_past_events(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> JsonResult<Json<Vec<PastEventListRow>>> {
    const LIST_COLUMNS: &str =
        "id, title, slug, description, thumbnail_image, year, created_at, updated_at";

    let year = query.year.and_then(|raw| raw.parse::<i32>().ok());

    let result = match year {
        Some(year) => {
            sqlx::query_as::<_, PastEventListRow>(&format!(
                "SELECT {LIST_COLUMNS} FROM past_events WHERE year = $1 \
                 ORDER BY year DESC, created_at DESC"
            ))
            .bind(year)
            .fetch_all(state.pool_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, PastEventListRow>(&format!(
                "SELECT {LIST_COLUMNS} FROM past_events ORDER BY year DESC, created_at DESC"
            ))
            .fetch_all(state.pool_ref())
            .await
        }
    };

    result.map(Json).map_err(|err| {
        error!(?err, "failed to fetch past events");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch past events",
        )
    })
}

#[derive(Serialize)]
struct YearGroup {
    year: i32,
    #[serde(rename = "_count")]
    count: YearCount,
}

#[derive(Serialize)]
struct YearCount {
    id: i64,
}

async fn year_groups(State(state): State<AppState>) -> JsonResult<Json<Vec<YearGroup>>> {
    let rows: Vec<(i32, i64)> = sqlx::query_as(
        "SELECT year, COUNT(id) FROM past_events GROUP BY year ORDER BY year DESC",
    )
    .fetch_all(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch year groups");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch year groups",
        )
    })?;

    Ok(Json(
        rows.into_iter()
            .map(|(year, id)| YearGroup {
                year,
                count: YearCount { id },
            })
            .collect(),
    ))
}

async fn get_past_event(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> JsonResult<Json<PastEventRow>> {
    let by_slug = sqlx::query_as::<_, PastEventRow>(&format!(
        "SELECT {PAST_EVENT_COLUMNS} FROM past_events WHERE slug = $1"
    ))
    .bind(&slug)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch past event");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch past event",
        )
    })?;

    let event = match by_slug {
        Some(event) => Some(event),
        // The admin preview links by id; fall back when the slug misses.
        None => match Uuid::parse_str(&slug) {
            Ok(id) => sqlx::query_as::<_, PastEventRow>(&format!(
                "SELECT {PAST_EVENT_COLUMNS} FROM past_events WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(state.pool_ref())
            .await
            .map_err(|err| {
                error!(?err, "failed to fetch past event by id");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to fetch past event",
                )
            })?,
            Err(_) => None,
        },
    };

    event
        .map(Json)
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Event not found"))
}

async fn create_past_event(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PastEventPayload>,
) -> Result<impl IntoResponse, axum::response::Response> {
    let prepared = prepare(payload)
        .map_err(|errors| validation_response(errors).into_response())?;

    let event = sqlx::query_as::<_, PastEventRow>(&format!(
        "INSERT INTO past_events (id, title, slug, subtitle, description, thumbnail_image, year, \
         hero, intro, feature_list, gallery, conclusion)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING {PAST_EVENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&prepared.title)
    .bind(&prepared.slug)
    .bind(&prepared.subtitle)
    .bind(&prepared.description)
    .bind(&prepared.thumbnail_image)
    .bind(prepared.year)
    .bind(&prepared.hero)
    .bind(&prepared.intro)
    .bind(&prepared.feature_list)
    .bind(&prepared.gallery)
    .bind(&prepared.conclusion)
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create past event");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create past event",
        )
        .into_response()
    })?;

    Ok((StatusCode::CREATED, Json(event)))
}

async fn update_past_event(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PastEventPayload>,
) -> Result<Json<PastEventRow>, axum::response::Response> {
    let prepared = prepare(payload)
        .map_err(|errors| validation_response(errors).into_response())?;

    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update past event",
        )
        .into_response());
    };

    sqlx::query_as::<_, PastEventRow>(&format!(
        "UPDATE past_events SET
             title = $2, slug = $3, subtitle = $4, description = $5, thumbnail_image = $6,
             year = $7, hero = $8, intro = $9, feature_list = $10, gallery = $11,
             conclusion = $12, updated_at = NOW()
         WHERE id = $1
         RETURNING {PAST_EVENT_COLUMNS}"
    ))
    .bind(id)
    .bind(&prepared.title)
    .bind(&prepared.slug)
    .bind(&prepared.subtitle)
    .bind(&prepared.description)
    .bind(&prepared.thumbnail_image)
    .bind(prepared.year)
    .bind(&prepared.hero)
    .bind(&prepared.intro)
    .bind(&prepared.feature_list)
    .bind(&prepared.gallery)
    .bind(&prepared.conclusion)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update past event");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update past event",
        )
        .into_response()
    })?
    .map(Json)
    .ok_or_else(|| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update past event",
        )
        .into_response()
    })
}

async fn delete_past_event(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete past event",
        ));
    };

    sqlx::query("DELETE FROM past_events WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete past event");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete past event",
            )
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

    slug_exists(state.pool_ref(), "past_events", &sanitized, exclude)
        .await
        .map(|exists| Json(SlugExists { exists }))
        .map_err(|err| {
            error!(?err, "failed to check past event slug");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to check slug")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> PastEventPayload {
        serde_json::from_value(json!({
            "title": "Sắc Hội Trăng Thu",
            "slug": "sac-hoi-trang-thu",
            "year": 2024,
            "hero": { "backgroundImage": "/uploads/hero.jpg" },
            "intro": { "content": "Giới thiệu", "align": "center" },
            "featureList": { "items": [
                { "title": "Hoạt động", "content": "Làm lồng đèn", "images": ["/uploads/a.jpg"] }
            ] },
            "gallery": { "images": [{ "url": "https://cdn.example.com/1.jpg", "alt": "ảnh" }] },
            "conclusion": { "content": "Kết" }
        }))
        .unwrap()
    }

    #[test]
    fn valid_payload_passes() {
        let prepared = prepare(valid_payload()).unwrap();
        assert_eq!(prepared.title, "Sắc Hội Trăng Thu");
        assert_eq!(prepared.hero["backgroundImage"], "/uploads/hero.jpg");
        assert_eq!(prepared.intro["align"], "center");
    }

    #[test]
    fn missing_intro_content_is_reported() {
        let mut payload = valid_payload();
        payload.intro = Some(json!({ "content": "" }));
        let errors = prepare(payload).unwrap_err();
        assert!(errors.field_errors.contains_key("intro"));
    }

    #[test]
    fn empty_feature_list_is_rejected() {
        let mut payload = valid_payload();
        payload.feature_list = Some(json!({ "items": [] }));
        let errors = prepare(payload).unwrap_err();
        assert!(errors.field_errors.contains_key("featureList"));
    }

    #[test]
    fn too_many_gallery_images_rejected() {
        let mut payload = valid_payload();
        let images: Vec<_> = (0..10)
            .map(|i| json!({ "url": format!("/uploads/{i}.jpg") }))
            .collect();
        payload.gallery = Some(json!({ "images": images }));
        let errors = prepare(payload).unwrap_err();
        assert!(errors.field_errors.contains_key("gallery"));
    }

    #[test]
    fn invalid_hero_degrades_to_empty_document() {
        let mut payload = valid_payload();
        payload.hero = Some(json!({ "backgroundImage": "not-a-url" }));
        let prepared = prepare(payload).unwrap();
        assert_eq!(prepared.hero, json!({}));
    }

    #[test]
    fn relative_image_urls_must_be_uploads() {
        assert!(is_image_url("/uploads/x.jpg"));
        assert!(is_image_url("https://cdn.example.com/x.jpg"));
        assert!(!is_image_url("/images/x.jpg"));
        assert!(!is_image_url("ftp://host/x.jpg"));
    }
}
