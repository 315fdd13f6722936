use std::{path::PathBuf, time::Duration};

use axum::{
    Json, Router,
    extract::{Multipart, Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use sanitize_filename::sanitize;
use serde::{Deserialize, Serialize};
use tokio::{fs as tokio_fs, io::AsyncWriteExt, time::sleep};
use tracing::{debug, error, warn};
use uuid::Uuid;

mod session;

pub use session::{FilterSession, SessionStore, within_business_hours};

use crate::web::{
    AppState,
    responses::{EnvelopeError, envelope, envelope_error, envelope_message},
};

const STORAGE_ROOT: &str = "storage/filters";
const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Delay before the first speculative regeneration after a foreground result.
const INITIAL_PREFETCH_DELAY: Duration = Duration::from_secs(1);
/// Delay between chained speculative regenerations.
const CHAIN_PREFETCH_DELAY: Duration = Duration::from_secs(5);
/// Artificial delay when serving a precomputed result, so the response time
/// matches a real regeneration.
const CACHED_SERVE_DELAY: Duration = Duration::from_secs(2);

/// The six historical polymer banknotes offered as filters.
const BANKNOTES: [Banknote; 6] = [
    Banknote { id: "1", name: "500.000₫", year: "2003", value: "500.000", image: "currency-500k.jpg" },
    Banknote { id: "2", name: "200.000₫", year: "2006", value: "200.000", image: "currency-200k.jpg" },
    Banknote { id: "3", name: "100.000₫", year: "2004", value: "100.000", image: "currency-100k.jpg" },
    Banknote { id: "4", name: "50.000₫", year: "2003", value: "50.000", image: "currency-50k.jpg" },
    Banknote { id: "5", name: "20.000₫", year: "2006", value: "20.000", image: "currency-20k.jpg" },
    Banknote { id: "6", name: "10.000₫", year: "2006", value: "10.000", image: "currency-10k.jpg" },
];

struct Banknote {
    id: &'static str,
    name: &'static str,
    year: &'static str,
    value: &'static str,
    image: &'static str,
}

fn banknote_by_id(id: &str) -> Option<&'static Banknote> {
    BANKNOTES.iter().find(|b| b.id == id)
}

pub fn session_dir(id: Uuid) -> PathBuf {
    PathBuf::from(STORAGE_ROOT).join(id.to_string())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/filters", get(list_filters))
        .route("/api/filters/sessions", post(create_session))
        .route(
            "/api/filters/sessions/:id",
            get(session_state).delete(delete_session),
        )
        .route("/api/filters/sessions/:id/select", post(select_filter))
        .route("/api/filters/sessions/:id/regenerate", post(regenerate))
        .route("/api/filters/sessions/:id/back", post(go_back))
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterInfo {
    id: &'static str,
    name: &'static str,
    year: &'static str,
    value: &'static str,
    image: String,
    description: &'static str,
}

async fn list_filters(State(state): State<AppState>) -> impl IntoResponse {
    let filters: Vec<FilterInfo> = BANKNOTES
        .iter()
        .map(|b| FilterInfo {
            id: b.id,
            name: b.name,
            year: b.year,
            value: b.value,
            image: state.generator().sample_url(b.image),
            description: "",
        })
        .collect();
    envelope(filters)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSession {
    session_id: Uuid,
}

async fn create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> EnvelopeResult<impl IntoResponse> {
    let mut saved: Option<(PathBuf, String, String)> = None;

    let session_id = Uuid::new_v4();
    let dir = session_dir(session_id);

    while let Some(mut field) = multipart.next_field().await.map_err(|err| {
        warn!(?err, "failed to read filter upload form");
        envelope_error(StatusCode::BAD_REQUEST, "Không thể đọc dữ liệu tải lên")
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
            return Err(envelope_error(
                StatusCode::BAD_REQUEST,
                "Chỉ hỗ trợ ảnh JPEG, PNG hoặc WebP",
            ));
        }

        let original_name = field.file_name().unwrap_or("input.png").to_string();
        let mut stored_name = sanitize(&original_name);
        if stored_name.is_empty() {
            stored_name = "input.png".to_string();
        }

        tokio_fs::create_dir_all(&dir).await.map_err(|err| {
            error!(?err, "failed to create filter session dir");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Không thể lưu ảnh")
        })?;

        let path = dir.join(&stored_name);
        let mut file = tokio_fs::File::create(&path).await.map_err(|err| {
            error!(?err, "failed to create filter input file");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Không thể lưu ảnh")
        })?;

        let mut total: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(|err| {
            warn!(?err, "failed to read filter upload chunk");
            envelope_error(StatusCode::BAD_REQUEST, "Không thể đọc dữ liệu tải lên")
        })? {
            total += chunk.len() as u64;
            if total > MAX_IMAGE_BYTES {
                let _ = tokio_fs::remove_dir_all(&dir).await;
                return Err(envelope_error(
                    StatusCode::BAD_REQUEST,
                    "Ảnh vượt quá giới hạn 5MB",
                ));
            }
            file.write_all(&chunk).await.map_err(|err| {
                error!(?err, "failed to write filter input file");
                envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Không thể lưu ảnh")
            })?;
        }
        file.flush().await.map_err(|err| {
            error!(?err, "failed to flush filter input file");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Không thể lưu ảnh")
        })?;

        saved = Some((path, stored_name, content_type));
    }

    let Some((path, filename, content_type)) = saved else {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Vui lòng chọn ảnh để tải lên",
        ));
    };

    state
        .filter_sessions()
        .insert(session_id, FilterSession::new(path, filename, content_type))
        .await;

    Ok((StatusCode::CREATED, envelope(CreatedSession { session_id })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionStatePayload {
    session_id: Uuid,
    screen: &'static str,
    selected_filter: Option<String>,
    image_url: Option<String>,
    run_id: Option<String>,
    banknote_used: Option<String>,
}

async fn session_state(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> EnvelopeResult<impl IntoResponse> {
    let session = require_session(&state, id).await?;
    let guard = session.lock().await;
    Ok(envelope(SessionStatePayload {
        session_id: id,
        screen: if guard.result_url.is_some() {
            "result"
        } else {
            "filter"
        },
        selected_filter: guard.selected_filter.clone(),
        image_url: guard.result_url.clone(),
        run_id: guard.run_id.clone(),
        banknote_used: guard.banknote_used.clone(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectPayload {
    filter_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationPayload {
    image_url: String,
    run_id: Option<String>,
    banknote_used: Option<String>,
}

async fn select_filter(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
    Json(payload): Json<SelectPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let Some(banknote) = banknote_by_id(&payload.filter_id) else {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Mẫu tiền không hợp lệ",
        ));
    };

    let session = require_session(&state, id).await?;

    let (epoch, input_path, input_filename, input_content_type) = {
        let mut guard = session.lock().await;
        let epoch = guard.begin_user_action();
        guard.selected_filter = Some(banknote.image.to_string());
        (
            epoch,
            guard.input_path.clone(),
            guard.input_filename.clone(),
            guard.input_content_type.clone(),
        )
    };

    let image_bytes = tokio_fs::read(&input_path).await.map_err(|err| {
        error!(?err, "failed to read filter session input");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Không thể đọc ảnh gốc")
    })?;

    let outcome = state
        .generator()
        .run(image_bytes, &input_filename, &input_content_type, banknote.image)
        .await
        .map_err(|err| {
            error!(?err, "foreground generation failed");
            envelope_error(
                StatusCode::BAD_GATEWAY,
                "Không thể tạo ảnh. Vui lòng thử lại.",
            )
        })?;

    {
        let mut guard = session.lock().await;
        if guard.store_result(
            epoch,
            outcome.run_id.clone(),
            outcome.image_url.clone(),
            outcome.banknote_used.clone(),
        ) {
            start_prefetch(&state, id, &mut guard);
        }
    }

    Ok(envelope(GenerationPayload {
        image_url: outcome.image_url,
        run_id: Some(outcome.run_id),
        banknote_used: outcome.banknote_used,
    }))
}

async fn regenerate(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> EnvelopeResult<impl IntoResponse> {
    let session = require_session(&state, id).await?;

    let (epoch, cached, run_id, filter) = {
        let mut guard = session.lock().await;
        let epoch = guard.begin_user_action();
        let cached = guard.take_cached();
        if let Some(url) = &cached {
            guard.result_url = Some(url.clone());
        }
        (
            epoch,
            cached,
            guard.run_id.clone(),
            guard.selected_filter.clone(),
        )
    };

    if let Some(url) = cached {
        // Keep the response time in line with a real regeneration.
        sleep(CACHED_SERVE_DELAY).await;
        let guard = session.lock().await;
        return Ok(envelope(GenerationPayload {
            image_url: url,
            run_id: guard.run_id.clone(),
            banknote_used: guard.banknote_used.clone(),
        }));
    }

    let (Some(run_id), Some(filter)) = (run_id, filter) else {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Chưa chọn mẫu tiền",
        ));
    };

    let outcome = state
        .generator()
        .regenerate(&run_id, &filter)
        .await
        .map_err(|err| {
            error!(?err, "foreground regeneration failed");
            envelope_error(
                StatusCode::BAD_GATEWAY,
                "Không thể tạo ảnh. Vui lòng thử lại.",
            )
        })?;

    {
        let mut guard = session.lock().await;
        if guard.store_result(
            epoch,
            outcome.run_id.clone(),
            outcome.image_url.clone(),
            outcome.banknote_used.clone(),
        ) {
            start_prefetch(&state, id, &mut guard);
        }
    }

    Ok(envelope(GenerationPayload {
        image_url: outcome.image_url,
        run_id: Some(outcome.run_id),
        banknote_used: outcome.banknote_used,
    }))
}

async fn go_back(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> EnvelopeResult<impl IntoResponse> {
    let session = require_session(&state, id).await?;
    let mut guard = session.lock().await;
    guard.begin_user_action();
    guard.reset_result();
    Ok(envelope(SessionStatePayload {
        session_id: id,
        screen: "filter",
        selected_filter: None,
        image_url: None,
        run_id: None,
        banknote_used: None,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> EnvelopeResult<impl IntoResponse> {
    let removed = state.filter_sessions().remove(id).await;
    if removed.is_none() {
        return Err(envelope_error(
            StatusCode::NOT_FOUND,
            "Không tìm thấy phiên làm việc",
        ));
    }

    if let Err(err) = tokio_fs::remove_dir_all(session_dir(id)).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(?err, %id, "failed to remove filter session dir");
        }
    }

    Ok(envelope_message("Filter session deleted successfully"))
}

async fn require_session(
    state: &AppState,
    id: Uuid,
) -> Result<session::SharedSession, (StatusCode, Json<EnvelopeError>)> {
    state.filter_sessions().get(id).await.ok_or_else(|| {
        envelope_error(StatusCode::NOT_FOUND, "Không tìm thấy phiên làm việc")
    })
}

/// Spawns the speculative regeneration chain for the current epoch. The
/// chain sleeps, fires an abortable regenerate call, fills the cache slot on
/// success and repeats with the longer delay while the business-hours window
/// holds. Failures end the chain silently.
fn start_prefetch(state: &AppState, session_id: Uuid, session: &mut FilterSession) {
    if !within_business_hours(state.config(), Utc::now()) {
        return;
    }
    let (Some(run_id), Some(filter)) = (session.run_id.clone(), session.selected_filter.clone())
    else {
        return;
    };
    let epoch = session.current_epoch();
    let handle = tokio::spawn(prefetch_chain(
        state.clone(),
        session_id,
        epoch,
        run_id,
        filter,
    ));
    session.attach_prefetch(epoch, handle);
}

async fn prefetch_chain(
    state: AppState,
    session_id: Uuid,
    epoch: u64,
    run_id: String,
    filter: String,
) {
    let mut delay = INITIAL_PREFETCH_DELAY;
    loop {
        sleep(delay).await;
        if !within_business_hours(state.config(), Utc::now()) {
            break;
        }
        match state.generator().regenerate(&run_id, &filter).await {
            Ok(outcome) => {
                let Some(session) = state.filter_sessions().get(session_id).await else {
                    return;
                };
                let mut guard = session.lock().await;
                if !guard.store_background(epoch, outcome.image_url) {
                    return;
                }
            }
            Err(err) => {
                // Best-effort optimization: never surfaced to the user.
                debug!(?err, %session_id, "background regeneration failed");
                break;
            }
        }
        delay = CHAIN_PREFETCH_DELAY;
    }

    if let Some(session) = state.filter_sessions().get(session_id).await {
        session.lock().await.background_done(epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banknote_lookup() {
        assert_eq!(banknote_by_id("1").map(|b| b.name), Some("500.000₫"));
        assert_eq!(banknote_by_id("6").map(|b| b.image), Some("currency-10k.jpg"));
        assert!(banknote_by_id("7").is_none());
    }

    #[test]
    fn session_dir_is_scoped_by_id() {
        let id = Uuid::new_v4();
        let dir = session_dir(id);
        assert!(dir.starts_with(STORAGE_ROOT));
        assert!(dir.ends_with(id.to_string()));
    }
}
