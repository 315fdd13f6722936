use std::path::{Path as FsPath, PathBuf};

use axum::{
    Json, Router,
    extract::{Host, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, post},
};
use chrono::Utc;
use serde::Serialize;
use tokio::{fs as tokio_fs, io::AsyncWriteExt};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    utils,
    web::{
        AppState,
        auth::AdminUser,
        responses::{EnvelopeError, envelope, envelope_error},
    },
};

pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/uploads/images", post(upload_image))
        .route("/api/uploads/images/:filename", delete(delete_image))
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

pub fn is_allowed_mime(content_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&content_type)
}

/// Builds the stored name for an uploaded file:
/// `{timestamp}-{uuid}-{slugified original stem}{ext}`.
pub fn stored_filename(original: &str, timestamp_millis: i64, unique: Uuid) -> String {
    let path = FsPath::new(original);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(utils::slugify)
        .unwrap_or_default();

    let safe_name = if stem.is_empty() {
        String::new()
    } else {
        format!("-{stem}")
    };

    format!("{timestamp_millis}-{unique}{safe_name}{extension}")
}

#[derive(Serialize)]
struct UploadedFile {
    filename: String,
    url: String,
    mimetype: String,
    size: u64,
}

async fn upload_image(
    _admin: AdminUser,
    State(state): State<AppState>,
    Host(host): Host,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> EnvelopeResult<impl IntoResponse> {
    let uploads_dir = PathBuf::from(&state.config().uploads_dir);
    tokio_fs::create_dir_all(&uploads_dir).await.map_err(|err| {
        error!(?err, "failed to ensure uploads dir");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
    })?;

    let mut uploaded: Option<UploadedFile> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|err| {
        warn!(?err, "failed to parse upload form");
        envelope_error(StatusCode::BAD_REQUEST, "Failed to upload image")
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        if !is_allowed_mime(&content_type) {
            return Err(envelope_error(
                StatusCode::BAD_REQUEST,
                "Only image files are allowed.",
            ));
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let filename = stored_filename(&original_name, Utc::now().timestamp_millis(), Uuid::new_v4());
        let stored_path = uploads_dir.join(&filename);

        let mut file = tokio_fs::File::create(&stored_path).await.map_err(|err| {
            error!(?err, "failed to create upload file");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
        })?;

        let mut size: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(|err| {
            warn!(?err, "failed to read upload chunk");
            envelope_error(StatusCode::BAD_REQUEST, "Failed to upload image")
        })? {
            size += chunk.len() as u64;
            if size > MAX_UPLOAD_BYTES {
                drop(file);
                let _ = tokio_fs::remove_file(&stored_path).await;
                return Err(envelope_error(
                    StatusCode::BAD_REQUEST,
                    "File too large. Maximum size is 5MB.",
                ));
            }
            file.write_all(&chunk).await.map_err(|err| {
                error!(?err, "failed to write upload file");
                envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
            })?;
        }
        file.flush().await.map_err(|err| {
            error!(?err, "failed to flush upload file");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
        })?;

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("http");
        let url = format!("{scheme}://{host}/uploads/{filename}");

        uploaded = Some(UploadedFile {
            filename,
            url,
            mimetype: content_type,
            size,
        });
    }

    let Some(uploaded) = uploaded else {
        return Err(envelope_error(StatusCode::BAD_REQUEST, "No file uploaded"));
    };

    Ok((StatusCode::CREATED, envelope(uploaded)))
}

#[derive(Serialize)]
struct DeletedFile {
    filename: String,
}

async fn delete_image(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    if filename.is_empty() {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Filename is required",
        ));
    }

    // Reject anything that is not a plain basename.
    let sanitized = FsPath::new(&filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    if sanitized != filename {
        return Err(envelope_error(StatusCode::BAD_REQUEST, "Invalid filename"));
    }

    let file_path = PathBuf::from(&state.config().uploads_dir).join(sanitized);

    if tokio_fs::metadata(&file_path).await.is_err() {
        return Err(envelope_error(StatusCode::NOT_FOUND, "File not found"));
    }

    tokio_fs::remove_file(&file_path).await.map_err(|err| {
        error!(?err, file = %file_path.display(), "failed to delete upload");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete image")
    })?;

    Ok(envelope(DeletedFile {
        filename: sanitized.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_filename_shape() {
        let unique = Uuid::new_v4();
        let name = stored_filename("Ảnh Sự Kiện.JPG", 1700000000000, unique);
        assert_eq!(name, format!("1700000000000-{unique}-anh-su-kien.jpg"));
    }

    #[test]
    fn stored_filename_without_usable_stem() {
        let unique = Uuid::new_v4();
        let name = stored_filename("✨.png", 1700000000000, unique);
        assert_eq!(name, format!("1700000000000-{unique}.png"));
    }

    #[test]
    fn mime_allow_list() {
        assert!(is_allowed_mime("image/png"));
        assert!(is_allowed_mime("image/webp"));
        assert!(!is_allowed_mime("application/pdf"));
        assert!(!is_allowed_mime("image/svg+xml"));
    }

    #[tokio::test]
    async fn basename_check_blocks_traversal() {
        // The handler compares the basename against the raw parameter; a
        // traversal attempt never reaches the filesystem.
        let raw = "../secrets.txt";
        let sanitized = FsPath::new(raw)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("");
        assert_ne!(sanitized, raw);
    }
}
