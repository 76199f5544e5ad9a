use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use wapibei_types::api::UploadResponse;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// 5 MB upload limit for images
pub const MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Content types we accept, with the extension the file is stored under.
const IMAGE_TYPES: [(&str, &str); 4] = [
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

/// POST /api/uploads: raw image bytes in the body, saved as
/// `{upload_dir}/{uuid}.{ext}` and served back under `/uploads/`.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default();
    let ext = extension_for(&content_type)
        .ok_or_else(|| ApiError::bad_request("only png, jpeg, webp or gif images are accepted"))?;

    if bytes.is_empty() {
        return Err(ApiError::bad_request("empty upload"));
    }
    if bytes.len() > MAX_UPLOAD_SIZE {
        return Err(ApiError::PayloadTooLarge("images are limited to 5 MB".into()));
    }

    tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", state.upload_dir.display(), e);
        ApiError::Internal(e.into())
    })?;

    let file_name = format!("{}.{}", Uuid::new_v4(), ext);
    let file_path = state.upload_dir.join(&file_name);
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        error!("Failed to create file {}: {}", file_path.display(), e);
        ApiError::Internal(e.into())
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", file_path.display(), e);
        ApiError::Internal(e.into())
    })?;
    file.flush().await.map_err(|e| ApiError::Internal(e.into()))?;

    info!("{} uploaded {} ({} bytes)", auth.email, file_name, bytes.len());
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: format!("/uploads/{file_name}"),
            size: bytes.len() as u64,
        }),
    ))
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_images_map_to_extensions() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("application/pdf"), None);
        assert_eq!(extension_for(""), None);
    }
}
