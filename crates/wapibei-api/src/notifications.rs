use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use wapibei_types::api::{CreateNotificationRequest, NotificationSummary};
use wapibei_types::models::PublicNotification;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

pub async fn list_public(State(state): State<AppState>) -> Result<Json<Vec<PublicNotification>>, ApiError> {
    Ok(Json(newest_first(&state).await?))
}

pub async fn create_public(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<PublicNotification>), ApiError> {
    auth.require_admin()?;
    let (title, body) = (req.title.trim().to_string(), req.body.trim().to_string());
    if title.is_empty() || body.is_empty() {
        return Err(ApiError::bad_request("title and body are required"));
    }

    let notification = PublicNotification {
        id: Uuid::new_v4(),
        title,
        body,
        created_at: Utc::now(),
    };
    let stored = notification.clone();
    state.notifications.update(move |list| list.push(stored)).await?;

    info!("{} posted notification '{}'", auth.email, notification.title);
    Ok((StatusCode::CREATED, Json(notification)))
}

/// What the bell icon shows: unread chat messages plus public announcements.
pub async fn summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<NotificationSummary>, ApiError> {
    let uid = auth.id_str();
    let unread_messages = blocking(&state, move |db| db.unread_count_for_user(&uid)).await?;
    Ok(Json(NotificationSummary {
        unread_messages,
        public: newest_first(&state).await?,
    }))
}

async fn newest_first(state: &AppState) -> Result<Vec<PublicNotification>, ApiError> {
    let mut list = state.notifications.load().await?;
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(list)
}
