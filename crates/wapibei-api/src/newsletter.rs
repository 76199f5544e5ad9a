use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;

use wapibei_types::api::{EmailRequest, SubscribeResponse, UnsubscribeResponse};
use wapibei_types::models::Subscriber;

use crate::auth::is_valid_email;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// 201 for a new address, 200 if it was already on the list. Addresses
/// compare case-insensitively.
pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<(StatusCode, Json<SubscribeResponse>), ApiError> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("invalid email address"));
    }

    let address = email.clone();
    let already_subscribed = state
        .subscribers
        .update(move |list| {
            if list.iter().any(|s| s.email.eq_ignore_ascii_case(&address)) {
                return true;
            }
            list.push(Subscriber {
                email: address,
                subscribed_at: Utc::now(),
            });
            false
        })
        .await?;

    let status = if already_subscribed {
        StatusCode::OK
    } else {
        info!("New newsletter subscriber {}", email);
        StatusCode::CREATED
    };
    Ok((status, Json(SubscribeResponse { email, already_subscribed })))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let removed = state
        .subscribers
        .update(move |list| {
            let before = list.len();
            list.retain(|s| !s.email.eq_ignore_ascii_case(&email));
            list.len() != before
        })
        .await?;
    Ok(Json(UnsubscribeResponse { removed }))
}

pub async fn list_subscribers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Subscriber>>, ApiError> {
    auth.require_admin()?;
    Ok(Json(state.subscribers.load().await?))
}
