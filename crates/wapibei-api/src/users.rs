use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use tracing::info;
use uuid::Uuid;

use wapibei_types::api::{FavoriteResponse, UpdateProfileRequest, UpdateStatusRequest, UserQuery};
use wapibei_types::models::{Product, User, UserStatus};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<User>>, ApiError> {
    auth.require_admin()?;
    let rows = blocking(&state, move |db| db.list_users(query.role, query.status)).await?;
    Ok(Json(rows.into_iter().map(|r| r.into_api(true)).collect()))
}

/// Public profile. The email is only shown to its owner and to admins.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    viewer: Option<Extension<AuthUser>>,
) -> Result<Json<User>, ApiError> {
    let uid = user_id.to_string();
    let row = blocking(&state, move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    let include_email = viewer.is_some_and(|Extension(v)| v.is_admin() || v.id == user_id);
    Ok(Json(row.into_api(include_email)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(patch): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
    if blank(&patch.first_name) || blank(&patch.last_name) {
        return Err(ApiError::bad_request("names cannot be empty"));
    }

    let uid = auth.id_str();
    let row = blocking(&state, move |db| {
        db.update_profile(&uid, &patch)?;
        db.get_user_by_id(&uid)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(row.into_api(true)))
}

/// Admin moderation. Suspending also signs the user out everywhere.
pub async fn update_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<User>, ApiError> {
    auth.require_admin()?;
    if user_id == auth.id && req.status != UserStatus::Active {
        return Err(ApiError::bad_request("admins cannot suspend themselves"));
    }

    let uid = user_id.to_string();
    let status = req.status;
    let (row, revoked) = blocking(&state, move |db| {
        if !db.set_user_status(&uid, status)? {
            return Ok((None, 0));
        }
        let revoked = if status == UserStatus::Suspended {
            db.delete_user_sessions(&uid)?
        } else {
            0
        };
        Ok((db.get_user_by_id(&uid)?, revoked))
    })
    .await?;
    let row = row.ok_or_else(|| ApiError::not_found("user"))?;

    info!("{} set {} to {} ({} sessions revoked)", auth.email, row.email, status, revoked);
    Ok(Json(row.into_api(true)))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let uid = auth.id_str();
    let rows = blocking(&state, move |db| db.list_favorites(&uid)).await?;
    Ok(Json(rows.into_iter().map(|r| r.into_api()).collect()))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<FavoriteResponse>, ApiError> {
    let (uid, pid) = (auth.id_str(), product_id.to_string());
    let favorited = blocking(&state, move |db| {
        if db.get_product(&pid)?.is_none() {
            return Ok(None);
        }
        db.toggle_favorite(&uid, &pid).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("product"))?;

    Ok(Json(FavoriteResponse {
        product_id,
        favorited,
    }))
}
