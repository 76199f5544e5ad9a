use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::{debug, info};
use uuid::Uuid;

use wapibei_types::api::{ClickResponse, SellerDetail, UpsertBoutiqueRequest};
use wapibei_types::models::{Boutique, UserStatus};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

pub async fn list_sellers(State(state): State<AppState>) -> Result<Json<Vec<Boutique>>, ApiError> {
    let rows = blocking(&state, |db| db.list_boutiques()).await?;
    Ok(Json(rows.into_iter().map(|r| r.into_api()).collect()))
}

pub async fn get_seller(
    State(state): State<AppState>,
    Path(seller_id): Path<Uuid>,
) -> Result<Json<SellerDetail>, ApiError> {
    let sid = seller_id.to_string();
    let found = blocking(&state, move |db| {
        let Some(seller) = db.get_user_by_id(&sid)? else {
            return Ok(None);
        };
        if seller.status() == UserStatus::Suspended {
            return Ok(None);
        }
        let Some(boutique) = db.get_boutique_by_seller(&sid)? else {
            return Ok(None);
        };
        let products = db.list_seller_products(&sid, false)?;
        Ok(Some((boutique, products)))
    })
    .await?;

    let (boutique, products) = found.ok_or_else(|| ApiError::not_found("boutique"))?;
    Ok(Json(SellerDetail {
        boutique: boutique.into_api(),
        products: products.into_iter().map(|p| p.into_api()).collect(),
    }))
}

pub async fn upsert_my_boutique(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpsertBoutiqueRequest>,
) -> Result<Json<Boutique>, ApiError> {
    auth.require_seller()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("boutique name is required"));
    }
    if req.settings.as_ref().is_some_and(|s| !s.is_object()) {
        return Err(ApiError::bad_request("settings must be a JSON object"));
    }

    let seller_id = auth.id_str();
    let row = blocking(&state, move |db| {
        db.upsert_boutique(&Uuid::new_v4().to_string(), &seller_id, &req)
    })
    .await?;

    info!("{} saved boutique '{}'", auth.email, row.name);
    Ok(Json(row.into_api()))
}

/// Count a visit to a seller's storefront.
pub async fn record_click(
    State(state): State<AppState>,
    Path(seller_id): Path<Uuid>,
) -> Result<Json<ClickResponse>, ApiError> {
    let sid = seller_id.to_string();
    let seller = blocking(&state, move |db| db.get_user_by_id(&sid)).await?;
    if !seller.is_some_and(|s| s.role().can_sell()) {
        return Err(ApiError::not_found("seller"));
    }

    let key = seller_id.to_string();
    let clicks = state
        .vendor_clicks
        .update(move |counts| {
            let count = counts.entry(key).or_insert(0);
            *count += 1;
            *count
        })
        .await?;

    debug!("Seller {} now has {} clicks", seller_id, clicks);
    Ok(Json(ClickResponse { seller_id, clicks }))
}
