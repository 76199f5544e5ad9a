use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use wapibei_types::api::{CreateProductRequest, ProductPage, ProductQuery, UpdateProductRequest};
use wapibei_types::models::Product;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

const PRODUCT_STATUSES: [&str; 2] = ["active", "hidden"];

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>, ApiError> {
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(ApiError::bad_request("min_price is greater than max_price"));
        }
    }

    let (rows, total) = blocking(&state, move |db| db.list_products(&query)).await?;
    Ok(Json(ProductPage {
        items: rows.into_iter().map(|r| r.into_api()).collect(),
        total,
    }))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let row = blocking(&state, move |db| db.get_product(&product_id.to_string()))
        .await?
        .filter(|p| p.status == "active")
        .ok_or_else(|| ApiError::not_found("product"))?;
    Ok(Json(row.into_api()))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_seller()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    check_amounts(Some(req.price_cents), Some(req.stock))?;

    let product_id = Uuid::new_v4().to_string();
    let seller_id = auth.id_str();
    let row = blocking(&state, move |db| {
        db.insert_product(&product_id, &seller_id, &req)?;
        db.get_product(&product_id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("product"))?;

    info!("{} listed product {} ({})", auth.email, row.name, row.id);
    Ok((StatusCode::CREATED, Json(row.into_api())))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
    Json(patch): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("name cannot be empty"));
    }
    check_amounts(patch.price_cents, patch.stock)?;
    if let Some(status) = patch.status.as_deref() {
        if !PRODUCT_STATUSES.contains(&status) {
            return Err(ApiError::bad_request("status must be active or hidden"));
        }
    }

    let pid = product_id.to_string();
    let existing = blocking(&state, move |db| db.get_product(&pid))
        .await?
        .ok_or_else(|| ApiError::not_found("product"))?;
    ensure_owner(&auth, &existing.seller_id)?;

    let pid = product_id.to_string();
    let row = blocking(&state, move |db| {
        db.update_product(&pid, &patch)?;
        db.get_product(&pid)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("product"))?;
    Ok(Json(row.into_api()))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    let pid = product_id.to_string();
    let existing = blocking(&state, move |db| db.get_product(&pid))
        .await?
        .ok_or_else(|| ApiError::not_found("product"))?;
    ensure_owner(&auth, &existing.seller_id)?;

    let pid = product_id.to_string();
    blocking(&state, move |db| db.delete_product(&pid)).await?;
    info!("{} deleted product {}", auth.email, product_id);
    Ok(StatusCode::NO_CONTENT)
}

fn ensure_owner(auth: &AuthUser, seller_id: &str) -> Result<(), ApiError> {
    if auth.is_admin() || auth.id_str() == seller_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("not your product"))
    }
}

fn check_amounts(price_cents: Option<i64>, stock: Option<i64>) -> Result<(), ApiError> {
    if price_cents.is_some_and(|p| p < 0) {
        return Err(ApiError::bad_request("price cannot be negative"));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(ApiError::bad_request("stock cannot be negative"));
    }
    Ok(())
}
