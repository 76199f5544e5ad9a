use axum::{Extension, Json, extract::State};
use tracing::warn;

use wapibei_types::api::{AdminStats, PublicStats, SellerClicks};

use crate::error::ApiError;
use crate::fixtures::or_fixture;
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

const TOP_SELLERS: usize = 5;

/// Landing page counters. Zeros when the tables are not there yet.
pub async fn public_stats(State(state): State<AppState>) -> Result<Json<PublicStats>, ApiError> {
    let result = blocking(&state, |db| db.public_stats()).await;
    Ok(Json(or_fixture(result, "stats", PublicStats::default)?))
}

pub async fn admin_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<AdminStats>, ApiError> {
    auth.require_admin()?;

    let (users_by_role, users_by_status, counts) = blocking(&state, |db| {
        Ok((db.users_by_role()?, db.users_by_status()?, db.table_counts()?))
    })
    .await?;
    let subscribers = state.subscribers.load().await?.len();
    let clicks = state.vendor_clicks.load().await?;

    let vendor_clicks = clicks.values().sum();
    let mut ranked: Vec<SellerClicks> = clicks
        .into_iter()
        .filter_map(|(seller, clicks)| match seller.parse() {
            Ok(seller_id) => Some(SellerClicks { seller_id, clicks }),
            Err(_) => {
                warn!("Ignoring click counter for malformed seller id '{}'", seller);
                None
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.clicks.cmp(&a.clicks).then(a.seller_id.cmp(&b.seller_id)));
    ranked.truncate(TOP_SELLERS);

    Ok(Json(AdminStats {
        users_by_role,
        users_by_status,
        products: counts.products,
        boutiques: counts.boutiques,
        conversations: counts.conversations,
        messages: counts.messages,
        subscribers,
        vendor_clicks,
        top_sellers_by_clicks: ranked,
    }))
}
