//! Canned payloads for read-only listings, served when the backing table
//! has not been created (a fresh or partially migrated database).

use chrono::{TimeZone, Utc};
use tracing::warn;
use uuid::Uuid;

use wapibei_db::is_missing_table;
use wapibei_types::models::{Post, Testimonial};

use crate::error::ApiError;

/// Swap a "no such table" failure for `fixture()`. Other errors pass through.
pub fn or_fixture<T>(result: Result<T, ApiError>, what: &str, fixture: impl FnOnce() -> T) -> Result<T, ApiError> {
    match result {
        Err(ApiError::Internal(e)) if is_missing_table(&e) => {
            warn!("{} table missing, serving fixtures: {:#}", what, e);
            Ok(fixture())
        }
        other => other,
    }
}

pub fn posts() -> Vec<Post> {
    vec![
        Post {
            id: Uuid::from_u128(0x1),
            author_id: None,
            title: "Karibu WapiBei".into(),
            slug: "karibu-wapibei".into(),
            body: "Find local sellers, compare prices and chat before you buy.".into(),
            cover_url: None,
            published: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).single().unwrap_or_default(),
        },
        Post {
            id: Uuid::from_u128(0x2),
            author_id: None,
            title: "Open your boutique".into(),
            slug: "open-your-boutique".into(),
            body: "Register as a seller, set up your storefront and list your first products.".into(),
            cover_url: None,
            published: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).single().unwrap_or_default(),
        },
    ]
}

pub fn testimonials() -> Vec<Testimonial> {
    vec![
        Testimonial {
            id: Uuid::from_u128(0x10),
            user_id: None,
            name: "Amina W.".into(),
            content: "I found a tailor two streets away and we agreed on the price in the chat.".into(),
            rating: 5,
            approved: true,
            created_at: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).single().unwrap_or_default(),
        },
        Testimonial {
            id: Uuid::from_u128(0x11),
            user_id: None,
            name: "Brian O.".into(),
            content: "My boutique gets more visits than my old social media page.".into(),
            rating: 4,
            approved: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).single().unwrap_or_default(),
        },
    ]
}
