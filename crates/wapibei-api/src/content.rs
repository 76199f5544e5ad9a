use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use wapibei_types::api::{CreatePostRequest, CreateTestimonialRequest};
use wapibei_types::models::{Post, Testimonial};

use crate::error::ApiError;
use crate::fixtures::{self, or_fixture};
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

// -- Posts --

pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<Post>>, ApiError> {
    let result = blocking(&state, |db| {
        Ok(db.list_posts(false)?.into_iter().map(|r| r.into_api()).collect::<Vec<_>>())
    })
    .await;
    Ok(Json(or_fixture(result, "posts", fixtures::posts)?))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let lookup = slug.clone();
    let result = blocking(&state, move |db| Ok(db.get_post_by_slug(&lookup)?.map(|r| r.into_api()))).await;
    let post = or_fixture(result, "posts", || {
        fixtures::posts().into_iter().find(|p| p.slug == slug)
    })?;

    post.filter(|p| p.published)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("post"))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    auth.require_admin()?;
    let title = req.title.trim().to_string();
    if title.is_empty() || req.body.trim().is_empty() {
        return Err(ApiError::bad_request("title and body are required"));
    }
    let slug = match req.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(given) if is_valid_slug(given) => given.to_string(),
        Some(_) => return Err(ApiError::bad_request("slug may only contain a-z, 0-9 and '-'")),
        None => slugify(&title),
    };
    if slug.is_empty() {
        return Err(ApiError::bad_request("title needs at least one letter or digit"));
    }

    let (post_id, author, s) = (Uuid::new_v4().to_string(), auth.id_str(), slug.clone());
    let post = blocking(&state, move |db| {
        if db.get_post_by_slug(&s)?.is_some() {
            return Ok(None);
        }
        db.insert_post(&post_id, &author, &title, &s, &req.body, req.cover_url.as_deref(), req.published)?;
        Ok(db.get_post_by_slug(&s)?.map(|r| r.into_api()))
    })
    .await?
    .ok_or_else(|| ApiError::Conflict(format!("slug '{slug}' already in use")))?;

    info!("{} wrote post '{}'", auth.email, post.slug);
    Ok((StatusCode::CREATED, Json(post)))
}

// -- Testimonials --

pub async fn list_testimonials(State(state): State<AppState>) -> Result<Json<Vec<Testimonial>>, ApiError> {
    let result = blocking(&state, |db| {
        Ok(db.list_testimonials(false)?.into_iter().map(|r| r.into_api()).collect::<Vec<_>>())
    })
    .await;
    Ok(Json(or_fixture(result, "testimonials", fixtures::testimonials)?))
}

/// Stored unapproved; an admin has to approve it before it is listed.
pub async fn create_testimonial(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateTestimonialRequest>,
) -> Result<(StatusCode, Json<Testimonial>), ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::bad_request("rating must be between 1 and 5"));
    }

    let (tid, uid, rating) = (Uuid::new_v4().to_string(), auth.id_str(), req.rating);
    let testimonial = blocking(&state, move |db| {
        let user = db
            .get_user_by_id(&uid)?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished", uid))?;
        let name = user.into_api(false).display_name();
        db.insert_testimonial(&tid, &uid, &name, &content, rating)?;
        Ok(db
            .list_testimonials(true)?
            .into_iter()
            .find(|t| t.id == tid)
            .map(|t| t.into_api()))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("testimonial"))?;

    Ok((StatusCode::CREATED, Json(testimonial)))
}

pub async fn approve_testimonial(
    State(state): State<AppState>,
    Path(testimonial_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Testimonial>, ApiError> {
    auth.require_admin()?;
    let tid = testimonial_id.to_string();
    let row = blocking(&state, move |db| db.approve_testimonial(&tid))
        .await?
        .ok_or_else(|| ApiError::not_found("testimonial"))?;
    Ok(Json(row.into_api()))
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn is_valid_slug(slug: &str) -> bool {
    slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
