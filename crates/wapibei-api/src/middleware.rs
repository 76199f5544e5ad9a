use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use wapibei_types::api::Claims;
use wapibei_types::models::{Role, UserStatus};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// The caller behind a verified bearer token. Role and status come from the
/// users table, not from the token, so admin changes apply immediately.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub token: String,
}

impl AuthUser {
    pub fn id_str(&self) -> String {
        self.id.to_string()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("admin only"))
        }
    }

    pub fn require_seller(&self) -> Result<(), ApiError> {
        if self.role.can_sell() {
            Ok(())
        } else {
            Err(ApiError::forbidden("seller account required"))
        }
    }
}

pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Check the JWT, then the session row behind it, then the account itself.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or_else(ApiError::unauthorized)?.to_string();
    let user = authenticate(&state, token).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Like `require_auth`, but anonymous or invalid callers pass through
/// without an `AuthUser` extension.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = bearer_token(&req).map(str::to_string) {
        if let Ok(user) = authenticate(&state, token).await {
            req.extensions_mut().insert(user);
        }
    }
    next.run(req).await
}

async fn authenticate(state: &AppState, token: String) -> Result<AuthUser, ApiError> {
    let claims = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))?
    .claims;

    let lookup = token.clone();
    let (session, user) = blocking(state, move |db| {
        let session = db.get_live_session(&lookup)?;
        let user = match &session {
            Some(s) => db.get_user_by_id(&s.user_id)?,
            None => None,
        };
        Ok((session, user))
    })
    .await?;

    let session = session.ok_or_else(|| ApiError::Unauthorized("session expired".into()))?;
    let user = user.ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;
    if session.user_id != claims.sub.to_string() {
        return Err(ApiError::Unauthorized("token does not match session".into()));
    }
    if user.status() == UserStatus::Suspended {
        return Err(ApiError::forbidden("account suspended"));
    }

    Ok(AuthUser {
        id: claims.sub,
        email: user.email.clone(),
        role: user.role(),
        token,
    })
}
