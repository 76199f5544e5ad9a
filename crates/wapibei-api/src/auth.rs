use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::SaltString,
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use wapibei_db::models::NewUser;
use wapibei_db::to_sql_time;
use wapibei_types::api::{
    AuthResponse, Claims, EmailRequest, LoginRequest, MessageOnly, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, VerifyOtpRequest,
};
use wapibei_types::models::{Role, UserStatus};

use crate::error::ApiError;
use crate::mailer::{reset_mail, verification_mail};
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

pub const VERIFY_EMAIL: &str = "verify_email";
pub const RESET_PASSWORD: &str = "reset_password";

/// Wrong guesses allowed before a code is thrown away.
pub const MAX_OTP_ATTEMPTS: u32 = 5;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    check_password(&req.password)?;
    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::bad_request("first and last name are required"));
    }
    let role = req.role.unwrap_or(Role::Buyer);
    if role == Role::Admin {
        return Err(ApiError::bad_request("role must be buyer or seller"));
    }

    let lookup = email.clone();
    if blocking(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::Conflict("email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();
    let code = generate_code();
    let ttl = state.otp_ttl_minutes;

    let (uid, addr, code_hash) = (user_id.to_string(), email.clone(), hash_code(&code));
    let phone = req.phone.filter(|p| !p.trim().is_empty());
    blocking(&state, move |db| {
        db.create_user(&NewUser {
            id: &uid,
            email: &addr,
            password_hash: &password_hash,
            first_name: &first_name,
            last_name: &last_name,
            phone: phone.as_deref(),
            role,
        })?;
        db.upsert_otp(&Uuid::new_v4().to_string(), &uid, VERIFY_EMAIL, &code_hash, ttl)
    })
    .await?;

    info!("Registered {} as {} ({})", email, role, user_id);
    if let Err(e) = state.mailer.send(verification_mail(&email, &code, ttl)).await {
        warn!("Could not mail verification code to {}: {:#}", email, e);
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            email,
            message: "verification code sent".into(),
        }),
    ))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&req.email)?;
    let user = blocking(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::bad_request("invalid email or code"))?;
    if user.status() == UserStatus::Suspended {
        return Err(ApiError::forbidden("account suspended"));
    }

    check_code(&state, &user.id, VERIFY_EMAIL, &req.code).await?;

    let uid = user.id.clone();
    blocking(&state, move |db| {
        db.activate_user(&uid)?;
        db.record_login(&uid)
    })
    .await?;

    info!("{} verified their email", user.email);
    open_session(&state, user.uuid(), &user.email, user.role()).await.map(Json)
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<MessageOnly>, ApiError> {
    let email = normalize_email(&req.email)?;
    let lookup = email.clone();
    let user = blocking(&state, move |db| db.get_user_by_email(&lookup)).await?;

    if let Some(user) = user.filter(|u| u.status() == UserStatus::Pending) {
        let code = generate_code();
        let (uid, code_hash, ttl) = (user.id.clone(), hash_code(&code), state.otp_ttl_minutes);
        blocking(&state, move |db| {
            db.upsert_otp(&Uuid::new_v4().to_string(), &uid, VERIFY_EMAIL, &code_hash, ttl)
        })
        .await?;
        if let Err(e) = state.mailer.send(verification_mail(&email, &code, ttl)).await {
            warn!("Could not mail verification code to {}: {:#}", email, e);
        }
    }

    Ok(Json(MessageOnly {
        message: "if the account is awaiting verification, a new code has been sent".into(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let bad_credentials = || ApiError::Unauthorized("invalid email or password".into());

    let email = req.email.trim().to_lowercase();
    let user = blocking(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(bad_credentials)?;

    if !verify_password(&req.password, &user.password) {
        return Err(bad_credentials());
    }
    match user.status() {
        UserStatus::Pending => return Err(ApiError::forbidden("email not verified")),
        UserStatus::Suspended => return Err(ApiError::forbidden("account suspended")),
        UserStatus::Active => {}
    }

    let uid = user.id.clone();
    blocking(&state, move |db| db.record_login(&uid)).await?;
    open_session(&state, user.uuid(), &user.email, user.role()).await.map(Json)
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    let token = auth.token.clone();
    blocking(&state, move |db| db.delete_session(&token)).await?;
    info!("{} logged out", auth.email);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = auth.id_str();
    let user = blocking(&state, move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(user.into_api(true)))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<MessageOnly>, ApiError> {
    let email = normalize_email(&req.email)?;
    let lookup = email.clone();
    let user = blocking(&state, move |db| db.get_user_by_email(&lookup)).await?;

    // Same answer whether or not the account exists
    if let Some(user) = user.filter(|u| u.status() != UserStatus::Suspended) {
        let code = generate_code();
        let (uid, code_hash, ttl) = (user.id.clone(), hash_code(&code), state.otp_ttl_minutes);
        blocking(&state, move |db| {
            db.upsert_otp(&Uuid::new_v4().to_string(), &uid, RESET_PASSWORD, &code_hash, ttl)
        })
        .await?;
        if let Err(e) = state.mailer.send(reset_mail(&email, &code, ttl)).await {
            warn!("Could not mail reset code to {}: {:#}", email, e);
        }
    }

    Ok(Json(MessageOnly {
        message: "if the account exists, a reset code has been sent".into(),
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageOnly>, ApiError> {
    let email = normalize_email(&req.email)?;
    check_password(&req.new_password)?;

    let user = blocking(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::bad_request("invalid email or code"))?;

    check_code(&state, &user.id, RESET_PASSWORD, &req.code).await?;

    let password_hash = hash_password(&req.new_password)?;
    let uid = user.id.clone();
    let revoked = blocking(&state, move |db| {
        db.set_password(&uid, &password_hash)?;
        // The code proved the mailbox, so a still-pending account is verified too
        db.activate_user(&uid)?;
        db.delete_user_sessions(&uid)
    })
    .await?;

    info!("{} reset their password, {} sessions revoked", user.email, revoked);
    Ok(Json(MessageOnly {
        message: "password updated".into(),
    }))
}

// -- helpers --

/// Validate a stored one-time code, consuming it on success. Wrong guesses
/// count against the code; the fifth one discards it.
async fn check_code(state: &AppState, user_id: &str, purpose: &'static str, code: &str) -> Result<(), ApiError> {
    let uid = user_id.to_string();
    let otp = blocking(state, move |db| db.get_otp(&uid, purpose))
        .await?
        .ok_or_else(|| ApiError::bad_request("no pending code, request a new one"))?;

    let otp_id = otp.id.clone();
    if otp.expired {
        blocking(state, move |db| db.delete_otp(&otp_id)).await?;
        return Err(ApiError::bad_request("code expired"));
    }
    if otp.attempts >= MAX_OTP_ATTEMPTS {
        blocking(state, move |db| db.delete_otp(&otp_id)).await?;
        return Err(ApiError::bad_request("too many attempts"));
    }

    if hash_code(code.trim()) == otp.code_hash {
        blocking(state, move |db| db.delete_otp(&otp_id)).await?;
        return Ok(());
    }

    let attempts = blocking(state, move |db| {
        let attempts = db.bump_otp_attempts(&otp_id)?;
        if attempts >= MAX_OTP_ATTEMPTS {
            db.delete_otp(&otp_id)?;
        }
        Ok(attempts)
    })
    .await?;

    if attempts >= MAX_OTP_ATTEMPTS {
        warn!("One-time code for user {} discarded after {} attempts", user_id, attempts);
        Err(ApiError::bad_request("too many attempts"))
    } else {
        Err(ApiError::bad_request("invalid code"))
    }
}

/// Issue a JWT and store the session row that makes it valid.
async fn open_session(state: &AppState, user_id: Uuid, email: &str, role: Role) -> Result<AuthResponse, ApiError> {
    let expires_at = Utc::now() + Duration::days(state.session_days);
    let token = create_token(&state.jwt_secret, user_id, email, role, expires_at)?;

    let (sid, uid, stored, expiry) = (
        Uuid::new_v4().to_string(),
        user_id.to_string(),
        token.clone(),
        to_sql_time(expires_at),
    );
    let user = blocking(state, move |db| {
        db.create_session(&sid, &uid, &stored, &expiry)?;
        db.get_user_by_id(&uid)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("user"))?;

    Ok(AuthResponse {
        token,
        expires_at,
        user: user.into_api(true),
    })
}

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    role: Role,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        jti: Uuid::new_v4(),
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Six random digits, zero padded.
pub fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(ApiError::bad_request("invalid email address"))
    }
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("mama.mboga@soko.co.ke"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("@soko.co.ke"));
        assert!(!is_valid_email("juma@localhost"));
        assert!(!is_valid_email("ju ma@soko.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(hash_code("123456"), hash_code("123456"));
        assert_ne!(hash_code("123456"), hash_code("123457"));
    }

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn token_carries_role_and_expiry() {
        use jsonwebtoken::{DecodingKey, Validation, decode};

        let id = Uuid::new_v4();
        let expires = Utc::now() + Duration::days(7);
        let token = create_token("s3cret", id, "a@b.co", Role::Seller, expires).unwrap();
        let claims = decode::<Claims>(&token, &DecodingKey::from_secret(b"s3cret"), &Validation::default())
            .unwrap()
            .claims;
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Seller);
        assert_eq!(claims.exp, expires.timestamp() as usize);
    }
}
