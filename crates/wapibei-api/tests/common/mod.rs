#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use wapibei_api::auth::hash_password;
use wapibei_api::mailer::Mailer;
use wapibei_api::state::{AppState, AppStateInner};
use wapibei_db::Database;
use wapibei_db::models::NewUser;
use wapibei_gateway::dispatcher::Dispatcher;
use wapibei_types::models::Role;

pub const PASSWORD: &str = "pole-pole-ndio-mwendo";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_otp_ttl(10)
    }

    pub fn with_otp_ttl(otp_ttl_minutes: i64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state: AppState = Arc::new(AppStateInner::new(
            Database::open_in_memory().unwrap(),
            Dispatcher::new(),
            "test-secret".into(),
            7,
            otp_ttl_minutes,
            Mailer::outbox(),
            dir.path().join("data"),
            dir.path().join("uploads"),
        ));
        Self {
            router: wapibei_api::router(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, token, None).await
    }

    /// Most recent six-digit code mailed to `email`.
    pub fn last_code(&self, email: &str) -> String {
        let mail = self
            .state
            .mailer
            .sent()
            .into_iter()
            .rev()
            .find(|m| m.to == email)
            .expect("no mail sent to this address");
        mail.body
            .split(|c: char| !c.is_ascii_digit())
            .find(|word| word.len() == 6)
            .expect("mail carries no code")
            .to_string()
    }

    pub async fn register(&self, email: &str, role: &str) -> (StatusCode, Value) {
        self.post(
            "/api/auth/register",
            None,
            json!({
                "email": email,
                "password": PASSWORD,
                "first_name": "Wanjiku",
                "last_name": "Kamau",
                "role": role,
            }),
        )
        .await
    }

    /// Register, verify by mailed code, and return (token, user id).
    pub async fn signup(&self, email: &str, role: &str) -> (String, Uuid) {
        let (status, body) = self.register(email, role).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let code = self.last_code(email);
        let (status, body) = self
            .post("/api/auth/verify-otp", None, json!({ "email": email, "code": code }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        token_and_id(&body)
    }

    /// Admins cannot self-register; create one straight in the database.
    pub async fn admin(&self) -> (String, Uuid) {
        let id = Uuid::new_v4().to_string();
        let hash = hash_password(PASSWORD).unwrap();
        self.state
            .db
            .create_user(&NewUser {
                id: &id,
                email: "admin@wapibei.test",
                password_hash: &hash,
                first_name: "Site",
                last_name: "Admin",
                phone: None,
                role: Role::Admin,
            })
            .unwrap();
        self.state.db.activate_user(&id).unwrap();
        self.login("admin@wapibei.test").await
    }

    pub async fn login(&self, email: &str) -> (String, Uuid) {
        let (status, body) = self
            .post("/api/auth/login", None, json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        token_and_id(&body)
    }

    pub async fn create_product(&self, token: &str, name: &str, price_cents: i64) -> Value {
        let (status, body) = self
            .post(
                "/api/products",
                Some(token),
                json!({ "name": name, "price_cents": price_cents, "category": "fashion", "stock": 4 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

pub fn token_and_id(body: &Value) -> (String, Uuid) {
    let token = body["token"].as_str().unwrap().to_string();
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
    (token, id)
}
