use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;

use wapibei_db::Database;
use wapibei_db::json_store::JsonStore;
use wapibei_gateway::dispatcher::Dispatcher;
use wapibei_types::models::{PublicNotification, Subscriber};

use crate::error::ApiError;
use crate::mailer::Mailer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub session_days: i64,
    pub otp_ttl_minutes: i64,
    pub mailer: Mailer,
    pub upload_dir: PathBuf,
    pub subscribers: JsonStore<Vec<Subscriber>>,
    /// seller id -> profile clicks
    pub vendor_clicks: JsonStore<BTreeMap<String, u64>>,
    pub notifications: JsonStore<Vec<PublicNotification>>,
}

impl AppStateInner {
    /// State with the flat-file stores rooted at `data_dir`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        dispatcher: Dispatcher,
        jwt_secret: String,
        session_days: i64,
        otp_ttl_minutes: i64,
        mailer: Mailer,
        data_dir: PathBuf,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            dispatcher,
            jwt_secret,
            session_days,
            otp_ttl_minutes,
            mailer,
            upload_dir,
            subscribers: JsonStore::new(data_dir.join("subscribers.json")),
            vendor_clicks: JsonStore::new(data_dir.join("vendor_clicks.json")),
            notifications: JsonStore::new(data_dir.join("notifications.json")),
        }
    }
}

/// Run a blocking database call off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::Internal)
}
