use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::messages::load_message;
use crate::state::{AppState, blocking};

/// Background task that delivers scheduled messages once they are due.
///
/// Each tick marks due messages delivered, pushes them to the conversation's
/// sockets, and drops expired sessions and one-time codes.
pub async fn run_release_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match release_due(&state).await {
            Ok(count) => {
                if count > 0 {
                    info!("Release: delivered {} scheduled messages", count);
                }
            }
            Err(e) => {
                warn!("Release error: {:?}", e);
            }
        }

        match blocking(&state, |db| db.prune_expired_credentials()).await {
            Ok(0) => {}
            Ok(n) => debug!("Pruned {} expired sessions and codes", n),
            Err(e) => warn!("Prune error: {:?}", e),
        }
    }
}

/// Deliver and broadcast every scheduled message whose time has come.
/// Returns how many were released.
pub async fn release_due(state: &AppState) -> Result<usize, ApiError> {
    let released = blocking(state, |db| {
        let ids = db.release_due_messages()?;
        let mut messages = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(message) = load_message(db, id)? {
                messages.push(message);
            }
        }
        Ok(messages)
    })
    .await?;

    for message in &released {
        state.dispatcher.broadcast_message(message).await;
    }
    Ok(released.len())
}
