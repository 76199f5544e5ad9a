use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{debug, info};
use uuid::Uuid;

use wapibei_db::Database;
use wapibei_db::models::{MessageRow, group_reactions};
use wapibei_types::api::{DraftList, EditMessageRequest, ToggleReactionRequest, ToggleReactionResponse};
use wapibei_types::models::Message;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

const MAX_EMOJI_LEN: usize = 32;

/// Attach grouped reactions to a batch of rows, keeping their order.
pub(crate) fn with_reactions(db: &Database, rows: Vec<MessageRow>) -> anyhow::Result<Vec<Message>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let reaction_rows = db.get_reactions_for_messages(&ids)?;
    let mut grouped = group_reactions(&reaction_rows);

    Ok(rows
        .into_iter()
        .map(|row| {
            let reactions = grouped.remove(&row.id).unwrap_or_default();
            row.into_api(reactions)
        })
        .collect())
}

pub(crate) fn load_message(db: &Database, id: &str) -> anyhow::Result<Option<Message>> {
    let Some(row) = db.get_message(id)? else {
        return Ok(None);
    };
    Ok(with_reactions(db, vec![row])?.pop())
}

/// GET /messages/drafts: the caller's drafts and not-yet-released scheduled messages.
pub async fn list_drafts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<DraftList>, ApiError> {
    let uid = auth.id_str();
    let list = blocking(&state, move |db| {
        let (drafts, scheduled) = db.list_undelivered(&uid)?;
        Ok(DraftList {
            drafts: with_reactions(db, drafts)?,
            scheduled: with_reactions(db, scheduled)?,
        })
    })
    .await?;
    Ok(Json(list))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("content cannot be empty"));
    }
    own_message(&state, message_id, &auth).await?;

    let mid = message_id.to_string();
    let message = blocking(&state, move |db| {
        db.edit_message(&mid, &content)?;
        load_message(db, &mid)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("message"))?;

    if message.delivered {
        state.dispatcher.broadcast_message(&message).await;
    }
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    own_message(&state, message_id, &auth).await?;

    let mid = message_id.to_string();
    blocking(&state, move |db| db.delete_message(&mid)).await?;
    debug!("{} deleted message {}", auth.email, message_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /messages/{id}/send: deliver a draft now.
pub async fn send_draft(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Message>, ApiError> {
    own_message(&state, message_id, &auth).await?;

    let mid = message_id.to_string();
    let message = blocking(&state, move |db| {
        if !db.deliver_draft(&mid)? {
            return Ok(None);
        }
        load_message(db, &mid)
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("message is not a draft"))?;

    let reached = state.dispatcher.broadcast_message(&message).await;
    info!("Draft {} sent, {} sockets reached", message_id, reached);
    Ok(Json(message))
}

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<Json<ToggleReactionResponse>, ApiError> {
    let emoji = req.emoji.trim().to_string();
    if emoji.is_empty() || emoji.len() > MAX_EMOJI_LEN {
        return Err(ApiError::bad_request("emoji must be 1 to 32 bytes"));
    }

    let mid = message_id.to_string();
    let row = blocking(&state, move |db| db.get_message(&mid))
        .await?
        .ok_or_else(|| ApiError::not_found("message"))?;
    if !row.delivered {
        return Err(ApiError::bad_request("message has not been delivered"));
    }

    let cid = row.conversation_id.clone();
    let conversation = blocking(&state, move |db| db.get_conversation(&cid))
        .await?
        .ok_or_else(|| ApiError::not_found("conversation"))?;
    if !conversation.has_participant(&auth.id_str()) {
        return Err(ApiError::forbidden("not part of this conversation"));
    }

    let (mid, uid) = (message_id.to_string(), auth.id_str());
    let (added, message) = blocking(&state, move |db| {
        let added = db.toggle_reaction(&Uuid::new_v4().to_string(), &mid, &uid, &emoji)?;
        Ok((added, load_message(db, &mid)?))
    })
    .await?;
    let message = message.ok_or_else(|| ApiError::not_found("message"))?;

    state.dispatcher.broadcast_message(&message).await;
    Ok(Json(ToggleReactionResponse {
        added,
        reactions: message.reactions,
    }))
}

/// 404 for unknown ids, 403 when someone else wrote it.
async fn own_message(state: &AppState, message_id: Uuid, auth: &AuthUser) -> Result<MessageRow, ApiError> {
    let mid = message_id.to_string();
    let row = blocking(state, move |db| db.get_message(&mid))
        .await?
        .ok_or_else(|| ApiError::not_found("message"))?;
    if row.sender_id != auth.id_str() {
        return Err(ApiError::forbidden("not your message"));
    }
    Ok(row)
}
