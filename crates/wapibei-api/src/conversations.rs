use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use wapibei_db::models::{ConversationRow, NewMessage};
use wapibei_db::to_sql_time;
use wapibei_types::api::{
    CreateConversationRequest, MarkReadResponse, MessageQuery, SendMessageRequest,
};
use wapibei_types::models::{Conversation, Message};

use crate::error::ApiError;
use crate::messages::{load_message, with_reactions};
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

const MAX_MESSAGE_PAGE: u32 = 200;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let uid = auth.id_str();
    let rows = blocking(&state, move |db| db.list_conversations(&uid)).await?;
    Ok(Json(rows.into_iter().map(|r| r.into_api()).collect()))
}

/// Open (or reopen) the caller's conversation with a seller, optionally
/// about one of the seller's products. 201 when it was created.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    if req.seller_id == auth.id {
        return Err(ApiError::bad_request("cannot start a conversation with yourself"));
    }

    let (sid, pid) = (req.seller_id.to_string(), req.product_id.map(|p| p.to_string()));
    let (seller, product) = blocking(&state, move |db| {
        let seller = db.get_user_by_id(&sid)?;
        let product = match &pid {
            Some(pid) => db.get_product(pid)?,
            None => None,
        };
        Ok((seller, product))
    })
    .await?;

    if !seller.is_some_and(|s| s.role().can_sell()) {
        return Err(ApiError::not_found("seller"));
    }
    if req.product_id.is_some() {
        let product = product.ok_or_else(|| ApiError::not_found("product"))?;
        if product.seller_id != req.seller_id.to_string() {
            return Err(ApiError::bad_request("product does not belong to this seller"));
        }
    }

    let (new_id, buyer, seller, product) = (
        Uuid::new_v4().to_string(),
        auth.id_str(),
        req.seller_id.to_string(),
        req.product_id.map(|p| p.to_string()),
    );
    let (conversation, created) = blocking(&state, move |db| {
        let (row, created) = db.find_or_create_conversation(&new_id, &buyer, &seller, product.as_deref())?;
        let summary = db
            .list_conversations(&buyer)?
            .into_iter()
            .find(|s| s.conversation.id == row.id);
        Ok((summary, created))
    })
    .await?;
    let conversation = conversation.ok_or_else(|| ApiError::not_found("conversation"))?;

    if created {
        info!("{} opened conversation {} with seller {}", auth.email, conversation.conversation.id, req.seller_id);
    }
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(conversation.into_api())))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Message>>, ApiError> {
    participant_of(&state, conversation_id, &auth).await?;

    let cid = conversation_id.to_string();
    let limit = query.limit.clamp(1, MAX_MESSAGE_PAGE);
    let before = query.before.map(to_sql_time);
    let before_id = query.before_id.map(|id| id.to_string());
    let messages = blocking(&state, move |db| {
        if let Some(anchor) = &before_id {
            let known = db.get_message(anchor)?.is_some_and(|m| m.conversation_id == cid && m.delivered);
            if !known {
                return Ok(None);
            }
        }
        let rows = db.list_messages(&cid, limit, before.as_deref(), before_id.as_deref())?;
        with_reactions(db, rows).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("before_id is not a message of this conversation"))?;
    Ok(Json(messages))
}

/// Store a message. Drafts and future-scheduled messages wait; anything
/// else is delivered and pushed to the conversation's sockets at once.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    participant_of(&state, conversation_id, &auth).await?;

    let content = req.content.as_deref().map(str::trim).unwrap_or_default().to_string();
    let attachment_url = req.attachment_url.filter(|u| !u.trim().is_empty());
    if content.is_empty() && attachment_url.is_none() {
        return Err(ApiError::bad_request("message needs content or an attachment"));
    }

    if let Some(reply_to) = req.reply_to_id {
        let rid = reply_to.to_string();
        let parent = blocking(&state, move |db| db.get_message(&rid)).await?;
        if !parent.is_some_and(|p| p.conversation_id == conversation_id.to_string() && p.delivered) {
            return Err(ApiError::bad_request("reply_to_id is not a message of this conversation"));
        }
    }

    let scheduled_at = req.scheduled_at.filter(|at| *at > Utc::now());
    let delivered = !req.is_draft && scheduled_at.is_none();

    let message_id = Uuid::new_v4().to_string();
    let (cid, sender) = (conversation_id.to_string(), auth.id_str());
    let (reply_to, attachment_type) = (req.reply_to_id.map(|r| r.to_string()), req.attachment_type);
    let scheduled = scheduled_at.map(to_sql_time);
    let is_draft = req.is_draft;
    let message = blocking(&state, move |db| {
        db.insert_message(&NewMessage {
            id: &message_id,
            conversation_id: &cid,
            sender_id: &sender,
            content: &content,
            reply_to_id: reply_to.as_deref(),
            attachment_url: attachment_url.as_deref(),
            attachment_type: attachment_type.as_deref(),
            is_draft,
            scheduled_at: scheduled.as_deref(),
            delivered,
        })?;
        load_message(db, &message_id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("message"))?;

    if message.delivered {
        let reached = state.dispatcher.broadcast_message(&message).await;
        debug!("Message {} reached {} sockets", message.id, reached);
    }
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    participant_of(&state, conversation_id, &auth).await?;

    let (cid, uid) = (conversation_id.to_string(), auth.id_str());
    let updated = blocking(&state, move |db| db.mark_read(&cid, &uid)).await?;
    Ok(Json(MarkReadResponse { updated }))
}

async fn participant_of(state: &AppState, conversation_id: Uuid, auth: &AuthUser) -> Result<ConversationRow, ApiError> {
    let cid = conversation_id.to_string();
    let conversation = blocking(state, move |db| db.get_conversation(&cid))
        .await?
        .ok_or_else(|| ApiError::not_found("conversation"))?;
    if !conversation.has_participant(&auth.id_str()) {
        return Err(ApiError::forbidden("not part of this conversation"));
    }
    Ok(conversation)
}
