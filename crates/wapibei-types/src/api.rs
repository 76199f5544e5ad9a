use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Boutique, Message, Product, PublicNotification, ReactionGroup, Role, User, UserStatus};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the auth handlers.
/// `jti` keeps tokens issued within the same second distinct so each one
/// maps to its own session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub jti: Uuid,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageOnly {
    pub message: String,
}

// -- Products --

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub seller_id: Option<Uuid>,
    pub search: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    #[serde(default = "default_page_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_page_limit() -> u32 {
    20
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub stock: Option<i64>,
    pub status: Option<String>,
}

// -- Sellers --

#[derive(Debug, Deserialize)]
pub struct UpsertBoutiqueRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub logo_url: Option<String>,
    pub banner_url: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SellerDetail {
    pub boutique: Boutique,
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClickResponse {
    pub seller_id: Uuid,
    pub clicks: u64,
}

// -- Conversations & messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub seller_id: Uuid,
    #[serde(default)]
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_message_limit")]
    pub limit: u32,
    /// Only messages created strictly before this instant. Stored times
    /// have one-second resolution, so paging should use `before_id`.
    pub before: Option<DateTime<Utc>>,
    /// Cursor: id of the oldest message from the previous page.
    pub before_id: Option<Uuid>,
}

fn default_message_limit() -> u32 {
    50
}

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub attachment_type: Option<String>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub added: bool,
    pub reactions: Vec<ReactionGroup>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DraftList {
    pub drafts: Vec<Message>,
    pub scheduled: Vec<Message>,
}

// -- Users --

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub product_id: Uuid,
    pub favorited: bool,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNotificationRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub unread_messages: i64,
    pub public: Vec<PublicNotification>,
}

// -- Newsletter --

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub email: String,
    pub already_subscribed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub removed: bool,
}

// -- Stats --

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PublicStats {
    pub products: i64,
    pub sellers: i64,
    pub buyers: i64,
    pub boutiques: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminStats {
    pub users_by_role: Vec<CountBy>,
    pub users_by_status: Vec<CountBy>,
    pub products: i64,
    pub boutiques: i64,
    pub conversations: i64,
    pub messages: i64,
    pub subscribers: usize,
    pub vendor_clicks: u64,
    pub top_sellers_by_clicks: Vec<SellerClicks>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountBy {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerClicks {
    pub seller_id: Uuid,
    pub clicks: u64,
}

// -- Content --

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub slug: Option<String>,
    pub body: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default = "default_true")]
    pub published: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTestimonialRequest {
    pub content: String,
    pub rating: u8,
}

// -- Uploads --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub size: u64,
}
