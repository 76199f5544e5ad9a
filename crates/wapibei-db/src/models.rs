//! Database row types. These map directly to SQLite rows and stay
//! string-typed; `into_api` converts them to the wapibei-types models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use wapibei_types::models::{
    Boutique, Conversation, Message, Post, Product, ReactionGroup, Role, Testimonial, User,
    UserStatus,
};

use crate::parse_sql_time;

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

fn parse_opt_id(raw: Option<&str>, what: &str) -> Option<Uuid> {
    raw.map(|r| parse_id(r, what))
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    parse_sql_time(raw).unwrap_or_else(|| {
        warn!("Corrupt timestamp '{}'", raw);
        DateTime::default()
    })
}

fn parse_opt_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.map(parse_time)
}

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

impl UserRow {
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_else(|e| {
            warn!("User {} has {}, treating as buyer", self.id, e);
            Role::Buyer
        })
    }

    pub fn status(&self) -> UserStatus {
        self.status.parse().unwrap_or_else(|e| {
            warn!("User {} has {}, treating as suspended", self.id, e);
            UserStatus::Suspended
        })
    }

    pub fn uuid(&self) -> Uuid {
        parse_id(&self.id, "user id")
    }

    /// `include_email` is false when a profile is shown to someone other
    /// than its owner or an admin.
    pub fn into_api(self, include_email: bool) -> User {
        User {
            id: self.uuid(),
            role: self.role(),
            status: self.status(),
            email: include_email.then_some(self.email),
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            avatar_url: self.avatar_url,
            bio: self.bio,
            email_verified: self.email_verified,
            created_at: parse_time(&self.created_at),
            last_login_at: parse_opt_time(self.last_login_at.as_deref()),
        }
    }
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
}

pub struct OtpRow {
    pub id: String,
    pub user_id: String,
    pub code_hash: String,
    pub attempts: u32,
    pub expired: bool,
}

pub struct SessionRow {
    pub id: String,
    pub user_id: String,
}

pub struct ProductRow {
    pub id: String,
    pub seller_id: String,
    pub seller_name: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub stock: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ProductRow {
    pub fn into_api(self) -> Product {
        Product {
            id: parse_id(&self.id, "product id"),
            seller_id: parse_id(&self.seller_id, "seller id"),
            seller_name: self.seller_name,
            name: self.name,
            description: self.description,
            price_cents: self.price_cents,
            currency: self.currency,
            category: self.category,
            image_url: self.image_url,
            stock: self.stock,
            status: self.status,
            created_at: parse_time(&self.created_at),
            updated_at: parse_time(&self.updated_at),
        }
    }
}

pub struct BoutiqueRow {
    pub id: String,
    pub seller_id: String,
    pub name: String,
    pub description: String,
    pub logo_url: Option<String>,
    pub banner_url: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub settings: String,
    pub product_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl BoutiqueRow {
    pub fn into_api(self) -> Boutique {
        let settings = serde_json::from_str(&self.settings).unwrap_or_else(|e| {
            warn!("Corrupt settings on boutique '{}': {}", self.id, e);
            serde_json::Value::Object(Default::default())
        });
        Boutique {
            id: parse_id(&self.id, "boutique id"),
            seller_id: parse_id(&self.seller_id, "seller id"),
            name: self.name,
            description: self.description,
            logo_url: self.logo_url,
            banner_url: self.banner_url,
            location: self.location,
            phone: self.phone,
            whatsapp: self.whatsapp,
            settings,
            product_count: self.product_count,
            created_at: parse_time(&self.created_at),
            updated_at: parse_time(&self.updated_at),
        }
    }
}

pub struct ConversationRow {
    pub id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRow {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// A conversation as listed in an inbox: names, last delivered message
/// and the number of messages the viewer has not read yet.
pub struct ConversationSummaryRow {
    pub conversation: ConversationRow,
    pub buyer_name: String,
    pub seller_name: String,
    pub product_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<String>,
    pub unread_count: i64,
}

impl ConversationSummaryRow {
    pub fn into_api(self) -> Conversation {
        let c = self.conversation;
        Conversation {
            id: parse_id(&c.id, "conversation id"),
            buyer_id: parse_id(&c.buyer_id, "buyer id"),
            buyer_name: self.buyer_name,
            seller_id: parse_id(&c.seller_id, "seller id"),
            seller_name: self.seller_name,
            product_id: parse_opt_id(c.product_id.as_deref(), "product id"),
            product_name: self.product_name,
            last_message: self.last_message,
            last_message_at: parse_opt_time(self.last_message_at.as_deref()),
            unread_count: self.unread_count,
            created_at: parse_time(&c.created_at),
            updated_at: parse_time(&c.updated_at),
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_type: Option<String>,
    pub is_draft: bool,
    pub scheduled_at: Option<String>,
    pub delivered: bool,
    pub read_at: Option<String>,
    pub edited_at: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_api(self, reactions: Vec<ReactionGroup>) -> Message {
        Message {
            id: parse_id(&self.id, "message id"),
            conversation_id: parse_id(&self.conversation_id, "conversation id"),
            sender_id: parse_id(&self.sender_id, "sender id"),
            sender_name: self.sender_name,
            content: self.content,
            reply_to_id: parse_opt_id(self.reply_to_id.as_deref(), "reply_to id"),
            attachment_url: self.attachment_url,
            attachment_type: self.attachment_type,
            is_draft: self.is_draft,
            scheduled_at: parse_opt_time(self.scheduled_at.as_deref()),
            delivered: self.delivered,
            read_at: parse_opt_time(self.read_at.as_deref()),
            edited_at: parse_opt_time(self.edited_at.as_deref()),
            created_at: parse_time(&self.created_at),
            reactions,
        }
    }
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub reply_to_id: Option<&'a str>,
    pub attachment_url: Option<&'a str>,
    pub attachment_type: Option<&'a str>,
    pub is_draft: bool,
    pub scheduled_at: Option<&'a str>,
    pub delivered: bool,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

/// Group reaction rows by message, then by emoji, keeping first-reaction order.
pub fn group_reactions(rows: &[ReactionRow]) -> HashMap<String, Vec<ReactionGroup>> {
    let mut grouped: HashMap<String, Vec<ReactionGroup>> = HashMap::new();
    for r in rows {
        let groups = grouped.entry(r.message_id.clone()).or_default();
        let user_id = parse_id(&r.user_id, "reaction user id");
        match groups.iter_mut().find(|g| g.emoji == r.emoji) {
            Some(group) => {
                group.user_ids.push(user_id);
                group.count += 1;
            }
            None => groups.push(ReactionGroup {
                emoji: r.emoji.clone(),
                count: 1,
                user_ids: vec![user_id],
            }),
        }
    }
    grouped
}

pub struct PostRow {
    pub id: String,
    pub author_id: Option<String>,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub cover_url: Option<String>,
    pub published: bool,
    pub created_at: String,
}

impl PostRow {
    pub fn into_api(self) -> Post {
        Post {
            id: parse_id(&self.id, "post id"),
            author_id: parse_opt_id(self.author_id.as_deref(), "author id"),
            title: self.title,
            slug: self.slug,
            body: self.body,
            cover_url: self.cover_url,
            published: self.published,
            created_at: parse_time(&self.created_at),
        }
    }
}

pub struct TestimonialRow {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub content: String,
    pub rating: u8,
    pub approved: bool,
    pub created_at: String,
}

impl TestimonialRow {
    pub fn into_api(self) -> Testimonial {
        Testimonial {
            id: parse_id(&self.id, "testimonial id"),
            user_id: parse_opt_id(self.user_id.as_deref(), "user id"),
            name: self.name,
            content: self.content,
            rating: self.rating,
            approved: self.approved,
            created_at: parse_time(&self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(message_id: &str, user_id: Uuid, emoji: &str) -> ReactionRow {
        ReactionRow {
            id: Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
            created_at: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn reactions_group_by_message_and_emoji() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![
            reaction("m1", a, "👍"),
            reaction("m1", b, "👍"),
            reaction("m1", a, "🔥"),
            reaction("m2", b, "❤️"),
        ];

        let grouped = group_reactions(&rows);
        let m1 = &grouped["m1"];
        assert_eq!(m1.len(), 2);
        assert_eq!(m1[0].emoji, "👍");
        assert_eq!(m1[0].count, 2);
        assert_eq!(m1[0].user_ids, vec![a, b]);
        assert_eq!(m1[1].emoji, "🔥");
        assert_eq!(grouped["m2"][0].count, 1);
    }

    #[test]
    fn private_profile_hides_email() {
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            email: "amina@example.com".into(),
            password: "x".into(),
            first_name: "Amina".into(),
            last_name: "Otieno".into(),
            phone: None,
            avatar_url: None,
            bio: None,
            role: "seller".into(),
            status: "active".into(),
            email_verified: true,
            created_at: "2025-01-01 00:00:00".into(),
            last_login_at: None,
        };
        let user = row.into_api(false);
        assert!(user.email.is_none());
        assert_eq!(user.role, Role::Seller);
        assert_eq!(user.display_name(), "Amina Otieno");
    }
}
