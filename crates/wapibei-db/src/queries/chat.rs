use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{ConversationRow, ConversationSummaryRow, MessageRow, NewMessage, ReactionRow};

const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.sender_id,
        TRIM(u.first_name || ' ' || u.last_name), m.content, m.reply_to_id,
        m.attachment_url, m.attachment_type, m.is_draft, m.scheduled_at, m.delivered,
        m.read_at, m.edited_at, m.created_at
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

impl Database {
    // -- Conversations --

    /// Return the conversation between this buyer and seller about this
    /// product (or about nothing in particular), creating it with `new_id`
    /// if needed. The bool is true when a row was created.
    pub fn find_or_create_conversation(
        &self,
        new_id: &str,
        buyer_id: &str,
        seller_id: &str,
        product_id: Option<&str>,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn(|conn| {
            let existing = conn
                .query_row(
                    "SELECT id, buyer_id, seller_id, product_id, created_at, updated_at
                     FROM conversations
                     WHERE buyer_id = ?1 AND seller_id = ?2 AND product_id IS ?3",
                    rusqlite::params![buyer_id, seller_id, product_id],
                    map_conversation,
                )
                .optional()?;
            if let Some(row) = existing {
                return Ok((row, false));
            }

            conn.execute(
                "INSERT INTO conversations (id, buyer_id, seller_id, product_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![new_id, buyer_id, seller_id, product_id],
            )?;
            let row = query_conversation(conn, new_id)?
                .ok_or_else(|| anyhow::anyhow!("conversation {} vanished after insert", new_id))?;
            Ok((row, true))
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Inbox for `user_id`: every conversation they take part in, most
    /// recently active first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.buyer_id, c.seller_id, c.product_id, c.created_at, c.updated_at,
                    TRIM(bu.first_name || ' ' || bu.last_name),
                    COALESCE(b.name, TRIM(su.first_name || ' ' || su.last_name)),
                    p.name,
                    last.content,
                    last.created_at,
                    (SELECT COUNT(*) FROM messages m
                     WHERE m.conversation_id = c.id AND m.delivered = 1
                       AND m.read_at IS NULL AND m.sender_id != ?1)
                 FROM conversations c
                 JOIN users bu ON bu.id = c.buyer_id
                 JOIN users su ON su.id = c.seller_id
                 LEFT JOIN boutiques b ON b.seller_id = c.seller_id
                 LEFT JOIN products p ON p.id = c.product_id
                 LEFT JOIN messages last ON last.id = (
                    SELECT m.id FROM messages m
                    WHERE m.conversation_id = c.id AND m.delivered = 1
                    ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1)
                 WHERE c.buyer_id = ?1 OR c.seller_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationSummaryRow {
                        conversation: map_conversation(row)?,
                        buyer_name: row.get(6)?,
                        seller_name: row.get(7)?,
                        product_name: row.get(8)?,
                        last_message: row.get(9)?,
                        last_message_at: row.get(10)?,
                        unread_count: row.get(11)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, reply_to_id,
                    attachment_url, attachment_type, is_draft, scheduled_at, delivered)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    msg.id,
                    msg.conversation_id,
                    msg.sender_id,
                    msg.content,
                    msg.reply_to_id,
                    msg.attachment_url,
                    msg.attachment_type,
                    msg.is_draft,
                    msg.scheduled_at,
                    msg.delivered,
                ],
            )?;
            if msg.delivered {
                touch_conversation(&tx, msg.conversation_id)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            conn.query_row(&sql, [id], map_message).optional()
        })
    }

    /// Delivered messages of a conversation, oldest first. `before` is a
    /// stored timestamp; only messages strictly older are returned.
    /// `before_id` is the exact cursor: only messages older than that one
    /// by (created_at, rowid), so same-second neighbours are not skipped.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
        before_id: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.conversation_id = ?1 AND m.delivered = 1
                   AND (?2 IS NULL OR m.created_at < ?2)
                   AND (?3 IS NULL OR (m.created_at, m.rowid) <
                        (SELECT c.created_at, c.rowid FROM messages c WHERE c.id = ?3))
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![conversation_id, before, before_id, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// The sender's undelivered messages: (drafts, scheduled).
    pub fn list_undelivered(&self, sender_id: &str) -> Result<(Vec<MessageRow>, Vec<MessageRow>)> {
        self.with_conn(|conn| {
            let drafts = query_messages_where(conn, "m.sender_id = ?1 AND m.is_draft = 1", sender_id)?;
            let scheduled = query_messages_where(
                conn,
                "m.sender_id = ?1 AND m.is_draft = 0 AND m.delivered = 0",
                sender_id,
            )?;
            Ok((drafts, scheduled))
        })
    }

    pub fn edit_message(&self, id: &str, content: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?2, edited_at = datetime('now') WHERE id = ?1",
                (id, content),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }

    /// Turn a draft into a delivered message stamped now. False if `id`
    /// is not a draft.
    pub fn deliver_draft(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let conversation_id: Option<String> = tx
                .query_row(
                    "UPDATE messages SET is_draft = 0, delivered = 1, scheduled_at = NULL,
                        created_at = datetime('now')
                     WHERE id = ?1 AND is_draft = 1
                     RETURNING conversation_id",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(conversation_id) = conversation_id else {
                return Ok(false);
            };
            touch_conversation(&tx, &conversation_id)?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Deliver every scheduled message whose time has come. Returns the
    /// ids released, in schedule order.
    pub fn release_due_messages(&self) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let due: Vec<(String, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, conversation_id FROM messages
                     WHERE is_draft = 0 AND delivered = 0
                       AND scheduled_at IS NOT NULL AND scheduled_at <= datetime('now')
                     ORDER BY scheduled_at, rowid",
                )?;
                stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            for (id, conversation_id) in &due {
                tx.execute(
                    "UPDATE messages SET delivered = 1, created_at = datetime('now') WHERE id = ?1",
                    [id],
                )?;
                touch_conversation(&tx, conversation_id)?;
            }
            tx.commit()?;
            Ok(due.into_iter().map(|(id, _)| id).collect())
        })
    }

    /// Mark everything the other party sent in this conversation as read.
    pub fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE messages SET read_at = datetime('now')
                 WHERE conversation_id = ?1 AND sender_id != ?2
                   AND delivered = 1 AND read_at IS NULL",
                (conversation_id, reader_id),
            )?)
        })
    }

    pub fn unread_count_for_user(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE (c.buyer_id = ?1 OR c.seller_id = ?1)
                   AND m.sender_id != ?1 AND m.delivered = 1 AND m.read_at IS NULL",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    // -- Reactions --

    /// Toggle a reaction: removes if exists, inserts if not.
    /// Returns true when the reaction was added.
    pub fn toggle_reaction(&self, id: &str, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                rusqlite::params![message_id, user_id, emoji],
            )?;
            if removed > 0 {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO message_reactions (id, message_id, user_id, emoji) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, message_id, user_id, emoji],
            )?;
            Ok(true)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, user_id, emoji, created_at FROM message_reactions
                 WHERE message_id IN ({})
                 ORDER BY created_at, rowid",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids.iter()), |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        user_id: row.get(2)?,
                        emoji: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn touch_conversation(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE conversations SET updated_at = datetime('now') WHERE id = ?1", [id])?;
    Ok(())
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    conn.query_row(
        "SELECT id, buyer_id, seller_id, product_id, created_at, updated_at FROM conversations WHERE id = ?1",
        [id],
        map_conversation,
    )
    .optional()
}

fn query_messages_where(conn: &Connection, predicate: &str, value: &str) -> Result<Vec<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE {predicate} ORDER BY m.created_at, m.rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        buyer_id: row.get(1)?,
        seller_id: row.get(2)?,
        product_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        reply_to_id: row.get(5)?,
        attachment_url: row.get(6)?,
        attachment_type: row.get(7)?,
        is_draft: row.get(8)?,
        scheduled_at: row.get(9)?,
        delivered: row.get(10)?,
        read_at: row.get(11)?,
        edited_at: row.get(12)?,
        created_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::{seed_product, seed_user, test_db};
    use uuid::Uuid;
    use wapibei_types::models::Role;

    struct Fixture {
        db: Database,
        buyer: String,
        seller: String,
        conversation: String,
    }

    fn fixture() -> Fixture {
        let db = test_db();
        let buyer = seed_user(&db, "buyer@example.com", Role::Buyer);
        let seller = seed_user(&db, "seller@example.com", Role::Seller);
        let (row, created) = db
            .find_or_create_conversation(&Uuid::new_v4().to_string(), &buyer, &seller, None)
            .unwrap();
        assert!(created);
        Fixture {
            db,
            buyer,
            seller,
            conversation: row.id,
        }
    }

    fn send(f: &Fixture, sender: &str, content: &str, delivered: bool, scheduled_at: Option<&str>) -> String {
        let id = Uuid::new_v4().to_string();
        f.db.insert_message(&NewMessage {
            id: &id,
            conversation_id: &f.conversation,
            sender_id: sender,
            content,
            reply_to_id: None,
            attachment_url: None,
            attachment_type: None,
            is_draft: !delivered && scheduled_at.is_none(),
            scheduled_at,
            delivered,
        })
        .unwrap();
        id
    }

    #[test]
    fn conversation_is_reused_per_product() {
        let f = fixture();
        let (again, created) = f
            .db
            .find_or_create_conversation("other", &f.buyer, &f.seller, None)
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, f.conversation);

        let product = seed_product(&f.db, &f.seller, "Ankara shirt", 2_000_00);
        let (about_product, created) = f
            .db
            .find_or_create_conversation("p-conv", &f.buyer, &f.seller, Some(&product))
            .unwrap();
        assert!(created);
        assert_eq!(about_product.product_id.as_deref(), Some(product.as_str()));
        assert!(about_product.has_participant(&f.seller));
        assert!(!about_product.has_participant("stranger"));
    }

    #[test]
    fn only_delivered_messages_are_listed() {
        let f = fixture();
        send(&f, &f.buyer, "hello", true, None);
        send(&f, &f.buyer, "draft", false, None);
        send(&f, &f.buyer, "later", false, Some("2999-01-01 00:00:00"));
        send(&f, &f.seller, "karibu", true, None);

        let listed = f.db.list_messages(&f.conversation, 50, None, None).unwrap();
        let contents: Vec<_> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "karibu"]);

        let (drafts, scheduled) = f.db.list_undelivered(&f.buyer).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].content, "later");
    }

    #[test]
    fn limit_keeps_the_newest_in_ascending_order() {
        let f = fixture();
        for i in 0..5 {
            send(&f, &f.buyer, &format!("m{i}"), true, None);
        }
        let listed = f.db.list_messages(&f.conversation, 2, None, None).unwrap();
        let contents: Vec<_> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let older = f.db.list_messages(&f.conversation, 10, Some("2000-01-01 00:00:00"), None).unwrap();
        assert!(older.is_empty());
    }

    #[test]
    fn id_cursor_pages_through_messages_sent_in_the_same_second() {
        let f = fixture();
        for i in 0..4 {
            send(&f, &f.buyer, &format!("m{i}"), true, None);
        }
        f.db.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET created_at = '2026-03-01 12:00:00' WHERE conversation_id = ?1",
                [&f.conversation],
            )?;
            Ok(())
        })
        .unwrap();

        let page = |before_id: Option<&str>| {
            f.db.list_messages(&f.conversation, 2, None, before_id)
                .unwrap()
                .into_iter()
                .map(|m| (m.id, m.content))
                .collect::<Vec<_>>()
        };
        let newest = page(None);
        assert_eq!(newest.iter().map(|m| m.1.as_str()).collect::<Vec<_>>(), vec!["m2", "m3"]);
        let older = page(Some(newest[0].0.as_str()));
        assert_eq!(older.iter().map(|m| m.1.as_str()).collect::<Vec<_>>(), vec!["m0", "m1"]);
        assert!(page(Some(older[0].0.as_str())).is_empty());
    }

    #[test]
    fn conversations_are_unique_per_product_in_the_schema() {
        let f = fixture();
        let duplicate = f.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, buyer_id, seller_id, product_id) VALUES ('dup', ?1, ?2, NULL)",
                [&f.buyer, &f.seller],
            )?;
            Ok(())
        });
        assert!(duplicate.is_err());

        let product = seed_product(&f.db, &f.seller, "Sisal basket", 900_00);
        for id in ["first", "second"] {
            let inserted = f.db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO conversations (id, buyer_id, seller_id, product_id) VALUES (?1, ?2, ?3, ?4)",
                    [id, f.buyer.as_str(), f.seller.as_str(), product.as_str()],
                )?;
                Ok(())
            });
            assert_eq!(inserted.is_ok(), id == "first");
        }
    }

    #[test]
    fn due_scheduled_messages_are_released_once() {
        let f = fixture();
        let due = send(&f, &f.buyer, "due", false, Some("2000-01-01 00:00:00"));
        send(&f, &f.buyer, "future", false, Some("2999-01-01 00:00:00"));

        assert_eq!(f.db.release_due_messages().unwrap(), vec![due.clone()]);
        assert!(f.db.release_due_messages().unwrap().is_empty());
        assert!(f.db.get_message(&due).unwrap().unwrap().delivered);
    }

    #[test]
    fn drafts_can_be_delivered() {
        let f = fixture();
        let draft = send(&f, &f.buyer, "draft", false, None);
        let sent = send(&f, &f.buyer, "sent", true, None);

        assert!(f.db.deliver_draft(&draft).unwrap());
        assert!(!f.db.deliver_draft(&sent).unwrap());
        let row = f.db.get_message(&draft).unwrap().unwrap();
        assert!(row.delivered && !row.is_draft);
    }

    #[test]
    fn unread_counts_ignore_own_messages() {
        let f = fixture();
        send(&f, &f.buyer, "one", true, None);
        send(&f, &f.buyer, "two", true, None);
        send(&f, &f.seller, "reply", true, None);

        assert_eq!(f.db.unread_count_for_user(&f.seller).unwrap(), 2);
        assert_eq!(f.db.unread_count_for_user(&f.buyer).unwrap(), 1);

        let inbox = f.db.list_conversations(&f.seller).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].unread_count, 2);
        assert_eq!(inbox[0].last_message.as_deref(), Some("reply"));

        assert_eq!(f.db.mark_read(&f.conversation, &f.seller).unwrap(), 2);
        assert_eq!(f.db.unread_count_for_user(&f.seller).unwrap(), 0);
    }

    #[test]
    fn reactions_toggle_and_batch_fetch() {
        let f = fixture();
        let msg = send(&f, &f.buyer, "nice", true, None);

        assert!(f.db.toggle_reaction("r1", &msg, &f.seller, "👍").unwrap());
        assert!(f.db.toggle_reaction("r2", &msg, &f.buyer, "👍").unwrap());
        assert!(!f.db.toggle_reaction("r3", &msg, &f.seller, "👍").unwrap());

        let rows = f.db.get_reactions_for_messages(&[msg.clone()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, f.buyer);

        assert!(f.db.delete_message(&msg).unwrap());
        assert!(f.db.get_reactions_for_messages(&[msg]).unwrap().is_empty());
    }
}
