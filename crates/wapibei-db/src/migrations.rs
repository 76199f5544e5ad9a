use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                first_name      TEXT NOT NULL,
                last_name       TEXT NOT NULL,
                phone           TEXT,
                avatar_url      TEXT,
                bio             TEXT,
                role            TEXT NOT NULL DEFAULT 'buyer'
                                CHECK (role IN ('buyer', 'seller', 'admin')),
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'active', 'suspended')),
                email_verified  INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
                last_login_at   TEXT
            );

            CREATE TABLE IF NOT EXISTS otp_verifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                purpose     TEXT NOT NULL,
                code_hash   TEXT NOT NULL,
                attempts    INTEGER NOT NULL DEFAULT 0,
                expires_at  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(user_id, purpose)
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token       TEXT NOT NULL UNIQUE,
                expires_at  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

            CREATE TABLE IF NOT EXISTS boutiques (
                id          TEXT PRIMARY KEY,
                seller_id   TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                logo_url    TEXT,
                banner_url  TEXT,
                location    TEXT,
                phone       TEXT,
                whatsapp    TEXT,
                settings    TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS products (
                id          TEXT PRIMARY KEY,
                seller_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
                currency    TEXT NOT NULL DEFAULT 'KES',
                category    TEXT,
                image_url   TEXT,
                stock       INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
                status      TEXT NOT NULL DEFAULT 'active'
                            CHECK (status IN ('active', 'hidden')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_products_seller ON products(seller_id);
            CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);

            CREATE TABLE IF NOT EXISTS posts (
                id          TEXT PRIMARY KEY,
                author_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
                title       TEXT NOT NULL,
                slug        TEXT NOT NULL UNIQUE,
                body        TEXT NOT NULL,
                cover_url   TEXT,
                published   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS favorites (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                product_id  TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, product_id)
            );

            CREATE TABLE IF NOT EXISTS testimonials (
                id          TEXT PRIMARY KEY,
                user_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
                name        TEXT NOT NULL,
                content     TEXT NOT NULL,
                rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                approved    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY,
                buyer_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                seller_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                product_id  TEXT REFERENCES products(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_buyer ON conversations(buyer_id);
            CREATE INDEX IF NOT EXISTS idx_conversations_seller ON conversations(seller_id);

            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL DEFAULT '',
                reply_to_id     TEXT REFERENCES messages(id) ON DELETE SET NULL,
                attachment_url  TEXT,
                attachment_type TEXT,
                is_draft        INTEGER NOT NULL DEFAULT 0,
                scheduled_at    TEXT,
                delivered       INTEGER NOT NULL DEFAULT 0,
                read_at         TEXT,
                edited_at       TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);

            CREATE TABLE IF NOT EXISTS message_reactions (
                id          TEXT PRIMARY KEY,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(message_id, user_id, emoji)
            );

            CREATE INDEX IF NOT EXISTS idx_reactions_message
                ON message_reactions(message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2: unique conversations");
        conn.execute_batch(
            "
            CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_unique
                ON conversations(buyer_id, seller_id, COALESCE(product_id, ''));

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 2);
    }
}
