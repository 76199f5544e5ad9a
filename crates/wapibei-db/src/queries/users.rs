use anyhow::Result;
use rusqlite::{Connection, Row};

use wapibei_types::api::UpdateProfileRequest;
use wapibei_types::models::{Role, UserStatus};

use super::OptionalExt;
use crate::Database;
use crate::models::{NewUser, OtpRow, SessionRow, UserRow};

const USER_COLUMNS: &str = "id, email, password, first_name, last_name, phone, avatar_url, bio, \
     role, status, email_verified, created_at, last_login_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, first_name, last_name, phone, role)
                 VALUES (?1, lower(?2), ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user.id,
                    user.email,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    user.phone,
                    user.role.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "lower(email) = lower(?1)", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    pub fn list_users(&self, role: Option<Role>, status: Option<UserStatus>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 IS NULL OR role = ?1) AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![role.map(|r| r.as_str()), status.map(|s| s.as_str())],
                    map_user,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Partial profile update; `None` fields keep their stored value.
    pub fn update_profile(&self, id: &str, patch: &UpdateProfileRequest) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    first_name = COALESCE(?2, first_name),
                    last_name  = COALESCE(?3, last_name),
                    phone      = COALESCE(?4, phone),
                    avatar_url = COALESCE(?5, avatar_url),
                    bio        = COALESCE(?6, bio),
                    updated_at = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    patch.first_name,
                    patch.last_name,
                    patch.phone,
                    patch.avatar_url,
                    patch.bio,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_user_status(&self, id: &str, status: UserStatus) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
                (id, status.as_str()),
            )?;
            Ok(changed > 0)
        })
    }

    /// Mark the email verified and move a pending account to active.
    pub fn activate_user(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                    email_verified = 1,
                    status = CASE WHEN status = 'pending' THEN 'active' ELSE status END,
                    updated_at = datetime('now')
                 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn record_login(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET last_login_at = datetime('now') WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, updated_at = datetime('now') WHERE id = ?1",
                (id, password_hash),
            )?;
            Ok(())
        })
    }

    // -- OTP --

    /// Store a fresh code for (user, purpose), replacing any previous one.
    pub fn upsert_otp(
        &self,
        id: &str,
        user_id: &str,
        purpose: &str,
        code_hash: &str,
        ttl_minutes: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM otp_verifications WHERE user_id = ?1 AND purpose = ?2",
                (user_id, purpose),
            )?;
            tx.execute(
                "INSERT INTO otp_verifications (id, user_id, purpose, code_hash, expires_at)
                 VALUES (?1, ?2, ?3, ?4, datetime('now', ?5))",
                rusqlite::params![id, user_id, purpose, code_hash, format!("{ttl_minutes:+} minutes")],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_otp(&self, user_id: &str, purpose: &str) -> Result<Option<OtpRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, code_hash, attempts, expires_at <= datetime('now')
                 FROM otp_verifications WHERE user_id = ?1 AND purpose = ?2",
                (user_id, purpose),
                |row| {
                    Ok(OtpRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        code_hash: row.get(2)?,
                        attempts: row.get(3)?,
                        expired: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Count a failed attempt. Returns the new attempt total.
    pub fn bump_otp_attempts(&self, id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let attempts = conn.query_row(
                "UPDATE otp_verifications SET attempts = attempts + 1 WHERE id = ?1 RETURNING attempts",
                [id],
                |row| row.get(0),
            )?;
            Ok(attempts)
        })
    }

    pub fn delete_otp(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM otp_verifications WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: &str, user_id: &str, token: &str, expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
                (id, user_id, token, expires_at),
            )?;
            Ok(())
        })
    }

    /// Session for `token` if it exists and has not expired.
    pub fn get_live_session(&self, token: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
                [token],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM sessions WHERE token = ?1", [token])? > 0))
    }

    pub fn delete_user_sessions(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?))
    }

    /// Drop expired sessions and one-time codes. Returns rows removed.
    pub fn prune_expired_credentials(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let sessions =
                conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])?;
            let otps = conn.execute(
                "DELETE FROM otp_verifications WHERE expires_at <= datetime('now')",
                [],
            )?;
            Ok(sessions + otps)
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        phone: row.get(5)?,
        avatar_url: row.get(6)?,
        bio: row.get(7)?,
        role: row.get(8)?,
        status: row.get(9)?,
        email_verified: row.get(10)?,
        created_at: row.get(11)?,
        last_login_at: row.get(12)?,
    })
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], map_user).optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::{seed_user, test_db};
    use uuid::Uuid;

    #[test]
    fn email_lookup_is_case_insensitive() {
        let db = test_db();
        let id = seed_user(&db, "Wanjiku@Example.com", Role::Buyer);

        let row = db.get_user_by_email("WANJIKU@example.COM").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.email, "wanjiku@example.com");
        assert_eq!(row.status(), UserStatus::Pending);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = test_db();
        seed_user(&db, "dup@example.com", Role::Buyer);
        let again = NewUser {
            id: &Uuid::new_v4().to_string(),
            email: "DUP@example.com",
            password_hash: "hash",
            first_name: "A",
            last_name: "B",
            phone: None,
            role: Role::Buyer,
        };
        assert!(db.create_user(&again).is_err());
    }

    #[test]
    fn activation_only_promotes_pending() {
        let db = test_db();
        let id = seed_user(&db, "s@example.com", Role::Seller);
        db.set_user_status(&id, UserStatus::Suspended).unwrap();
        db.activate_user(&id).unwrap();

        let row = db.get_user_by_id(&id).unwrap().unwrap();
        assert!(row.email_verified);
        assert_eq!(row.status(), UserStatus::Suspended);
    }

    #[test]
    fn otp_is_replaced_and_counts_attempts() {
        let db = test_db();
        let id = seed_user(&db, "o@example.com", Role::Buyer);

        db.upsert_otp("otp-1", &id, "verify_email", "aaa", 10).unwrap();
        db.upsert_otp("otp-2", &id, "verify_email", "bbb", 10).unwrap();

        let otp = db.get_otp(&id, "verify_email").unwrap().unwrap();
        assert_eq!(otp.id, "otp-2");
        assert_eq!(otp.code_hash, "bbb");
        assert!(!otp.expired);

        assert_eq!(db.bump_otp_attempts("otp-2").unwrap(), 1);
        assert_eq!(db.bump_otp_attempts("otp-2").unwrap(), 2);
        db.delete_otp("otp-2").unwrap();
        assert!(db.get_otp(&id, "verify_email").unwrap().is_none());
    }

    #[test]
    fn expired_otp_is_flagged() {
        let db = test_db();
        let id = seed_user(&db, "late@example.com", Role::Buyer);
        db.upsert_otp("otp", &id, "verify_email", "aaa", -1).unwrap();
        assert!(db.get_otp(&id, "verify_email").unwrap().unwrap().expired);
        assert_eq!(db.prune_expired_credentials().unwrap(), 1);
    }

    #[test]
    fn expired_sessions_are_not_live() {
        let db = test_db();
        let id = seed_user(&db, "sess@example.com", Role::Buyer);
        db.create_session("s1", &id, "tok-live", "2999-01-01 00:00:00").unwrap();
        db.create_session("s2", &id, "tok-dead", "2000-01-01 00:00:00").unwrap();

        assert_eq!(db.get_live_session("tok-live").unwrap().unwrap().user_id, id);
        assert!(db.get_live_session("tok-dead").unwrap().is_none());
        assert_eq!(db.delete_user_sessions(&id).unwrap(), 2);
        assert!(db.get_live_session("tok-live").unwrap().is_none());
    }

    #[test]
    fn list_users_filters_by_role() {
        let db = test_db();
        seed_user(&db, "b@example.com", Role::Buyer);
        seed_user(&db, "s@example.com", Role::Seller);

        let sellers = db.list_users(Some(Role::Seller), None).unwrap();
        assert_eq!(sellers.len(), 1);
        assert_eq!(sellers[0].email, "s@example.com");
        assert_eq!(db.list_users(None, Some(UserStatus::Pending)).unwrap().len(), 2);
    }
}
