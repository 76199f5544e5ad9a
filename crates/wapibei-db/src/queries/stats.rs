use anyhow::Result;

use wapibei_types::api::{CountBy, PublicStats};

use crate::Database;

/// Raw counts behind the admin dashboard.
pub struct TableCounts {
    pub products: i64,
    pub boutiques: i64,
    pub conversations: i64,
    pub messages: i64,
}

impl Database {
    pub fn public_stats(&self) -> Result<PublicStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM products WHERE status = 'active'),
                    (SELECT COUNT(*) FROM users WHERE role = 'seller' AND status = 'active'),
                    (SELECT COUNT(*) FROM users WHERE role = 'buyer' AND status = 'active'),
                    (SELECT COUNT(*) FROM boutiques)",
                [],
                |row| {
                    Ok(PublicStats {
                        products: row.get(0)?,
                        sellers: row.get(1)?,
                        buyers: row.get(2)?,
                        boutiques: row.get(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM products),
                    (SELECT COUNT(*) FROM boutiques),
                    (SELECT COUNT(*) FROM conversations),
                    (SELECT COUNT(*) FROM messages WHERE delivered = 1)",
                [],
                |row| {
                    Ok(TableCounts {
                        products: row.get(0)?,
                        boutiques: row.get(1)?,
                        conversations: row.get(2)?,
                        messages: row.get(3)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }

    pub fn users_by_role(&self) -> Result<Vec<CountBy>> {
        self.count_users_by("role")
    }

    pub fn users_by_status(&self) -> Result<Vec<CountBy>> {
        self.count_users_by("status")
    }

    // `column` is always one of the two literals above
    fn count_users_by(&self, column: &'static str) -> Result<Vec<CountBy>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {column}, COUNT(*) FROM users GROUP BY {column} ORDER BY {column}");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CountBy {
                        key: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testing::{seed_product, seed_user, test_db};
    use wapibei_types::models::{Role, UserStatus};

    #[test]
    fn counts_reflect_active_users_only() {
        let db = test_db();
        let seller = seed_user(&db, "s@example.com", Role::Seller);
        let buyer = seed_user(&db, "b@example.com", Role::Buyer);
        seed_user(&db, "pending@example.com", Role::Buyer);
        db.set_user_status(&seller, UserStatus::Active).unwrap();
        db.set_user_status(&buyer, UserStatus::Active).unwrap();
        seed_product(&db, &seller, "Shuka", 700_00);

        let stats = db.public_stats().unwrap();
        assert_eq!(stats.products, 1);
        assert_eq!(stats.sellers, 1);
        assert_eq!(stats.buyers, 1);
        assert_eq!(stats.boutiques, 0);

        let by_role = db.users_by_role().unwrap();
        let buyers = by_role.iter().find(|c| c.key == "buyer").unwrap();
        assert_eq!(buyers.count, 2);

        let by_status = db.users_by_status().unwrap();
        assert_eq!(by_status.iter().map(|c| c.count).sum::<i64>(), 3);
        assert_eq!(db.table_counts().unwrap().products, 1);
    }
}
