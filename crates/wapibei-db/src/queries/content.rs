use anyhow::Result;
use rusqlite::Row;

use super::OptionalExt;
use crate::Database;
use crate::models::{PostRow, TestimonialRow};

const POST_COLUMNS: &str = "id, author_id, title, slug, body, cover_url, published, created_at";
const TESTIMONIAL_COLUMNS: &str = "id, user_id, name, content, rating, approved, created_at";

impl Database {
    // -- Posts --

    pub fn list_posts(&self, include_unpublished: bool) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE ?1 OR published = 1
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([include_unpublished], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_post_by_slug(&self, slug: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = ?1");
            conn.query_row(&sql, [slug], map_post).optional()
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_post(
        &self,
        id: &str,
        author_id: &str,
        title: &str,
        slug: &str,
        body: &str,
        cover_url: Option<&str>,
        published: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, title, slug, body, cover_url, published)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, author_id, title, slug, body, cover_url, published],
            )?;
            Ok(())
        })
    }

    // -- Testimonials --

    pub fn list_testimonials(&self, include_unapproved: bool) -> Result<Vec<TestimonialRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {TESTIMONIAL_COLUMNS} FROM testimonials WHERE ?1 OR approved = 1
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([include_unapproved], map_testimonial)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_testimonial(&self, id: &str, user_id: &str, name: &str, content: &str, rating: u8) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO testimonials (id, user_id, name, content, rating) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, user_id, name, content, rating],
            )?;
            Ok(())
        })
    }

    pub fn approve_testimonial(&self, id: &str) -> Result<Option<TestimonialRow>> {
        self.with_conn(|conn| {
            let sql = format!("UPDATE testimonials SET approved = 1 WHERE id = ?1 RETURNING {TESTIMONIAL_COLUMNS}");
            conn.query_row(&sql, [id], map_testimonial).optional()
        })
    }
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        body: row.get(4)?,
        cover_url: row.get(5)?,
        published: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_testimonial(row: &Row<'_>) -> rusqlite::Result<TestimonialRow> {
    Ok(TestimonialRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        rating: row.get(4)?,
        approved: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::testing::{seed_user, test_db};
    use wapibei_types::models::Role;

    #[test]
    fn unpublished_posts_are_hidden_by_default() {
        let db = test_db();
        let admin = seed_user(&db, "admin@example.com", Role::Admin);
        db.insert_post("p1", &admin, "Welcome", "welcome", "Karibu!", None, true).unwrap();
        db.insert_post("p2", &admin, "Soon", "soon", "...", None, false).unwrap();

        assert_eq!(db.list_posts(false).unwrap().len(), 1);
        assert_eq!(db.list_posts(true).unwrap().len(), 2);
        assert_eq!(db.get_post_by_slug("soon").unwrap().unwrap().id, "p2");
        assert!(db.insert_post("p3", &admin, "Dup", "welcome", "", None, true).is_err());
    }

    #[test]
    fn testimonials_need_approval() {
        let db = test_db();
        let user = seed_user(&db, "happy@example.com", Role::Buyer);
        db.insert_testimonial("t1", &user, "Happy Buyer", "Great sellers", 5).unwrap();

        assert!(db.list_testimonials(false).unwrap().is_empty());
        let approved = db.approve_testimonial("t1").unwrap().unwrap();
        assert!(approved.approved);
        assert_eq!(db.list_testimonials(false).unwrap().len(), 1);
        assert!(db.approve_testimonial("missing").unwrap().is_none());
    }
}
