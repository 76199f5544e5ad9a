use anyhow::Result;
use rusqlite::Row;
use rusqlite::types::Value;

use wapibei_types::api::{CreateProductRequest, ProductQuery, UpdateProductRequest, UpsertBoutiqueRequest};

use super::OptionalExt;
use crate::Database;
use crate::models::{BoutiqueRow, ProductRow};

pub const MAX_PAGE_SIZE: u32 = 100;

// Seller display name: boutique name when there is one, else the person's name.
const PRODUCT_SELECT: &str = "SELECT p.id, p.seller_id,
        COALESCE(b.name, TRIM(u.first_name || ' ' || u.last_name)),
        p.name, p.description, p.price_cents, p.currency, p.category, p.image_url,
        p.stock, p.status, p.created_at, p.updated_at
     FROM products p
     JOIN users u ON u.id = p.seller_id
     LEFT JOIN boutiques b ON b.seller_id = p.seller_id";

const BOUTIQUE_SELECT: &str = "SELECT b.id, b.seller_id, b.name, b.description, b.logo_url,
        b.banner_url, b.location, b.phone, b.whatsapp, b.settings,
        (SELECT COUNT(*) FROM products p WHERE p.seller_id = b.seller_id AND p.status = 'active'),
        b.created_at, b.updated_at
     FROM boutiques b";

impl Database {
    // -- Products --

    pub fn insert_product(&self, id: &str, seller_id: &str, req: &CreateProductRequest) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO products (id, seller_id, name, description, price_cents, currency, category, image_url, stock)
                 VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 'KES'), ?7, ?8, ?9)",
                rusqlite::params![
                    id,
                    seller_id,
                    req.name.trim(),
                    req.description,
                    req.price_cents,
                    req.currency,
                    req.category,
                    req.image_url,
                    req.stock,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_product(&self, id: &str) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let sql = format!("{PRODUCT_SELECT} WHERE p.id = ?1");
            conn.query_row(&sql, [id], map_product).optional()
        })
    }

    /// Active products matching the filter, newest first, plus the total
    /// number of matches ignoring limit/offset.
    pub fn list_products(&self, query: &ProductQuery) -> Result<(Vec<ProductRow>, i64)> {
        let mut clauses = vec!["p.status = 'active'".to_string()];
        let mut params: Vec<Value> = Vec::new();

        if let Some(category) = &query.category {
            clauses.push("p.category = ?".into());
            params.push(Value::Text(category.clone()));
        }
        if let Some(seller_id) = query.seller_id {
            clauses.push("p.seller_id = ?".into());
            params.push(Value::Text(seller_id.to_string()));
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("(p.name LIKE ? ESCAPE '\\' OR p.description LIKE ? ESCAPE '\\')".into());
            let pattern = format!("%{}%", escape_like(search));
            params.push(Value::Text(pattern.clone()));
            params.push(Value::Text(pattern));
        }
        if let Some(min) = query.min_price {
            clauses.push("p.price_cents >= ?".into());
            params.push(Value::Integer(min));
        }
        if let Some(max) = query.max_price {
            clauses.push("p.price_cents <= ?".into());
            params.push(Value::Integer(max));
        }

        let where_sql = clauses.join(" AND ");
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM products p WHERE {where_sql}"),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "{PRODUCT_SELECT} WHERE {where_sql}
                 ORDER BY p.created_at DESC, p.rowid DESC LIMIT ? OFFSET ?"
            );
            let mut page_params = params.clone();
            page_params.push(Value::Integer(limit.into()));
            page_params.push(Value::Integer(query.offset.into()));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(page_params.iter()), map_product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    pub fn list_seller_products(&self, seller_id: &str, include_hidden: bool) -> Result<Vec<ProductRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{PRODUCT_SELECT} WHERE p.seller_id = ?1 AND (?2 OR p.status = 'active')
                 ORDER BY p.created_at DESC, p.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![seller_id, include_hidden], map_product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_product(&self, id: &str, patch: &UpdateProductRequest) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE products SET
                    name        = COALESCE(?2, name),
                    description = COALESCE(?3, description),
                    price_cents = COALESCE(?4, price_cents),
                    currency    = COALESCE(?5, currency),
                    category    = COALESCE(?6, category),
                    image_url   = COALESCE(?7, image_url),
                    stock       = COALESCE(?8, stock),
                    status      = COALESCE(?9, status),
                    updated_at  = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    patch.name.as_deref().map(str::trim),
                    patch.description,
                    patch.price_cents,
                    patch.currency,
                    patch.category,
                    patch.image_url,
                    patch.stock,
                    patch.status,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_product(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM products WHERE id = ?1", [id])? > 0))
    }

    // -- Boutiques --

    /// Create the seller's boutique or overwrite its profile. Settings are
    /// only replaced when provided.
    pub fn upsert_boutique(&self, id: &str, seller_id: &str, req: &UpsertBoutiqueRequest) -> Result<BoutiqueRow> {
        let settings = req.settings.as_ref().map(|s| s.to_string());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO boutiques (id, seller_id, name, description, logo_url, banner_url, location, phone, whatsapp, settings)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, COALESCE(?10, '{}'))
                 ON CONFLICT(seller_id) DO UPDATE SET
                    name        = excluded.name,
                    description = excluded.description,
                    logo_url    = excluded.logo_url,
                    banner_url  = excluded.banner_url,
                    location    = excluded.location,
                    phone       = excluded.phone,
                    whatsapp    = excluded.whatsapp,
                    settings    = COALESCE(?10, boutiques.settings),
                    updated_at  = datetime('now')",
                rusqlite::params![
                    id,
                    seller_id,
                    req.name.trim(),
                    req.description,
                    req.logo_url,
                    req.banner_url,
                    req.location,
                    req.phone,
                    req.whatsapp,
                    settings,
                ],
            )?;

            let sql = format!("{BOUTIQUE_SELECT} WHERE b.seller_id = ?1");
            Ok(conn.query_row(&sql, [seller_id], map_boutique)?)
        })
    }

    pub fn get_boutique_by_seller(&self, seller_id: &str) -> Result<Option<BoutiqueRow>> {
        self.with_conn(|conn| {
            let sql = format!("{BOUTIQUE_SELECT} WHERE b.seller_id = ?1");
            conn.query_row(&sql, [seller_id], map_boutique).optional()
        })
    }

    /// Boutiques of sellers that are not suspended.
    pub fn list_boutiques(&self) -> Result<Vec<BoutiqueRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{BOUTIQUE_SELECT}
                 JOIN users u ON u.id = b.seller_id
                 WHERE u.status != 'suspended'
                 ORDER BY b.name COLLATE NOCASE"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_boutique)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Favorites --

    /// Returns true when the product is now a favorite, false when it was removed.
    pub fn toggle_favorite(&self, user_id: &str, product_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND product_id = ?2",
                (user_id, product_id),
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO favorites (user_id, product_id) VALUES (?1, ?2)",
                (user_id, product_id),
            )?;
            Ok(true)
        })
    }

    pub fn list_favorites(&self, user_id: &str) -> Result<Vec<ProductRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{PRODUCT_SELECT}
                 JOIN favorites f ON f.product_id = p.id
                 WHERE f.user_id = ?1
                 ORDER BY f.created_at DESC, f.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_product(row: &Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        id: row.get(0)?,
        seller_id: row.get(1)?,
        seller_name: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        price_cents: row.get(5)?,
        currency: row.get(6)?,
        category: row.get(7)?,
        image_url: row.get(8)?,
        stock: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn map_boutique(row: &Row<'_>) -> rusqlite::Result<BoutiqueRow> {
    Ok(BoutiqueRow {
        id: row.get(0)?,
        seller_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        logo_url: row.get(4)?,
        banner_url: row.get(5)?,
        location: row.get(6)?,
        phone: row.get(7)?,
        whatsapp: row.get(8)?,
        settings: row.get(9)?,
        product_count: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Make `%`, `_` and the escape character itself match literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
