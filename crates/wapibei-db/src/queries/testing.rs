use uuid::Uuid;

use wapibei_types::models::Role;

use crate::Database;
use crate::models::NewUser;

pub(crate) fn test_db() -> Database {
    Database::open_in_memory().expect("in-memory db")
}

pub(crate) fn seed_user(db: &Database, email: &str, role: Role) -> String {
    let id = Uuid::new_v4().to_string();
    db.create_user(&NewUser {
        id: &id,
        email,
        password_hash: "not-a-real-hash",
        first_name: "Test",
        last_name: role.as_str(),
        phone: None,
        role,
    })
    .expect("seed user");
    id
}

pub(crate) fn seed_product(db: &Database, seller_id: &str, name: &str, price_cents: i64) -> String {
    let id = Uuid::new_v4().to_string();
    db.insert_product(
        &id,
        seller_id,
        &wapibei_types::api::CreateProductRequest {
            name: name.to_string(),
            description: format!("{name} description"),
            price_cents,
            currency: None,
            category: Some("fashion".to_string()),
            image_url: None,
            stock: 3,
        },
    )
    .expect("seed product");
    id
}
