mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn only_sellers_list_products() {
    let app = TestApp::new();
    let (buyer, _) = app.signup("buyer@example.com", "buyer").await;

    let (status, body) = app
        .post("/api/products", Some(&buyer), json!({ "name": "Kiondo", "price_cents": 1500 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "seller account required");

    let (status, _) = app
        .post("/api/products", None, json!({ "name": "Kiondo", "price_cents": 1500 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_lifecycle_respects_ownership() {
    let app = TestApp::new();
    let (seller, seller_id) = app.signup("fundi@example.com", "seller").await;
    let (rival, _) = app.signup("rival@example.com", "seller").await;
    let (admin, _) = app.admin().await;

    let product = app.create_product(&seller, "Maasai shuka", 2500).await;
    let id = product["id"].as_str().unwrap().to_string();
    assert_eq!(product["seller_id"], seller_id.to_string());
    assert_eq!(product["status"], "active");
    let uri = format!("/api/products/{id}");

    let (status, fetched) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Maasai shuka");

    let (status, _) = app.put(&uri, Some(&rival), json!({ "price_cents": 1 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.put(&uri, Some(&seller), json!({ "price_cents": -5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.put(&uri, Some(&seller), json!({ "status": "sold" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app
        .put(&uri, Some(&seller), json!({ "price_cents": 2200, "status": "hidden" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price_cents"], 2200);

    // Hidden products disappear from the public catalog
    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, page) = app.get("/api/products", None).await;
    assert_eq!(page["total"], 0);

    let (status, _) = app.delete(&uri, Some(&rival)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete(&uri, Some(&seller)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_filters_by_price_and_search() {
    let app = TestApp::new();
    let (seller, _) = app.signup("soko@example.com", "seller").await;
    app.create_product(&seller, "Kikoi beach wrap", 1200).await;
    app.create_product(&seller, "Beaded sandals", 3400).await;
    app.create_product(&seller, "Kikoi scarf", 800).await;

    let (status, page) = app.get("/api/products?search=kikoi", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);

    let (_, page) = app.get("/api/products?min_price=1000&max_price=4000", None).await;
    assert_eq!(page["total"], 2);
    let names: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(!names.contains(&"Kikoi scarf"));

    let (_, page) = app.get("/api/products?limit=1", None).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["total"], 3);

    let (status, _) = app.get("/api/products?min_price=500&max_price=100", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn boutique_and_storefront() {
    let app = TestApp::new();
    let (seller, seller_id) = app.signup("duka@example.com", "seller").await;
    let (buyer, _) = app.signup("mteja@example.com", "buyer").await;
    let storefront = format!("/api/sellers/{seller_id}");

    // No boutique yet
    let (status, _) = app.get(&storefront, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .put("/api/sellers/me/boutique", Some(&buyer), json!({ "name": "Not mine" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put("/api/sellers/me/boutique", Some(&seller), json!({ "name": "Duka", "settings": [1, 2] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, boutique) = app
        .put(
            "/api/sellers/me/boutique",
            Some(&seller),
            json!({ "name": "Duka la Mama", "location": "Nairobi", "settings": { "theme": "sunset" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{boutique}");
    assert_eq!(boutique["settings"]["theme"], "sunset");

    // Saving again updates the same boutique
    let (_, again) = app
        .put("/api/sellers/me/boutique", Some(&seller), json!({ "name": "Duka la Mama II" }))
        .await;
    assert_eq!(again["id"], boutique["id"]);
    assert_eq!(again["name"], "Duka la Mama II");

    app.create_product(&seller, "Sisal basket", 900).await;
    let (status, detail) = app.get(&storefront, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["boutique"]["name"], "Duka la Mama II");
    assert_eq!(detail["products"].as_array().unwrap().len(), 1);

    let (_, sellers) = app.get("/api/sellers", None).await;
    assert_eq!(sellers.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn clicks_are_counted_per_seller() {
    let app = TestApp::new();
    let (_, seller_id) = app.signup("clicks@example.com", "seller").await;
    let (_, buyer_id) = app.signup("browser@example.com", "buyer").await;
    let (admin, _) = app.admin().await;

    let uri = format!("/api/sellers/{seller_id}/click");
    for expected in 1..=3u64 {
        let (status, body) = app.post(&uri, None, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clicks"], expected);
    }

    let (status, _) = app.post(&format!("/api/sellers/{buyer_id}/click"), None, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, stats) = app.get("/api/admin/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["vendor_clicks"], 3);
    assert_eq!(stats["top_sellers_by_clicks"][0]["seller_id"], seller_id.to_string());
}

#[tokio::test]
async fn favorites_toggle() {
    let app = TestApp::new();
    let (seller, _) = app.signup("fav-seller@example.com", "seller").await;
    let (buyer, _) = app.signup("fav-buyer@example.com", "buyer").await;
    let product = app.create_product(&seller, "Lamu chest", 45000).await;
    let uri = format!("/api/users/me/favorites/{}", product["id"].as_str().unwrap());

    let (status, body) = app.post(&uri, Some(&buyer), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["favorited"], true);

    let (_, list) = app.get("/api/users/me/favorites", Some(&buyer)).await;
    assert_eq!(list[0]["name"], "Lamu chest");

    let (_, body) = app.post(&uri, Some(&buyer), json!({})).await;
    assert_eq!(body["favorited"], false);
    let (_, list) = app.get("/api/users/me/favorites", Some(&buyer)).await;
    assert!(list.as_array().unwrap().is_empty());

    let (status, _) = app
        .post(&format!("/api/users/me/favorites/{}", uuid::Uuid::new_v4()), Some(&buyer), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
