pub mod auth;
pub mod content;
pub mod conversations;
pub mod error;
pub mod fixtures;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod newsletter;
pub mod notifications;
pub mod products;
pub mod release;
pub mod sellers;
pub mod state;
pub mod stats;
pub mod uploads;
pub mod users;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};

use crate::middleware::{optional_auth, require_auth};
use crate::state::AppState;

/// Every `/api` route, with state applied. Sockets and static files are
/// mounted by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-otp", post(auth::verify_otp))
        .route("/auth/resend-otp", post(auth::resend_otp))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/products", get(products::list_products))
        .route("/products/{product_id}", get(products::get_product))
        .route("/sellers", get(sellers::list_sellers))
        .route("/sellers/{seller_id}", get(sellers::get_seller))
        .route("/sellers/{seller_id}/click", post(sellers::record_click))
        .route("/notifications/public", get(notifications::list_public))
        .route("/newsletter/subscribe", post(newsletter::subscribe))
        .route("/newsletter/unsubscribe", post(newsletter::unsubscribe))
        .route("/stats", get(stats::public_stats))
        .route("/posts", get(content::list_posts))
        .route("/posts/{slug}", get(content::get_post))
        .route("/testimonials", get(content::list_testimonials))
        .with_state(state.clone());

    let profile_routes = Router::new()
        .route("/users/{user_id}", get(users::get_user))
        .layer(from_fn_with_state(state.clone(), optional_auth))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/products", post(products::create_product))
        .route(
            "/products/{product_id}",
            put(products::update_product).delete(products::delete_product),
        )
        .route("/sellers/me/boutique", put(sellers::upsert_my_boutique))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/conversations/{conversation_id}/read", post(conversations::mark_read))
        .route("/messages/drafts", get(messages::list_drafts))
        .route(
            "/messages/{message_id}",
            put(messages::edit_message).delete(messages::delete_message),
        )
        .route("/messages/{message_id}/send", post(messages::send_draft))
        .route("/messages/{message_id}/reactions", post(messages::toggle_reaction))
        .route("/users", get(users::list_users))
        .route("/users/me", put(users::update_me))
        .route("/users/{user_id}/status", put(users::update_status))
        .route("/users/me/favorites", get(users::list_favorites))
        .route("/users/me/favorites/{product_id}", post(users::toggle_favorite))
        .route("/notifications", get(notifications::summary))
        .route("/notifications/public", post(notifications::create_public))
        .route("/subscribers", get(newsletter::list_subscribers))
        .route("/admin/stats", get(stats::admin_stats))
        .route("/posts", post(content::create_post))
        .route("/testimonials", post(content::create_testimonial))
        .route("/testimonials/{testimonial_id}/approve", put(content::approve_testimonial))
        .route(
            "/uploads",
            post(uploads::upload_image).layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_SIZE)),
        )
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let api = Router::new()
        .merge(public_routes)
        .merge(profile_routes)
        .merge(protected_routes);

    Router::new().nest("/api", api)
}
