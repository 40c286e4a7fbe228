//! Route definitions for the PharmaLink API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        // Protected routes - retailer side
        .nest("/retailer", retailer_routes())
        // Protected routes - distributor side
        .nest("/distributor", distributor_routes())
        // Protected routes - notifications (either role)
        .nest("/notifications", notification_routes())
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
}

/// Retailer routes (protected, retailer role enforced per handler)
fn retailer_routes() -> Router<AppState> {
    Router::new()
        // Connections
        .route("/distributors", get(handlers::list_distributors))
        .route(
            "/connections",
            get(handlers::list_retailer_connections).post(handlers::request_connection),
        )
        // Catalog
        .route("/catalog/:distributor_id", get(handlers::get_catalog))
        // Orders
        .route(
            "/orders",
            get(handlers::list_retailer_orders).post(handlers::create_order),
        )
        .route("/orders/:order_id", get(handlers::get_retailer_order))
        .route("/orders/:order_id/cancel", post(handlers::cancel_order))
        .route("/orders/:order_id/verify", post(handlers::verify_order))
        // Stock
        .route("/stock", get(handlers::list_retailer_stock))
        // Disputes
        .route(
            "/disputes",
            get(handlers::list_retailer_disputes).post(handlers::create_dispute),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Distributor routes (protected, distributor role enforced per handler)
fn distributor_routes() -> Router<AppState> {
    Router::new()
        // Connections
        .route("/connections", get(handlers::list_distributor_connections))
        .route(
            "/connections/:connection_id/respond",
            post(handlers::respond_connection),
        )
        // Stock
        .route(
            "/stock",
            get(handlers::list_batches).post(handlers::add_batch),
        )
        .route("/stock/:stock_id", put(handlers::update_batch))
        .route(
            "/stock/batches/:product_code",
            get(handlers::available_batches),
        )
        // Orders
        .route("/orders", get(handlers::list_distributor_orders))
        .route(
            "/orders/:order_id/billing",
            get(handlers::get_order_for_billing),
        )
        .route("/orders/:order_id/confirm", post(handlers::confirm_order))
        .route("/orders/:order_id/reject", post(handlers::reject_order))
        .route("/orders/invoice", post(handlers::generate_invoice))
        .route("/orders/manual", post(handlers::create_manual_order))
        .route(
            "/orders/manual/:order_id/items",
            put(handlers::replace_manual_order_items),
        )
        // Disputes
        .route("/disputes", get(handlers::list_distributor_disputes))
        .route(
            "/disputes/:dispute_id/resolve",
            post(handlers::resolve_dispute),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Notification routes (protected, either role)
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/unread-count", get(handlers::get_unread_count))
        .route("/read-all", post(handlers::mark_all_as_read))
        .route("/:notification_id/read", post(handlers::mark_as_read))
        .route_layer(middleware::from_fn(auth_middleware))
}
