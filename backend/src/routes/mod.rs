//! Route definitions for the warehouse engine API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        // Protected routes - taxonomy
        .nest("/categories", category_routes(state.clone()))
        .nest("/attribute-types", attribute_type_routes(state.clone()))
        .nest("/attribute-values", attribute_value_routes(state.clone()))
        // Protected routes - items, ledger and lifecycle
        .nest("/items", item_routes(state.clone()))
        // Protected routes - SKU composer
        .nest("/sku", sku_routes(state))
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new().route("/login", post(handlers::auth::login))
}

/// Category routes (protected)
fn category_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::taxonomy::list_categories).post(handlers::taxonomy::create_category),
        )
        .route(
            "/:id",
            put(handlers::taxonomy::update_category).delete(handlers::taxonomy::delete_category),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Attribute type routes (protected)
///
/// `/:type_ref` takes the type id, `/:type_ref/values` the type slug.
fn attribute_type_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::taxonomy::list_attribute_types)
                .post(handlers::taxonomy::create_attribute_type),
        )
        .route(
            "/:type_ref",
            put(handlers::taxonomy::update_attribute_type)
                .delete(handlers::taxonomy::delete_attribute_type),
        )
        .route(
            "/:type_ref/values",
            get(handlers::taxonomy::list_attribute_values)
                .post(handlers::taxonomy::create_attribute_value),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Attribute value routes (protected)
fn attribute_value_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/:id",
            put(handlers::taxonomy::update_attribute_value)
                .delete(handlers::taxonomy::delete_attribute_value),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Item routes (protected)
fn item_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::items::list_items).post(handlers::items::create_item),
        )
        .route("/lookup", get(handlers::items::find_by_sku))
        .route("/reconcile", get(handlers::items::reconcile_all))
        .route("/archive", post(handlers::items::archive_items))
        .route("/restore", post(handlers::items::restore_items))
        .route("/delete", post(handlers::items::delete_items))
        .route("/archive-stale", post(handlers::items::archive_stale))
        .route("/move", post(handlers::items::move_items))
        .route(
            "/:id",
            get(handlers::items::get_item).put(handlers::items::update_item),
        )
        .route("/:id/adjust", post(handlers::items::adjust_quantity))
        .route("/:id/set-quantity", post(handlers::items::set_quantity))
        .route("/:id/transactions", get(handlers::items::list_transactions))
        .route("/:id/reconcile", get(handlers::items::reconcile_item))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// SKU composer routes (protected)
fn sku_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/preview", post(handlers::sku::preview_sku))
        .route("/regenerate", post(handlers::sku::regenerate_skus))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
