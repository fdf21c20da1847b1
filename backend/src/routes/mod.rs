//! Route definitions for FishFlow Manager

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::{
    handlers,
    middleware::{admin_middleware, auth_middleware},
    AppState,
};

/// Multipart framing on top of the file itself
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route(
            "/auth/me",
            get(handlers::auth::get_profile).put(handlers::auth::update_profile),
        )
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/dashboard", get(handlers::reporting::get_dashboard))
        .nest("/clients", client_routes())
        .nest("/products", product_routes())
        .nest("/stock", stock_routes())
        .nest("/orders", order_routes(&state))
        .nest("/invoices", invoice_routes())
        .nest("/documents", document_routes())
        .merge(logistics_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin = Router::new()
        .nest("/users", user_routes())
        .route("/audit", get(handlers::audit::list_audit_logs))
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .merge(auth_routes())
        .merge(protected)
        .merge(admin)
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
}

/// Account administration
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::users::list_users))
        .route("/:user_id", put(handlers::users::update_user))
}

fn client_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::clients::list_clients).post(handlers::clients::create_client),
        )
        .route("/dashboard", get(handlers::clients::client_dashboard))
        .route("/stats", get(handlers::clients::client_stats))
        .route("/report", get(handlers::clients::client_report_pdf))
        .route(
            "/:client_id",
            get(handlers::clients::get_client)
                .put(handlers::clients::update_client)
                .delete(handlers::clients::delete_client),
        )
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/:product_id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
}

fn stock_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/movements",
            get(handlers::stock::list_movements).post(handlers::stock::create_movement),
        )
        .route("/dashboard", get(handlers::stock::stock_dashboard))
        .route("/chart", get(handlers::stock::stock_chart))
        .route("/report", get(handlers::stock::stock_report))
}

/// Orders and everything attached to one
fn order_routes(state: &AppState) -> Router<AppState> {
    let upload_limit = state.config.storage.max_upload_bytes + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        .route(
            "/",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/dashboard", get(handlers::orders::order_dashboard))
        .route("/report", get(handlers::orders::order_report))
        .route("/chart", get(handlers::orders::order_chart))
        .route(
            "/:order_id",
            get(handlers::orders::get_order).put(handlers::orders::update_order),
        )
        .route("/:order_id/status", post(handlers::orders::change_status))
        .route("/:order_id/lines", post(handlers::orders::add_line))
        .route(
            "/:order_id/lines/:line_id",
            put(handlers::orders::update_line).delete(handlers::orders::delete_line),
        )
        .route(
            "/:order_id/invoice-preview",
            get(handlers::invoices::preview_invoice),
        )
        .route("/:order_id/invoices", post(handlers::invoices::generate_invoice))
        .route(
            "/:order_id/documents",
            post(handlers::documents::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/:order_id/purchase-order",
            get(handlers::documents::download_purchase_order)
                .post(handlers::documents::generate_purchase_order),
        )
        .route(
            "/:order_id/deliveries",
            get(handlers::deliveries::list_order_deliveries)
                .post(handlers::deliveries::create_delivery),
        )
        .route(
            "/:order_id/transport-legs",
            get(handlers::deliveries::list_transport_legs)
                .post(handlers::deliveries::create_transport_leg),
        )
}

fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::invoices::list_invoices))
        .route("/:invoice_id", get(handlers::invoices::get_invoice))
        .route(
            "/:invoice_id/status",
            put(handlers::invoices::update_invoice_status),
        )
        .route("/:invoice_id/pdf", get(handlers::invoices::invoice_pdf))
}

fn document_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:document_id",
            get(handlers::documents::download_document)
                .delete(handlers::documents::delete_document),
        )
        .route(
            "/:document_id/sent-to-agency",
            post(handlers::documents::mark_sent_to_agency),
        )
}

/// Vehicles, local deliveries and export transport legs
fn logistics_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/vehicles",
            get(handlers::deliveries::list_vehicles).post(handlers::deliveries::create_vehicle),
        )
        .route(
            "/vehicles/:vehicle_id",
            delete(handlers::deliveries::delete_vehicle),
        )
        .route(
            "/deliveries/:delivery_id/status",
            put(handlers::deliveries::update_delivery_status),
        )
        .route(
            "/transport-legs/:leg_id",
            put(handlers::deliveries::update_transport_leg),
        )
}
