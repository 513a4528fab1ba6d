pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::Settings, gateways::PaymentGateway, service::ServiceContext};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    midtrans: Option<Arc<dyn PaymentGateway>>,
    xendit: Option<Arc<dyn PaymentGateway>>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, midtrans, xendit, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        // Gateway webhooks (authenticated by signature/token, not session)
        .route("/webhooks/midtrans", post(handlers::webhooks::midtrans))
        .route("/webhooks/xendit", post(handlers::webhooks::xendit))
        // API routes
        .nest("/api", api_routes())
        // Add state to the router
        .with_state(app_state)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/bookings", booking_routes())
        .nest("/classes", class_routes())
        .route("/admin/expire-packages", post(handlers::classes::expire_packages))
}

fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::bookings::create))
        .route("/:id", get(handlers::bookings::get))
        .route("/:id/cancel", post(handlers::bookings::cancel))
        .route("/:id/reschedule", post(handlers::bookings::reschedule))
        .route("/:id/no-show", post(handlers::bookings::no_show))
        .route("/:id/complete", post(handlers::bookings::complete))
}

fn class_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::classes::list))
        .route("/", post(handlers::classes::create))
        .route("/:id", get(handlers::classes::get))
        .route("/:id/status", post(handlers::classes::update_status))
        .route("/:id/waitlist", post(handlers::classes::join_waitlist))
}
