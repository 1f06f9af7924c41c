use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod rules;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The presentation layer is served from elsewhere
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1", api_routes().layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/learners", post(handlers::sessions::register))
        .route("/sessions/login", post(handlers::sessions::login))
        .route("/sessions/resume", post(handlers::sessions::resume))
        .route("/learners/{id}", get(handlers::learners::get_profile))
        .route("/learners/{id}/stats", get(handlers::learners::get_stats))
        .route("/learners/{id}/glossary", get(handlers::learners::get_glossary))
        .route("/learners/{id}/question", get(handlers::learners::next_question))
        .route("/learners/{id}/answers", post(handlers::learners::submit_answer))
        .route(
            "/learners/{id}/crisis/timeout",
            post(handlers::learners::crisis_timeout),
        )
        .route(
            "/learners/{id}/jokers/{kind}",
            post(handlers::learners::use_joker),
        )
        .route("/learners/{id}/grace", post(handlers::learners::grant_grace))
        .route("/learners/{id}/restock", post(handlers::learners::restock))
        .route("/questions/{id}/votes", post(handlers::questions::vote))
}
