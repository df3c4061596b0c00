pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::convert::ConversionService;

#[derive(Clone)]
pub struct ApiState {
    pub converter: Arc<ConversionService>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/pdf", post(handlers::convert_pdf))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
