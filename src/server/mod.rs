//! HTTP request dispatcher
//!
//! Health and shutdown probes are answered directly, in every state. Every
//! other route goes through [`dispatch`], the single accept point where the
//! request is admitted by the lifecycle controller before the handler runs.

pub mod error;
pub mod handlers;
pub mod models;
pub mod transport;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use models::Dataset;
pub use transport::HttpTransport;

use crate::lifecycle::LifecycleController;
use crate::registry::Registry;
use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry<Dataset>>,
    pub lifecycle: Arc<LifecycleController>,
}

impl AppState {
    pub fn new(registry: Arc<Registry<Dataset>>, lifecycle: Arc<LifecycleController>) -> Self {
        Self {
            registry,
            lifecycle,
        }
    }
}

/// Admits the request (reporting activity), then hands it to the matched
/// handler. Answers 503 once the daemon is draining.
pub async fn dispatch(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let _admitted = match state.lifecycle.admit_request() {
        Ok(guard) => guard,
        Err(err) => return ApiError::from(err).into_response(),
    };
    next.run(request).await
}

pub fn build_router(state: AppState) -> Router {
    let data_routes = Router::new()
        .route(
            "/datasets",
            get(handlers::list_datasets).post(handlers::register_dataset),
        )
        .route(
            "/datasets/:reference",
            get(handlers::get_dataset).delete(handlers::delete_dataset),
        )
        .route(
            "/datasets/:reference/aliases/:alias",
            put(handlers::bind_alias),
        )
        .route(
            "/aliases/:alias",
            get(handlers::resolve_alias).delete(handlers::unbind_alias),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), dispatch));

    let control_routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/shutdown",
            get(handlers::shutdown).post(handlers::shutdown),
        );

    Router::new()
        .merge(data_routes)
        .merge(control_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
