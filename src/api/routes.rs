//! API Routes
//!
//! Configures the Axum router with the cache and scheduler endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, get_handler, health_handler, maintain_handler, set_handler, stats_handler,
    tasks_handler, trigger_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - Store a key-value pair
/// - `GET /get/:key` - Retrieve a value by key
/// - `DELETE /del/:key` - Delete a key
/// - `POST /maintain` - Apply the eviction policy now
/// - `GET /stats` - Cache statistics and policy
/// - `GET /tasks` - Scheduler snapshot
/// - `POST /tasks/:name/trigger` - Make a task due now
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/maintain", post(maintain_handler))
        .route("/stats", get(stats_handler))
        .route("/tasks", get(tasks_handler))
        .route("/tasks/:name/trigger", post(trigger_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
