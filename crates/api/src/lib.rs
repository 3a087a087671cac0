//! `api` crate: the HTTP surface of the workflow engine.
//!
//! Everything lives under `/api/v1`:
//!
//!   GET    /health
//!   GET    /actions                                  action catalog
//!   POST   /actions/:kind/validate-config
//!   POST   /actions/:kind/validate-params
//!   GET    /rules                                    rule catalog
//!   POST   /rules/describe
//!   GET    /communities/:cid/stages
//!   POST   /communities/:cid/stages
//!   PATCH  /stages/:id/order
//!   DELETE /stages/:id
//!   GET    /stages/:id/destinations
//!   GET    /stages/:id/reachable
//!   PUT    /stages/:id/destinations/:dest
//!   DELETE /stages/:id/destinations/:dest
//!   POST   /communities/:cid/pub-types
//!   POST   /communities/:cid/pubs
//!   POST   /pubs/:id/move
//!   GET    /pubs/:id/runs
//!   POST   /stages/:id/action-instances
//!   GET    /communities/:cid/action-instances
//!   PUT    /action-instances/:id/config
//!   DELETE /action-instances/:id
//!   POST   /action-instances/:id/run
//!   POST   /action-instances/:id/rules
//!   GET    /action-instances/:id/rules
//!   DELETE /rules/:id
//!   GET    /rules/:id/description

pub mod error;
pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use handlers::AppState;

use handlers::{action_instances, pubs, registry, rules, stages};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/health", get(health))
        // Catalogs
        .route("/actions", get(registry::list_actions))
        .route("/actions/:kind/validate-config", post(registry::validate_config))
        .route("/actions/:kind/validate-params", post(registry::validate_params))
        .route("/rules", get(registry::list_rules))
        .route("/rules/describe", post(registry::describe_rule))
        // Stages and the move graph
        .route(
            "/communities/:cid/stages",
            get(stages::list).post(stages::create),
        )
        .route("/stages/:id/order", patch(stages::reorder))
        .route("/stages/:id", delete(stages::delete))
        .route("/stages/:id/destinations", get(stages::destinations))
        .route("/stages/:id/reachable", get(stages::reachable))
        .route(
            "/stages/:id/destinations/:dest",
            put(stages::add_constraint).delete(stages::remove_constraint),
        )
        // Pubs
        .route("/communities/:cid/pub-types", post(pubs::create_pub_type))
        .route("/communities/:cid/pubs", post(pubs::create_pub))
        .route("/pubs/:id/move", post(pubs::move_pub))
        .route("/pubs/:id/runs", get(pubs::list_runs))
        // Action instances
        .route("/stages/:id/action-instances", post(action_instances::create))
        .route("/communities/:cid/action-instances", get(action_instances::list))
        .route("/action-instances/:id/config", put(action_instances::update_config))
        .route("/action-instances/:id", delete(action_instances::delete))
        .route("/action-instances/:id/run", post(action_instances::run))
        // Rule bindings
        .route(
            "/action-instances/:id/rules",
            post(rules::create).get(rules::list_for_instance),
        )
        .route("/rules/:id", delete(rules::delete))
        .route("/rules/:id/description", get(rules::describe));

    Router::new()
        .nest("/api/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` resolves.
pub async fn serve<F>(bind: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
