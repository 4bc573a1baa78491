pub mod analytics;
pub mod attempts;
pub mod error;
pub mod identity;
pub mod questionnaires;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(questionnaires::router(state.clone()))
        .merge(attempts::router(state.clone()))
        .merge(analytics::router(state))
}
