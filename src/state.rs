use crate::store::PgStore;
use std::sync::Arc;

/// Shared application state. The store also serves the student-directory
/// reads since both live in the same database here.
pub struct AppState {
    pub store: PgStore,
}

pub type SharedState = Arc<AppState>;
