// Export route modules
pub mod chat;
pub mod verify;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(chat::routes(state.clone()))
        .merge(verify::routes(state))
        .layer(cors)
}
