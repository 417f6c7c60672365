// libs/notification-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, NotificationCellState};

pub fn notification_routes(state: Arc<NotificationCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/announcements", post(handlers::send_announcement))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
