// libs/doctor-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, DoctorCellState};

pub fn doctor_routes(state: Arc<DoctorCellState>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/{doctor_id}/availability",
            put(handlers::set_availability).get(handlers::get_availability),
        )
        .route("/{doctor_id}/schedule", get(handlers::get_schedule))
        .route("/{doctor_id}/score", get(handlers::get_doctor_score))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
