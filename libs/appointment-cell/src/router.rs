// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentCellState};

pub fn booking_routes(state: Arc<AppointmentCellState>) -> Router {
    let protected_routes = Router::new()
        // Creation
        .route("/", post(handlers::create_booking))
        .route("/batch", post(handlers::create_bookings))

        // Listings and the patient-visible grid
        .route("/patients/{patient_id}", get(handlers::get_patient_bookings))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_bookings))
        .route("/doctors/{doctor_id}/slots", get(handlers::get_bookable_slots))

        // Single booking and its transitions
        .route("/{booking_id}", get(handlers::get_booking))
        .route("/{booking_id}/decision", post(handlers::decide_booking))
        .route("/{booking_id}/payment", post(handlers::initiate_payment))
        .route("/{booking_id}/paid", post(handlers::mark_paid))
        .route("/{booking_id}/meet-link", put(handlers::set_meet_link))
        .route("/{booking_id}/conducted", post(handlers::mark_conducted))
        .route("/{booking_id}/feedback", post(handlers::submit_feedback))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
