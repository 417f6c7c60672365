use std::sync::Arc;

use axum::{
    Json, Router,
    routing::get,
};
use serde_json::json;

use appointment_cell::handlers::AppointmentCellState;
use appointment_cell::router::booking_routes;
use doctor_cell::handlers::DoctorCellState;
use doctor_cell::router::doctor_routes;
use notification_cell::handlers::NotificationCellState;
use notification_cell::router::notification_routes;

/// Per-cell state, wired once at startup.
pub struct CellStates {
    pub doctors: Arc<DoctorCellState>,
    pub bookings: Arc<AppointmentCellState>,
    pub notifications: Arc<NotificationCellState>,
}

pub fn create_router(states: CellStates) -> Router {
    Router::new()
        .route("/", get(|| async { "Consultation booking API is running!" }))
        .route("/status", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/doctors", doctor_routes(states.doctors))
        .nest("/bookings", booking_routes(states.bookings))
        .nest("/notifications", notification_routes(states.notifications))
}
