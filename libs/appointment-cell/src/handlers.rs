// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use doctor_cell::models::TimezoneQuery;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{require_admin, require_self_or_admin};

use crate::models::{
    Booking, BookingError, CreateBookingRequest, CreateBookingsRequest, DecisionRequest,
    FeedbackRequest, MeetLinkRequest, PaymentRequest,
};
use crate::services::{BookingService, FeedbackService, PaymentService};

pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentService>,
    pub feedback: Arc<FeedbackService>,
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let code = err.code();
        match err {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::NotFound(id) => AppError::NotFound(format!("Booking {} not found", id)),
            e @ (BookingError::SlotUnavailable { .. }
            | BookingError::SlotConflict { .. }
            | BookingError::InvalidTransition { .. }) => AppError::Conflict { code, message: e.to_string() },
            BookingError::NotEligible(msg) => AppError::Unprocessable { code, message: msg },
            BookingError::ExternalDispatch(msg) => AppError::ExternalService(msg),
            BookingError::Persistence(e) => AppError::Database(e.to_string()),
        }
    }
}

fn is_party(user: &User, booking: &Booking) -> bool {
    user.can_act_for(&booking.patient_id.to_string()) || user.id == booking.doctor_id.to_string()
}

/// Patients see the gated view of their own bookings.
fn view_for(user: &User, booking: Booking) -> Booking {
    if user.id == booking.patient_id.to_string() && !user.is_admin() {
        booking.patient_view()
    } else {
        booking
    }
}

// ==============================================================================
// CREATION
// ==============================================================================

pub async fn create_booking(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_self_or_admin(&user, &request.patient_id.to_string(), "book for this patient")?;

    let outcome = state.bookings.create_booking(request, Utc::now()).await?;
    let booking = view_for(&user, outcome.booking);

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "booking": booking,
        "dispatch": outcome.dispatch,
        "message": "Booking requested"
    }))))
}

pub async fn create_bookings(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingsRequest>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &request.patient_id.to_string(), "book for this patient")?;

    let result = state.bookings.create_bookings(request, Utc::now()).await?;

    Ok(Json(json!({
        "success": result.failed() == 0,
        "booked": result.booked(),
        "failed": result.failed(),
        "items": result.items,
    })))
}

// ==============================================================================
// QUERIES
// ==============================================================================

pub async fn get_booking(
    State(state): State<Arc<AppointmentCellState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    if !is_party(&user, &booking) {
        return Err(AppError::Forbidden("Not authorized to view this booking".to_string()));
    }

    Ok(Json(json!(view_for(&user, booking))))
}

pub async fn get_patient_bookings(
    State(state): State<Arc<AppointmentCellState>>,
    Path(patient_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &patient_id.to_string(), "view this patient's bookings")?;

    let bookings = state.bookings.list_patient_bookings(patient_id).await?;

    Ok(Json(json!({
        "bookings": bookings,
        "total": bookings.len()
    })))
}

pub async fn get_doctor_bookings(
    State(state): State<Arc<AppointmentCellState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &doctor_id.to_string(), "view this doctor's bookings")?;

    let bookings = state.bookings.list_doctor_bookings(doctor_id).await?;

    Ok(Json(json!({
        "bookings": bookings,
        "total": bookings.len()
    })))
}

pub async fn get_bookable_slots(
    State(state): State<Arc<AppointmentCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<TimezoneQuery>,
) -> Result<Json<Value>, AppError> {
    let grid = state
        .bookings
        .bookable_slots(doctor_id, query.timezone.as_deref(), Utc::now())
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "total": grid.slot_count(),
        "timezone": grid.timezone,
        "days": grid.days,
    })))
}

// ==============================================================================
// TRANSITIONS
// ==============================================================================

pub async fn decide_booking(
    State(state): State<Arc<AppointmentCellState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    require_self_or_admin(&user, &booking.doctor_id.to_string(), "decide this booking")?;

    let outcome = state
        .bookings
        .decide_booking(booking_id, request.decision, request.doctor_name)
        .await?;

    Ok(Json(json!({
        "success": true,
        "booking": outcome.booking,
        "dispatch": outcome.dispatch
    })))
}

pub async fn initiate_payment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    require_self_or_admin(&user, &booking.patient_id.to_string(), "pay for this booking")?;

    let initiation = state.payments.initiate_payment(booking_id, request.doctor_name).await?;

    Ok(Json(json!({
        "success": true,
        "booking_id": initiation.booking_id,
        "payment": initiation.payment
    })))
}

pub async fn mark_paid(
    State(state): State<Arc<AppointmentCellState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user, "record payments")?;

    let outcome = state.payments.mark_paid(booking_id).await?;

    Ok(Json(json!({
        "success": true,
        "booking": outcome.booking,
        "dispatch": outcome.dispatch
    })))
}

pub async fn set_meet_link(
    State(state): State<Arc<AppointmentCellState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<MeetLinkRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    require_self_or_admin(&user, &booking.doctor_id.to_string(), "set the meeting link")?;

    let outcome = state.bookings.set_meet_link(booking_id, &request.meet_link).await?;

    Ok(Json(json!({
        "success": true,
        "booking": outcome.booking,
        "dispatch": outcome.dispatch
    })))
}

pub async fn mark_conducted(
    State(state): State<Arc<AppointmentCellState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    require_self_or_admin(&user, &booking.doctor_id.to_string(), "mark this consultation as conducted")?;

    let booking = state.bookings.mark_conducted(booking_id, Utc::now()).await?;

    Ok(Json(json!({
        "success": true,
        "booking": booking
    })))
}

pub async fn submit_feedback(
    State(state): State<Arc<AppointmentCellState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    require_self_or_admin(&user, &booking.patient_id.to_string(), "review this consultation")?;

    let outcome = state.feedback.submit_feedback(booking_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "booking": view_for(&user, outcome.booking),
        "score_delta": outcome.score_delta,
        "score_applied": outcome.score_error.is_none(),
    })))
}
