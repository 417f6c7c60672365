// libs/doctor-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_self_or_admin;

use crate::models::{AvailabilityError, AvailabilityQuery, SetAvailabilityRequest, TimezoneQuery};
use crate::services::availability::AvailabilityService;
use crate::store::ScoreStore;

/// Everything the doctor routes need, injected once at startup.
pub struct DoctorCellState {
    pub config: Arc<AppConfig>,
    pub availability: Arc<AvailabilityService>,
    pub scores: Arc<dyn ScoreStore>,
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Validation(msg) => AppError::ValidationError(msg),
            AvailabilityError::Persistence(e) => AppError::Database(e.to_string()),
        }
    }
}

pub async fn set_availability(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<SetAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &doctor_id.to_string(), "change this doctor's availability")?;

    let slots = state.availability.set_availability(doctor_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "doctor_id": doctor_id,
        "slots": slots,
        "message": "Availability saved"
    })))
}

pub async fn get_availability(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let from_date = query.from_date.unwrap_or_else(|| Utc::now().date_naive());
    let slots = state.availability.get_availability(doctor_id, from_date).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from_date": from_date,
        "slots": slots,
        "total": slots.len()
    })))
}

pub async fn get_schedule(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<TimezoneQuery>,
) -> Result<Json<Value>, AppError> {
    let schedule = state
        .availability
        .schedule(doctor_id, query.timezone.as_deref(), Utc::now())
        .await?;

    Ok(Json(json!(schedule)))
}

pub async fn get_doctor_score(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let score = state
        .scores
        .get_score(doctor_id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!(score)))
}
