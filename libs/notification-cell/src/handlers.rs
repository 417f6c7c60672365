// libs/notification-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{AnnouncementRequest, DispatchError};
use crate::services::announcement::AnnouncementService;

pub struct NotificationCellState {
    pub config: Arc<AppConfig>,
    pub announcements: Arc<AnnouncementService>,
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(msg) => AppError::ValidationError(msg),
            DispatchError::Persistence(e) => AppError::Database(e.to_string()),
            other => AppError::ExternalService(other.to_string()),
        }
    }
}

pub async fn send_announcement(
    State(state): State<Arc<NotificationCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<AnnouncementRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user, "send announcements")?;

    let report = state.announcements.announce(request).await?;

    Ok(Json(json!({
        "success": report.failed.is_empty(),
        "delivered": report.delivered,
        "failed": report.failed,
    })))
}
