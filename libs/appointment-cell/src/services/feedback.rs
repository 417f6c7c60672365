// libs/appointment-cell/src/services/feedback.rs
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use doctor_cell::store::ScoreStore;

use crate::models::{BookingError, BookingStatus, FeedbackOutcome, FeedbackRequest};
use crate::services::lifecycle::BookingLifecycleService;
use crate::store::{BookingGuard, BookingPatch, BookingStore};

const MAX_FEEDBACK_LEN: usize = 2_000;

/// Reputation points for a rating.
pub fn score_delta(rating: i64) -> Option<i64> {
    match rating {
        5 => Some(50),
        4 => Some(25),
        3 => Some(0),
        2 => Some(-25),
        1 => Some(-50),
        _ => None,
    }
}

pub struct FeedbackService {
    bookings: Arc<dyn BookingStore>,
    scores: Arc<dyn ScoreStore>,
    lifecycle: BookingLifecycleService,
}

impl FeedbackService {
    pub fn new(bookings: Arc<dyn BookingStore>, scores: Arc<dyn ScoreStore>) -> Self {
        Self { bookings, scores, lifecycle: BookingLifecycleService::new() }
    }

    /// Store the patient's feedback, then move the doctor's score. The score
    /// is applied at most once per booking; a failed increment leaves the
    /// feedback in place and is only logged.
    pub async fn submit_feedback(
        &self,
        booking_id: Uuid,
        request: FeedbackRequest,
    ) -> Result<FeedbackOutcome, BookingError> {
        let (delta, rating) = score_delta(request.rating)
            .zip(i16::try_from(request.rating).ok())
            .ok_or_else(|| BookingError::Validation("rating must be between 1 and 5".to_string()))?;

        let text = request
            .feedback
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if text.as_ref().is_some_and(|t| t.chars().count() > MAX_FEEDBACK_LEN) {
            return Err(BookingError::Validation(format!(
                "feedback must be at most {} characters", MAX_FEEDBACK_LEN
            )));
        }

        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;
        self.lifecycle.validate_feedback(&booking)?;

        let guard = BookingGuard::status(BookingStatus::Confirmed).conducted(true).reviewed(false);
        let patch = BookingPatch {
            has_feedback_patient: Some(true),
            consultation_occurred_patient: Some(request.consultation_occurred),
            consultation_on_time_patient: Some(request.on_time),
            consultation_rating_patient: Some(rating),
            consultation_feedback_patient: text,
            ..BookingPatch::default()
        };

        let Some(booking) = self.bookings.update_where(booking_id, &guard, &patch).await? else {
            warn!("Feedback for booking {} lost a race with another submission", booking_id);
            return Err(BookingError::NotEligible("feedback has already been submitted".to_string()));
        };

        info!("Feedback recorded for booking {} (rating {})", booking.id, rating);

        let (doctor_points, score_error) = match self.scores.increment_points(booking.doctor_id, delta).await {
            Ok(points) => {
                info!("Doctor {} score moved by {} to {}", booking.doctor_id, delta, points);
                (Some(points), None)
            }
            Err(e) => {
                error!("Failed to apply score delta {} for doctor {} (booking {}): {}",
                       delta, booking.doctor_id, booking.id, e);
                (None, Some(e.to_string()))
            }
        };

        Ok(FeedbackOutcome { booking, score_delta: delta, doctor_points, score_error })
    }
}
