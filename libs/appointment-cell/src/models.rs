// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::{AvailabilityError, SlotKey, TimeSlot};
use notification_cell::models::{DispatchError, RelayBooking};
use shared_database::DbError;

// ==============================================================================
// CORE BOOKING MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
        }
    }

    /// Pending and confirmed bookings hold their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A doctor's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Confirmed,
    Rejected,
}

impl From<Decision> for BookingStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Confirmed => BookingStatus::Confirmed,
            Decision::Rejected => BookingStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time_slot: TimeSlot,
    pub status: BookingStatus,
    pub amount: f64,
    pub consultation_duration_minutes: i32,
    pub patient_timezone: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub meet_link: Option<String>,
    #[serde(default)]
    pub consultation_conducted: bool,
    #[serde(default)]
    pub has_feedback_patient: bool,
    #[serde(default)]
    pub consultation_occurred_patient: Option<bool>,
    #[serde(default)]
    pub consultation_on_time_patient: Option<bool>,
    #[serde(default)]
    pub consultation_rating_patient: Option<i16>,
    #[serde(default)]
    pub consultation_feedback_patient: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.booking_date, self.booking_time_slot)
    }

    pub fn scheduled_start(&self) -> DateTime<Utc> {
        self.key().start_utc()
    }

    pub fn is_free(&self) -> bool {
        self.amount <= 0.0
    }

    /// Payment is settled or was never required.
    pub fn payment_satisfied(&self) -> bool {
        self.is_paid || self.is_free()
    }

    pub fn meet_link_visible(&self) -> bool {
        self.status == BookingStatus::Confirmed && self.payment_satisfied() && self.meet_link.is_some()
    }

    /// The booking as its patient may see it.
    pub fn patient_view(mut self) -> Self {
        if !self.meet_link_visible() {
            self.meet_link = None;
        }
        self
    }

    /// Short description of where the booking sits in its lifecycle.
    pub fn state_label(&self) -> String {
        match self.status {
            BookingStatus::Confirmed => {
                let mut label = String::from("confirmed");
                if self.is_paid {
                    label.push_str(", paid");
                }
                if self.consultation_conducted {
                    label.push_str(", conducted");
                }
                if self.has_feedback_patient {
                    label.push_str(", reviewed");
                }
                label
            }
            other => other.to_string(),
        }
    }

    pub fn relay_view(&self) -> RelayBooking {
        RelayBooking {
            id: self.id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            status: self.status.to_string(),
            booking_date: self.booking_date,
            booking_time_slot: self.booking_time_slot.to_string(),
        }
    }
}

/// Row to insert; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewBooking {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time_slot: TimeSlot,
    pub amount: f64,
    pub consultation_duration_minutes: i32,
    pub patient_timezone: String,
}

impl NewBooking {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.booking_date, self.booking_time_slot)
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time_slot: TimeSlot,
    #[serde(default)]
    pub amount: f64,
    pub patient_timezone: Option<String>,
    pub patient_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingsRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slots: Vec<SlotKey>,
    #[serde(default)]
    pub amount: f64,
    pub patient_timezone: Option<String>,
    pub patient_name: Option<String>,
}

impl CreateBookingsRequest {
    pub fn item(&self, slot: SlotKey) -> CreateBookingRequest {
        CreateBookingRequest {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            booking_date: slot.date,
            booking_time_slot: slot.time_slot,
            amount: self.amount,
            patient_timezone: self.patient_timezone.clone(),
            patient_name: self.patient_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    pub doctor_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub doctor_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeetLinkRequest {
    pub meet_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub consultation_occurred: bool,
    pub on_time: bool,
    /// 1 to 5, checked by the feedback service.
    pub rating: i64,
    pub feedback: Option<String>,
}

// ==============================================================================
// OUTCOMES
// ==============================================================================

/// What happened to the side effects of a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchStatus {
    Delivered,
    Skipped,
    Failed { error: String },
}

impl DispatchStatus {
    pub fn from_result<T>(result: Result<T, DispatchError>) -> Self {
        match result {
            Ok(_) => DispatchStatus::Delivered,
            Err(DispatchError::NotConfigured) => DispatchStatus::Skipped,
            Err(e) => DispatchStatus::Failed { error: e.to_string() },
        }
    }

    /// Failures win, then deliveries.
    pub fn combine(self, other: DispatchStatus) -> Self {
        match (self, other) {
            (DispatchStatus::Failed { error: a }, DispatchStatus::Failed { error: b }) => {
                DispatchStatus::Failed { error: format!("{}; {}", a, b) }
            }
            (failed @ DispatchStatus::Failed { .. }, _) | (_, failed @ DispatchStatus::Failed { .. }) => failed,
            (DispatchStatus::Delivered, _) | (_, DispatchStatus::Delivered) => DispatchStatus::Delivered,
            _ => DispatchStatus::Skipped,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchStatus::Failed { .. })
    }
}

/// A committed transition plus the fate of its notifications. A failed
/// dispatch never means the transition was undone.
#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub dispatch: DispatchStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchItemOutcome {
    Booked { booking: Booking, dispatch: DispatchStatus },
    Failed { code: &'static str, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub booking_date: NaiveDate,
    pub booking_time_slot: TimeSlot,
    #[serde(flatten)]
    pub outcome: BatchItemOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchBookingResult {
    pub items: Vec<BatchItem>,
}

impl BatchBookingResult {
    pub fn booked(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, BatchItemOutcome::Booked { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.booked()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub booking_id: Uuid,
    /// Opaque redirect payload from the payment initializer.
    pub payment: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackOutcome {
    pub booking: Booking,
    pub score_delta: i64,
    pub doctor_points: Option<i64>,
    /// Set when the score increment failed; the feedback itself is stored.
    pub score_error: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Decide,
    InitiatePayment,
    MarkPaid,
    SetMeetLink,
    MarkConducted,
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BookingAction::Decide => "decide",
            BookingAction::InitiatePayment => "start payment for",
            BookingAction::MarkPaid => "mark as paid",
            BookingAction::SetMeetLink => "set the meeting link on",
            BookingAction::MarkConducted => "mark as conducted",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Slot {slot} is not open for booking")]
    SlotUnavailable { slot: SlotKey },

    #[error("Slot {slot} is already held by another patient")]
    SlotConflict { slot: SlotKey },

    #[error("Cannot {action} a booking that is {state}")]
    InvalidTransition { state: String, action: BookingAction },

    #[error("Feedback not allowed: {0}")]
    NotEligible(String),

    #[error("Booking {0} not found")]
    NotFound(Uuid),

    #[error("External dispatch failed: {0}")]
    ExternalDispatch(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] DbError),
}

impl BookingError {
    pub fn invalid_transition(booking: &Booking, action: BookingAction) -> Self {
        BookingError::InvalidTransition { state: booking.state_label(), action }
    }

    /// Machine-readable code used in per-item batch results and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_error",
            BookingError::SlotUnavailable { .. } => "slot_unavailable",
            BookingError::SlotConflict { .. } => "slot_conflict",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::NotEligible(_) => "not_eligible",
            BookingError::NotFound(_) => "not_found",
            BookingError::ExternalDispatch(_) => "external_dispatch_failure",
            BookingError::Persistence(_) => "persistence_failure",
        }
    }
}

impl From<AvailabilityError> for BookingError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Validation(msg) => BookingError::Validation(msg),
            AvailabilityError::Persistence(e) => BookingError::Persistence(e),
        }
    }
}
