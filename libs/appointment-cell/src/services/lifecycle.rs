// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{Booking, BookingAction, BookingError, BookingStatus};

/// Whether a transition changes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    AlreadyDone,
}

/// Pure booking state machine. Pending branches once into Confirmed or
/// Rejected; Confirmed then carries one-way flags (paid, conducted,
/// reviewed). Rejected is terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingLifecycleService;

impl BookingLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_decision(&self, booking: &Booking) -> Result<(), BookingError> {
        self.require(booking, BookingAction::Decide, booking.status == BookingStatus::Pending)
    }

    pub fn validate_payment_initiation(&self, booking: &Booking) -> Result<(), BookingError> {
        let allowed = booking.status == BookingStatus::Confirmed && !booking.is_paid && !booking.is_free();
        self.require(booking, BookingAction::InitiatePayment, allowed)
    }

    pub fn validate_mark_paid(&self, booking: &Booking) -> Result<(), BookingError> {
        let allowed = booking.status == BookingStatus::Confirmed && !booking.is_paid;
        self.require(booking, BookingAction::MarkPaid, allowed)
    }

    /// Confirmed, and either paid or free.
    pub fn validate_meet_link(&self, booking: &Booking) -> Result<(), BookingError> {
        let allowed = booking.status == BookingStatus::Confirmed && booking.payment_satisfied();
        self.require(booking, BookingAction::SetMeetLink, allowed)
    }

    /// Confirmed and the scheduled start has passed. Re-marking is a no-op.
    pub fn validate_conducted(&self, booking: &Booking, now: DateTime<Utc>) -> Result<Transition, BookingError> {
        if booking.consultation_conducted {
            debug!("Booking {} already marked as conducted", booking.id);
            return Ok(Transition::AlreadyDone);
        }

        self.require(booking, BookingAction::MarkConducted, booking.status == BookingStatus::Confirmed)?;

        if now < booking.scheduled_start() {
            warn!("Booking {} cannot be conducted before {}", booking.id, booking.scheduled_start());
            return Err(BookingError::InvalidTransition {
                state: format!("{}, scheduled for {}", booking.state_label(), booking.scheduled_start()),
                action: BookingAction::MarkConducted,
            });
        }

        Ok(Transition::Apply)
    }

    pub fn validate_feedback(&self, booking: &Booking) -> Result<(), BookingError> {
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::NotEligible(format!("booking is {}", booking.status)));
        }
        if !booking.consultation_conducted {
            return Err(BookingError::NotEligible("consultation has not been conducted yet".to_string()));
        }
        if booking.has_feedback_patient {
            return Err(BookingError::NotEligible("feedback has already been submitted".to_string()));
        }
        Ok(())
    }

    fn require(&self, booking: &Booking, action: BookingAction, allowed: bool) -> Result<(), BookingError> {
        if allowed {
            Ok(())
        } else {
            warn!("Rejected transition on booking {}: cannot {} while {}", booking.id, action, booking.state_label());
            Err(BookingError::invalid_transition(booking, action))
        }
    }
}
