// libs/appointment-cell/src/services/booking.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::{SlotGrid, SlotKey};
use doctor_cell::services::AvailabilityService;
use notification_cell::models::{BookingDecidedRelay, BookingRequestedRelay, NotificationPayload};
use notification_cell::services::NotificationDispatcher;

use crate::models::{
    BatchBookingResult, BatchItem, BatchItemOutcome, Booking, BookingAction, BookingError, BookingOutcome,
    BookingStatus, CreateBookingRequest, CreateBookingsRequest, Decision, DispatchStatus, NewBooking,
};
use crate::services::conflict::{Arbitration, ConflictArbiter};
use crate::services::lifecycle::{BookingLifecycleService, Transition};
use crate::store::{BookingGuard, BookingPatch, BookingStore};

const MAX_BATCH_SLOTS: usize = 50;
const MAX_MEET_LINK_LEN: usize = 2_048;
const DEFAULT_PATIENT_NAME: &str = "A patient";
const DEFAULT_DOCTOR_NAME: &str = "Your doctor";

pub struct BookingService {
    bookings: Arc<dyn BookingStore>,
    availability: Arc<AvailabilityService>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    arbiter: ConflictArbiter,
    lifecycle: BookingLifecycleService,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        availability: Arc<AvailabilityService>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            arbiter: ConflictArbiter::new(bookings.clone(), availability.clone()),
            bookings,
            availability,
            dispatcher,
            lifecycle: BookingLifecycleService::new(),
        }
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    /// Reserve one slot. Repeating a request the patient already holds returns
    /// the existing booking without notifying anyone again.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome, BookingError> {
        let new_booking = self.validate_create(&request, now)?;
        let patient_name = request
            .patient_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PATIENT_NAME)
            .to_string();

        match self.arbiter.reserve(new_booking).await? {
            Arbitration::Existing(booking) => Ok(BookingOutcome { booking, dispatch: DispatchStatus::Skipped }),
            Arbitration::Created(booking) => {
                let relay = BookingRequestedRelay {
                    doctor_id: booking.doctor_id,
                    patient_name,
                    booking_date: booking.booking_date,
                    booking_time_slot: booking.booking_time_slot.to_string(),
                    booking_id: booking.id,
                    patient_id: booking.patient_id,
                    amount: booking.amount,
                    consultation_duration_minutes: booking.consultation_duration_minutes,
                    patient_timezone: booking.patient_timezone.clone(),
                };
                let dispatch = DispatchStatus::from_result(self.dispatcher.booking_requested(&relay).await);
                if dispatch.is_failed() {
                    warn!("Booking {} created but the doctor was not notified: {:?}", booking.id, dispatch);
                }
                Ok(BookingOutcome { booking, dispatch })
            }
        }
    }

    /// Book several slots in order. Each slot gets its own result; earlier
    /// successes stand even when a later slot fails.
    pub async fn create_bookings(
        &self,
        request: CreateBookingsRequest,
        now: DateTime<Utc>,
    ) -> Result<BatchBookingResult, BookingError> {
        if request.slots.is_empty() {
            return Err(BookingError::Validation("at least one slot is required".to_string()));
        }
        if request.slots.len() > MAX_BATCH_SLOTS {
            return Err(BookingError::Validation(format!(
                "at most {} slots may be booked at once", MAX_BATCH_SLOTS
            )));
        }

        let mut result = BatchBookingResult::default();
        let mut seen = HashSet::new();

        for slot in request.slots.iter().copied() {
            if !seen.insert(slot) {
                continue;
            }

            let outcome = match self.create_booking(request.item(slot), now).await {
                Ok(BookingOutcome { booking, dispatch }) => BatchItemOutcome::Booked { booking, dispatch },
                Err(e) => {
                    warn!("Batch item {} for doctor {} failed: {}", slot, request.doctor_id, e);
                    BatchItemOutcome::Failed { code: e.code(), error: e.to_string() }
                }
            };

            result.items.push(BatchItem {
                booking_date: slot.date,
                booking_time_slot: slot.time_slot,
                outcome,
            });
        }

        info!("Batch booking for patient {}: {} booked, {} failed",
              request.patient_id, result.booked(), result.failed());
        Ok(result)
    }

    fn validate_create(&self, request: &CreateBookingRequest, now: DateTime<Utc>) -> Result<NewBooking, BookingError> {
        if request.patient_id.is_nil() || request.doctor_id.is_nil() {
            return Err(BookingError::Validation("patient_id and doctor_id are required".to_string()));
        }
        if request.patient_id == request.doctor_id {
            return Err(BookingError::Validation("a doctor cannot book their own slot".to_string()));
        }
        if !request.amount.is_finite() || request.amount < 0.0 {
            return Err(BookingError::Validation("amount must be a non-negative number".to_string()));
        }

        let key = SlotKey::new(request.booking_date, request.booking_time_slot);
        if key.start_utc() <= now {
            return Err(BookingError::Validation(format!("slot {} has already started", key)));
        }

        let generator = self.availability.generator();
        let patient_timezone = generator
            .resolve_timezone(request.patient_timezone.as_deref())
            .map(|tz| tz.name().to_string())
            .ok_or_else(|| BookingError::Validation("patient timezone could not be determined".to_string()))?;

        Ok(NewBooking {
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            booking_date: key.date,
            booking_time_slot: key.time_slot,
            amount: request.amount,
            consultation_duration_minutes: i32::try_from(generator.config().slot_minutes).unwrap_or(i32::MAX),
            patient_timezone,
        })
    }

    // ==========================================================================
    // TRANSITIONS
    // ==========================================================================

    pub async fn decide_booking(
        &self,
        booking_id: Uuid,
        decision: Decision,
        doctor_name: Option<String>,
    ) -> Result<BookingOutcome, BookingError> {
        let booking = self.get_booking(booking_id).await?;
        self.lifecycle.validate_decision(&booking)?;

        let status = BookingStatus::from(decision);
        let patch = BookingPatch { status: Some(status), ..BookingPatch::default() };
        let booking = self
            .commit(booking_id, BookingGuard::status(BookingStatus::Pending), patch, BookingAction::Decide)
            .await?;

        info!("Booking {} {} by doctor {}", booking.id, booking.status, booking.doctor_id);

        let relay = BookingDecidedRelay {
            booking: booking.relay_view(),
            doctor_name: doctor_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DOCTOR_NAME.to_string()),
        };
        let relayed = DispatchStatus::from_result(self.dispatcher.booking_decided(&relay).await);

        let payload = match decision {
            Decision::Confirmed => NotificationPayload::BookingConfirmed {
                booking_id: booking.id,
                doctor_id: booking.doctor_id,
                booking_date: booking.booking_date,
                booking_time_slot: booking.booking_time_slot.to_string(),
                doctor_name: Some(relay.doctor_name.clone()),
            },
            Decision::Rejected => NotificationPayload::BookingRejected {
                booking_id: booking.id,
                doctor_id: booking.doctor_id,
                booking_date: booking.booking_date,
                booking_time_slot: booking.booking_time_slot.to_string(),
            },
        };
        let notified = DispatchStatus::from_result(self.dispatcher.notify(booking.patient_id, payload).await);

        let dispatch = relayed.combine(notified);
        if dispatch.is_failed() {
            warn!("Booking {} decided but notification failed: {:?}", booking.id, dispatch);
        }
        Ok(BookingOutcome { booking, dispatch })
    }

    /// Set or replace the meeting link once payment is settled or waived.
    pub async fn set_meet_link(&self, booking_id: Uuid, meet_link: &str) -> Result<BookingOutcome, BookingError> {
        let link = meet_link.trim();
        if link.is_empty() || link.len() > MAX_MEET_LINK_LEN {
            return Err(BookingError::Validation("meet_link must be a non-empty URL".to_string()));
        }
        if !(link.starts_with("https://") || link.starts_with("http://")) {
            return Err(BookingError::Validation("meet_link must be an http(s) URL".to_string()));
        }

        let booking = self.get_booking(booking_id).await?;
        self.lifecycle.validate_meet_link(&booking)?;

        let patch = BookingPatch { meet_link: Some(link.to_string()), ..BookingPatch::default() };
        let booking = self
            .commit(booking_id, BookingGuard::status(BookingStatus::Confirmed), patch, BookingAction::SetMeetLink)
            .await?;

        info!("Meeting link set on booking {}", booking.id);

        let payload = NotificationPayload::MeetLinkUpdate { booking_id: booking.id, meet_link: link.to_string() };
        let dispatch = DispatchStatus::from_result(self.dispatcher.notify(booking.patient_id, payload).await);
        Ok(BookingOutcome { booking, dispatch })
    }

    /// Idempotent: a booking already marked conducted is returned unchanged.
    pub async fn mark_conducted(&self, booking_id: Uuid, now: DateTime<Utc>) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id).await?;
        if self.lifecycle.validate_conducted(&booking, now)? == Transition::AlreadyDone {
            return Ok(booking);
        }

        let guard = BookingGuard::status(BookingStatus::Confirmed).conducted(false);
        let patch = BookingPatch { consultation_conducted: Some(true), ..BookingPatch::default() };

        match self.bookings.update_where(booking_id, &guard, &patch).await? {
            Some(updated) => {
                info!("Booking {} marked as conducted", updated.id);
                Ok(updated)
            }
            None => {
                let current = self.get_booking(booking_id).await?;
                if current.consultation_conducted {
                    Ok(current)
                } else {
                    Err(BookingError::invalid_transition(&current, BookingAction::MarkConducted))
                }
            }
        }
    }

    /// Conditional write. A failed guard means another caller moved the
    /// booking first; report the state it is in now.
    async fn commit(
        &self,
        booking_id: Uuid,
        guard: BookingGuard,
        patch: BookingPatch,
        action: BookingAction,
    ) -> Result<Booking, BookingError> {
        if let Some(updated) = self.bookings.update_where(booking_id, &guard, &patch).await? {
            return Ok(updated);
        }

        let current = self.get_booking(booking_id).await?;
        warn!("Booking {} changed before {} could apply", booking_id, action);
        Err(BookingError::invalid_transition(&current, action))
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        debug!("Fetching booking {}", booking_id);
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    /// Patient-facing list; meeting links stay hidden until visible.
    pub async fn list_patient_bookings(&self, patient_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let bookings = self.bookings.list_for_patient(patient_id).await?;
        Ok(bookings.into_iter().map(Booking::patient_view).collect())
    }

    pub async fn list_doctor_bookings(&self, doctor_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list_for_doctor(doctor_id).await?)
    }

    /// Open slots within the horizon that no active booking holds, in the
    /// patient's timezone.
    pub async fn bookable_slots(
        &self,
        doctor_id: Uuid,
        timezone: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SlotGrid, BookingError> {
        let generator = self.availability.generator();
        let Some(tz) = generator.resolve_timezone(timezone) else {
            warn!("No usable timezone for bookable slots of doctor {}", doctor_id);
            return Ok(SlotGrid::empty());
        };

        let from_date = (now - Duration::days(1)).date_naive();
        let until = now + generator.horizon();

        let held: HashSet<SlotKey> = self
            .bookings
            .list_active_for_doctor_from(doctor_id, from_date)
            .await?
            .iter()
            .map(Booking::key)
            .collect();

        let starts: Vec<DateTime<Utc>> = self
            .availability
            .get_availability(doctor_id, from_date)
            .await?
            .iter()
            .map(|slot| slot.key())
            .filter(|key| !held.contains(key))
            .map(|key| key.start_utc())
            .filter(|start| *start >= now && *start < until)
            .collect();

        debug!("Doctor {} has {} bookable slots", doctor_id, starts.len());
        Ok(generator.render(tz, starts))
    }
}
