// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use tracing::{debug, info, warn};

use doctor_cell::services::AvailabilityService;

use crate::models::{Booking, BookingError, NewBooking};
use crate::store::BookingStore;

/// Result of arbitrating a slot request.
#[derive(Debug, Clone)]
pub enum Arbitration {
    /// A new pending booking was inserted.
    Created(Booking),
    /// The requester already holds this slot; nothing was written.
    Existing(Booking),
}

/// Keeps at most one active booking per slot. The lookup before the insert
/// only gives early answers; the store's unique constraint decides races.
pub struct ConflictArbiter {
    bookings: Arc<dyn BookingStore>,
    availability: Arc<AvailabilityService>,
}

impl ConflictArbiter {
    pub fn new(bookings: Arc<dyn BookingStore>, availability: Arc<AvailabilityService>) -> Self {
        Self { bookings, availability }
    }

    pub async fn reserve(&self, request: NewBooking) -> Result<Arbitration, BookingError> {
        let key = request.key();
        debug!("Arbitrating slot {} of doctor {} for patient {}", key, request.doctor_id, request.patient_id);

        if !self.availability.is_open(request.doctor_id, &key).await? {
            warn!("Slot {} is not open for doctor {}", key, request.doctor_id);
            return Err(BookingError::SlotUnavailable { slot: key });
        }

        if let Some(existing) = self.bookings.find_active(request.doctor_id, &key).await? {
            return Self::resolve_existing(existing, &request);
        }

        let patient_id = request.patient_id;
        let doctor_id = request.doctor_id;
        match self.bookings.insert(request).await {
            Ok(booking) => {
                info!("Booking {} created for slot {} (doctor {}, patient {})", booking.id, key, doctor_id, patient_id);
                Ok(Arbitration::Created(booking))
            }
            Err(e) if e.is_unique_violation() => {
                // Lost the race; whoever won now holds the slot.
                debug!("Unique violation on slot {}, re-reading holder", key);
                match self.bookings.find_active(doctor_id, &key).await? {
                    Some(holder) if holder.patient_id == patient_id => Ok(Arbitration::Existing(holder)),
                    _ => {
                        warn!("Slot {} of doctor {} taken concurrently", key, doctor_id);
                        Err(BookingError::SlotConflict { slot: key })
                    }
                }
            }
            Err(e) => Err(BookingError::Persistence(e)),
        }
    }

    fn resolve_existing(existing: Booking, request: &NewBooking) -> Result<Arbitration, BookingError> {
        if existing.patient_id == request.patient_id {
            debug!("Patient {} already holds booking {}", request.patient_id, existing.id);
            Ok(Arbitration::Existing(existing))
        } else {
            warn!("Slot {} of doctor {} already held by booking {}", existing.key(), existing.doctor_id, existing.id);
            Err(BookingError::SlotConflict { slot: existing.key() })
        }
    }
}
