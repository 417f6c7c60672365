// libs/doctor-cell/src/services/availability.rs
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    AvailabilityError, DoctorAvailability, DoctorSchedule, ScheduleDay, ScheduleSlot,
    SetAvailabilityRequest, SlotKey,
};
use crate::services::slots::SlotGenerator;
use crate::store::AvailabilityStore;

/// Upper bound on slots accepted in one save.
const MAX_SLOTS_PER_SAVE: usize = 2_000;

pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
    generator: SlotGenerator,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn AvailabilityStore>, generator: SlotGenerator) -> Self {
        Self { store, generator }
    }

    pub fn generator(&self) -> &SlotGenerator {
        &self.generator
    }

    /// Replace the doctor's future availability with exactly `request.slots`.
    pub async fn set_availability(
        &self,
        doctor_id: Uuid,
        request: SetAvailabilityRequest,
    ) -> Result<Vec<DoctorAvailability>, AvailabilityError> {
        debug!("Setting availability for doctor {} from {}", doctor_id, request.from_date);

        if doctor_id.is_nil() {
            return Err(AvailabilityError::Validation("doctor_id is required".to_string()));
        }
        if request.slots.len() > MAX_SLOTS_PER_SAVE {
            return Err(AvailabilityError::Validation(format!(
                "at most {} slots may be saved at once", MAX_SLOTS_PER_SAVE
            )));
        }
        if let Some(early) = request.slots.iter().find(|key| key.date < request.from_date) {
            warn!("Rejected availability slot {} before {}", early, request.from_date);
            return Err(AvailabilityError::Validation(format!(
                "slot {} is earlier than from_date {}", early, request.from_date
            )));
        }

        let tz = self
            .generator
            .resolve_timezone(request.timezone.as_deref())
            .ok_or_else(|| AvailabilityError::Validation("no usable timezone to check slots against".to_string()))?;
        if let Some(stray) = request.slots.iter().find(|key| !self.generator.is_grid_start(&tz, key.start_utc())) {
            let grid = self.generator.config();
            warn!("Rejected off-grid availability slot {} in {}", stray, tz.name());
            return Err(AvailabilityError::Validation(format!(
                "slot {} is not a {}-minute slot between {} and {} in {}",
                stray,
                grid.slot_minutes,
                grid.work_start.format("%H:%M"),
                grid.work_end.format("%H:%M"),
                tz.name()
            )));
        }

        let slots: Vec<SlotKey> = request.slots.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        let saved = self.store.replace_from(doctor_id, request.from_date, &slots).await?;

        info!("Doctor {} now has {} open slots from {}", doctor_id, saved.len(), request.from_date);
        Ok(saved)
    }

    pub async fn get_availability(
        &self,
        doctor_id: Uuid,
        from_date: NaiveDate,
    ) -> Result<Vec<DoctorAvailability>, AvailabilityError> {
        debug!("Fetching availability for doctor {} from {}", doctor_id, from_date);
        Ok(self.store.list_from(doctor_id, from_date).await?)
    }

    pub async fn is_open(&self, doctor_id: Uuid, key: &SlotKey) -> Result<bool, AvailabilityError> {
        Ok(self.store.contains(doctor_id, key).await?)
    }

    /// The generator's grid in the doctor's zone, each slot flagged when open.
    pub async fn schedule(
        &self,
        doctor_id: Uuid,
        timezone: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DoctorSchedule, AvailabilityError> {
        let grid = self.generator.generate(now, timezone);

        let open: HashSet<SlotKey> = self
            .store
            .list_from(doctor_id, (now - Duration::days(1)).date_naive())
            .await?
            .iter()
            .map(DoctorAvailability::key)
            .collect();

        let days = grid
            .days
            .into_iter()
            .map(|day| ScheduleDay {
                date: day.date,
                label: day.label,
                slots: day
                    .slots
                    .into_iter()
                    .map(|slot| {
                        let is_open = open.contains(&slot.key());
                        ScheduleSlot { slot, is_open }
                    })
                    .collect(),
            })
            .collect();

        Ok(DoctorSchedule { doctor_id, timezone: grid.timezone, days })
    }
}
