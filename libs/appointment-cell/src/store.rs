// libs/appointment-cell/src/store.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use doctor_cell::models::SlotKey;
use shared_database::{DbError, SupabaseClient};

use crate::models::{Booking, BookingStatus, NewBooking};

/// Compare-and-set condition. Every field that is set must match the stored
/// row for an update to apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingGuard {
    pub status: Option<BookingStatus>,
    pub is_paid: Option<bool>,
    pub consultation_conducted: Option<bool>,
    pub has_feedback_patient: Option<bool>,
}

impl BookingGuard {
    pub fn status(status: BookingStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = Some(is_paid);
        self
    }

    pub fn conducted(mut self, conducted: bool) -> Self {
        self.consultation_conducted = Some(conducted);
        self
    }

    pub fn reviewed(mut self, reviewed: bool) -> Self {
        self.has_feedback_patient = Some(reviewed);
        self
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.map_or(true, |s| booking.status == s)
            && self.is_paid.map_or(true, |v| booking.is_paid == v)
            && self.consultation_conducted.map_or(true, |v| booking.consultation_conducted == v)
            && self.has_feedback_patient.map_or(true, |v| booking.has_feedback_patient == v)
    }

    /// PostgREST filter fragments, e.g. `&status=eq.pending&is_paid=is.false`.
    fn query_filters(&self) -> String {
        let mut filters = String::new();
        if let Some(status) = self.status {
            filters.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(v) = self.is_paid {
            filters.push_str(&format!("&is_paid=is.{}", v));
        }
        if let Some(v) = self.consultation_conducted {
            filters.push_str(&format!("&consultation_conducted=is.{}", v));
        }
        if let Some(v) = self.has_feedback_patient {
            filters.push_str(&format!("&has_feedback_patient=is.{}", v));
        }
        filters
    }
}

/// Fields to write. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meet_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_conducted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_feedback_patient: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_occurred_patient: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_on_time_patient: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_rating_patient: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_feedback_patient: Option<String>,
}

impl BookingPatch {
    pub fn apply(&self, booking: &mut Booking) {
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(v) = self.is_paid {
            booking.is_paid = v;
        }
        if let Some(link) = &self.meet_link {
            booking.meet_link = Some(link.clone());
        }
        if let Some(v) = self.consultation_conducted {
            booking.consultation_conducted = v;
        }
        if let Some(v) = self.has_feedback_patient {
            booking.has_feedback_patient = v;
        }
        if let Some(v) = self.consultation_occurred_patient {
            booking.consultation_occurred_patient = Some(v);
        }
        if let Some(v) = self.consultation_on_time_patient {
            booking.consultation_on_time_patient = Some(v);
        }
        if let Some(v) = self.consultation_rating_patient {
            booking.consultation_rating_patient = Some(v);
        }
        if let Some(text) = &self.consultation_feedback_patient {
            booking.consultation_feedback_patient = Some(text.clone());
        }
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Booking>, DbError>;

    /// The pending or confirmed booking holding `key`, if any.
    async fn find_active(&self, doctor_id: Uuid, key: &SlotKey) -> Result<Option<Booking>, DbError>;

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Booking>, DbError>;

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Booking>, DbError>;

    async fn list_active_for_doctor_from(&self, doctor_id: Uuid, from_date: NaiveDate) -> Result<Vec<Booking>, DbError>;

    /// Fails with `DbError::UniqueViolation` when another active booking
    /// already holds the slot.
    async fn insert(&self, booking: NewBooking) -> Result<Booking, DbError>;

    /// Apply `patch` only if `guard` holds; `None` when it did not.
    async fn update_where(&self, id: Uuid, guard: &BookingGuard, patch: &BookingPatch) -> Result<Option<Booking>, DbError>;
}

// ==============================================================================
// POSTGREST
// ==============================================================================

pub struct SupabaseBookingStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseBookingStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Booking>, DbError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(self.supabase.service_key()),
            None,
        ).await?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Booking>, _>>()
            .map_err(DbError::from)
    }
}

#[async_trait]
impl BookingStore for SupabaseBookingStore {
    async fn get(&self, id: Uuid) -> Result<Option<Booking>, DbError> {
        let path = format!("/rest/v1/bookings?id=eq.{}&limit=1", id);
        Ok(self.fetch(&path).await?.into_iter().next())
    }

    async fn find_active(&self, doctor_id: Uuid, key: &SlotKey) -> Result<Option<Booking>, DbError> {
        let path = format!(
            "/rest/v1/bookings?doctor_id=eq.{}&booking_date=eq.{}&booking_time_slot=eq.{}&status=in.(pending,confirmed)&limit=1",
            doctor_id,
            key.date,
            urlencoding::encode(&key.time_slot.to_string())
        );
        Ok(self.fetch(&path).await?.into_iter().next())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Booking>, DbError> {
        let path = format!(
            "/rest/v1/bookings?patient_id=eq.{}&order=booking_date.desc,booking_time_slot.desc",
            patient_id
        );
        self.fetch(&path).await
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Booking>, DbError> {
        let path = format!(
            "/rest/v1/bookings?doctor_id=eq.{}&order=booking_date.desc,booking_time_slot.desc",
            doctor_id
        );
        self.fetch(&path).await
    }

    async fn list_active_for_doctor_from(&self, doctor_id: Uuid, from_date: NaiveDate) -> Result<Vec<Booking>, DbError> {
        let path = format!(
            "/rest/v1/bookings?doctor_id=eq.{}&booking_date=gte.{}&status=in.(pending,confirmed)&order=booking_date.asc,booking_time_slot.asc",
            doctor_id, from_date
        );
        self.fetch(&path).await
    }

    async fn insert(&self, booking: NewBooking) -> Result<Booking, DbError> {
        debug!("Inserting booking for doctor {} at {}", booking.doctor_id, booking.key());

        let mut body = serde_json::to_value(&booking)?;
        if let Value::Object(map) = &mut body {
            map.insert("status".to_string(), Value::from(BookingStatus::Pending.as_str()));
        }

        let rows: Vec<Booking> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/bookings",
            Some(self.supabase.service_key()),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::Decode("booking insert returned no row".to_string()))
    }

    async fn update_where(&self, id: Uuid, guard: &BookingGuard, patch: &BookingPatch) -> Result<Option<Booking>, DbError> {
        let path = format!("/rest/v1/bookings?id=eq.{}{}", id, guard.query_filters());
        debug!("Conditional booking update: {}", path);

        let rows: Vec<Booking> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(self.supabase.service_key()),
            Some(serde_json::to_value(patch)?),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        Ok(rows.into_iter().next())
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Bookings kept in process. Writes take the lock once, so the active-slot
/// check and the insert cannot interleave with another writer.
#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_desc(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| b.key().cmp(&a.key()).then(b.created_at.cmp(&a.created_at)));
    bookings
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn get(&self, id: Uuid) -> Result<Option<Booking>, DbError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_active(&self, doctor_id: Uuid, key: &SlotKey) -> Result<Option<Booking>, DbError> {
        let guard = self.bookings.read().await;
        Ok(guard
            .values()
            .find(|b| b.doctor_id == doctor_id && b.key() == *key && b.status.is_active())
            .cloned())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Booking>, DbError> {
        let guard = self.bookings.read().await;
        Ok(sorted_desc(guard.values().filter(|b| b.patient_id == patient_id).cloned().collect()))
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Booking>, DbError> {
        let guard = self.bookings.read().await;
        Ok(sorted_desc(guard.values().filter(|b| b.doctor_id == doctor_id).cloned().collect()))
    }

    async fn list_active_for_doctor_from(&self, doctor_id: Uuid, from_date: NaiveDate) -> Result<Vec<Booking>, DbError> {
        let guard = self.bookings.read().await;
        let mut active: Vec<Booking> = guard
            .values()
            .filter(|b| b.doctor_id == doctor_id && b.status.is_active() && b.booking_date >= from_date)
            .cloned()
            .collect();
        active.sort_by_key(Booking::key);
        Ok(active)
    }

    async fn insert(&self, booking: NewBooking) -> Result<Booking, DbError> {
        let mut guard = self.bookings.write().await;
        let key = booking.key();

        if guard
            .values()
            .any(|b| b.doctor_id == booking.doctor_id && b.key() == key && b.status.is_active())
        {
            return Err(DbError::UniqueViolation(format!(
                "bookings_active_slot_uidx: ({}, {})", booking.doctor_id, key
            )));
        }

        let stored = Booking {
            id: Uuid::new_v4(),
            patient_id: booking.patient_id,
            doctor_id: booking.doctor_id,
            booking_date: booking.booking_date,
            booking_time_slot: booking.booking_time_slot,
            status: BookingStatus::Pending,
            amount: booking.amount,
            consultation_duration_minutes: booking.consultation_duration_minutes,
            patient_timezone: booking.patient_timezone,
            is_paid: false,
            meet_link: None,
            consultation_conducted: false,
            has_feedback_patient: false,
            consultation_occurred_patient: None,
            consultation_on_time_patient: None,
            consultation_rating_patient: None,
            consultation_feedback_patient: None,
            created_at: Utc::now(),
        };
        guard.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_where(&self, id: Uuid, guard: &BookingGuard, patch: &BookingPatch) -> Result<Option<Booking>, DbError> {
        let mut bookings = self.bookings.write().await;
        let Some(booking) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        if !guard.matches(booking) {
            return Ok(None);
        }

        patch.apply(booking);
        Ok(Some(booking.clone()))
    }
}
