// libs/doctor-cell/src/store.rs
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::{DbError, SupabaseClient};

use crate::models::{DoctorAvailability, DoctorScore, SlotKey};

/// Persisted record of the slots each doctor has opened.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Atomically replace every slot dated `from_date` or later with `slots`.
    async fn replace_from(
        &self,
        doctor_id: Uuid,
        from_date: NaiveDate,
        slots: &[SlotKey],
    ) -> Result<Vec<DoctorAvailability>, DbError>;

    async fn list_from(&self, doctor_id: Uuid, from_date: NaiveDate) -> Result<Vec<DoctorAvailability>, DbError>;

    async fn contains(&self, doctor_id: Uuid, key: &SlotKey) -> Result<bool, DbError>;
}

/// Doctor reputation points.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Atomic `points += delta`; returns the new total.
    async fn increment_points(&self, doctor_id: Uuid, delta: i64) -> Result<i64, DbError>;

    async fn get_score(&self, doctor_id: Uuid) -> Result<DoctorScore, DbError>;
}

// ==============================================================================
// POSTGREST
// ==============================================================================

pub struct SupabaseAvailabilityStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAvailabilityStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<DoctorAvailability>, DbError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(self.supabase.service_key()),
            None,
        ).await?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DoctorAvailability>, _>>()
            .map_err(DbError::from)
    }
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn replace_from(
        &self,
        doctor_id: Uuid,
        from_date: NaiveDate,
        slots: &[SlotKey],
    ) -> Result<Vec<DoctorAvailability>, DbError> {
        debug!("Replacing availability for doctor {} from {} with {} slots", doctor_id, from_date, slots.len());

        let rows: Vec<Value> = self.supabase.rpc(
            "set_doctor_availability",
            json!({
                "p_doctor_id": doctor_id,
                "p_from_date": from_date,
                "p_slots": slots,
            }),
            Some(self.supabase.service_key()),
        ).await?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DoctorAvailability>, _>>()
            .map_err(DbError::from)
    }

    async fn list_from(&self, doctor_id: Uuid, from_date: NaiveDate) -> Result<Vec<DoctorAvailability>, DbError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&date=gte.{}&order=date.asc,time_slot.asc",
            doctor_id, from_date
        );
        self.fetch(&path).await
    }

    async fn contains(&self, doctor_id: Uuid, key: &SlotKey) -> Result<bool, DbError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&date=eq.{}&time_slot=eq.{}&limit=1",
            doctor_id, key.date, key.time_slot
        );
        Ok(!self.fetch(&path).await?.is_empty())
    }
}

pub struct SupabaseScoreStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseScoreStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl ScoreStore for SupabaseScoreStore {
    async fn increment_points(&self, doctor_id: Uuid, delta: i64) -> Result<i64, DbError> {
        self.supabase.rpc(
            "increment_doctor_points",
            json!({ "p_doctor_id": doctor_id, "p_delta": delta }),
            Some(self.supabase.service_key()),
        ).await
    }

    async fn get_score(&self, doctor_id: Uuid) -> Result<DoctorScore, DbError> {
        let path = format!("/rest/v1/doctor_scores?doctor_id=eq.{}&select=doctor_id,points", doctor_id);
        let rows: Vec<DoctorScore> = self.supabase.request(
            Method::GET,
            &path,
            Some(self.supabase.service_key()),
            None,
        ).await?;

        Ok(rows.into_iter().next().unwrap_or(DoctorScore { doctor_id, points: 0 }))
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Availability kept in process; each operation holds the lock for its whole
/// duration so replacement is never observed half-done.
#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    slots: RwLock<HashMap<Uuid, BTreeSet<SlotKey>>>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn replace_from(
        &self,
        doctor_id: Uuid,
        from_date: NaiveDate,
        slots: &[SlotKey],
    ) -> Result<Vec<DoctorAvailability>, DbError> {
        let mut guard = self.slots.write().await;
        let entry = guard.entry(doctor_id).or_default();
        entry.retain(|key| key.date < from_date);
        entry.extend(slots.iter().copied());

        Ok(entry
            .iter()
            .filter(|key| key.date >= from_date)
            .map(|key| DoctorAvailability { doctor_id, date: key.date, time_slot: key.time_slot })
            .collect())
    }

    async fn list_from(&self, doctor_id: Uuid, from_date: NaiveDate) -> Result<Vec<DoctorAvailability>, DbError> {
        let guard = self.slots.read().await;
        Ok(guard
            .get(&doctor_id)
            .map(|keys| {
                keys.iter()
                    .filter(|key| key.date >= from_date)
                    .map(|key| DoctorAvailability { doctor_id, date: key.date, time_slot: key.time_slot })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn contains(&self, doctor_id: Uuid, key: &SlotKey) -> Result<bool, DbError> {
        let guard = self.slots.read().await;
        Ok(guard.get(&doctor_id).is_some_and(|keys| keys.contains(key)))
    }
}

#[derive(Default)]
pub struct InMemoryScoreStore {
    points: RwLock<BTreeMap<Uuid, i64>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn increment_points(&self, doctor_id: Uuid, delta: i64) -> Result<i64, DbError> {
        let mut guard = self.points.write().await;
        let points = guard.entry(doctor_id).or_insert(0);
        *points += delta;
        Ok(*points)
    }

    async fn get_score(&self, doctor_id: Uuid) -> Result<DoctorScore, DbError> {
        let guard = self.points.read().await;
        Ok(DoctorScore { doctor_id, points: guard.get(&doctor_id).copied().unwrap_or(0) })
    }
}
