// libs/doctor-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DbError;

// ==============================================================================
// SLOT KEYS
// ==============================================================================

/// Minute-precision start time of a slot, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlot(NaiveTime);

impl TimeSlot {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(TimeSlot)
    }

    /// Drops seconds and sub-seconds.
    pub fn from_time(time: NaiveTime) -> Self {
        TimeSlot(time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for TimeSlot {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let time = NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .map_err(|_| format!("invalid time slot '{}', expected HH:MM", value))?;

        if time.second() != 0 || time.nanosecond() != 0 {
            return Err(format!("time slot '{}' must fall on a whole minute", value));
        }

        Ok(TimeSlot(time))
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical identity of a bookable slot: its UTC start date and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
}

impl SlotKey {
    pub fn new(date: NaiveDate, time_slot: TimeSlot) -> Self {
        Self { date, time_slot }
    }

    pub fn from_utc(start: DateTime<Utc>) -> Self {
        Self {
            date: start.date_naive(),
            time_slot: TimeSlot::from_time(start.time()),
        }
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.date.and_time(self.time_slot.time()).and_utc()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time_slot)
    }
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
}

impl DoctorAvailability {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.time_slot)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAvailabilityRequest {
    pub from_date: NaiveDate,
    pub slots: Vec<SlotKey>,
    /// Zone the grid is checked in. Host zone when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityQuery {
    pub from_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimezoneQuery {
    pub timezone: Option<String>,
}

// ==============================================================================
// SLOT GRID
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Local date and start time in the grid's timezone, e.g. `2025-06-01_09:00`.
    pub id: String,
    pub label: String,
    pub date: NaiveDate,
    pub start_time: TimeSlot,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl Slot {
    pub fn key(&self) -> SlotKey {
        SlotKey::from_utc(self.start_utc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub label: String,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotGrid {
    /// Zone the grid was rendered in; `None` when no zone could be resolved.
    pub timezone: Option<String>,
    pub days: Vec<DaySlots>,
}

impl SlotGrid {
    pub fn empty() -> Self {
        Self { timezone: None, days: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(|day| day.slots.is_empty())
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.days.iter().flat_map(|day| day.slots.iter())
    }

    pub fn slot_count(&self) -> usize {
        self.days.iter().map(|day| day.slots.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSlot {
    #[serde(flatten)]
    pub slot: Slot,
    pub is_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub date: NaiveDate,
    pub label: String,
    pub slots: Vec<ScheduleSlot>,
}

/// Doctor-facing grid: every candidate slot, flagged when opened for booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub doctor_id: Uuid,
    pub timezone: Option<String>,
    pub days: Vec<ScheduleDay>,
}

// ==============================================================================
// SCORING
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorScore {
    pub doctor_id: Uuid,
    pub points: i64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] DbError),
}
