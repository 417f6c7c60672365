// libs/doctor-cell/src/services/slots.rs
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::models::{DaySlots, Slot, SlotGrid, TimeSlot};

/// Shape of the bookable grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGridConfig {
    pub horizon_days: u32,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub slot_minutes: u32,
}

impl Default for SlotGridConfig {
    fn default() -> Self {
        Self {
            horizon_days: 14,
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            work_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_minutes: 45,
        }
    }
}

pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Zone reported by the operating system.
pub fn detect_host_timezone() -> Option<String> {
    iana_time_zone::get_timezone()
        .map_err(|e| warn!("Could not detect host timezone: {}", e))
        .ok()
}

/// Resolve the requested zone, falling back to the host zone once.
///
/// `host_zone` is consulted at most once and only when the requested zone is
/// missing or unrecognised. When neither validates the result is `None`.
pub fn resolve_timezone_with<F>(requested: Option<&str>, host_zone: F) -> Option<Tz>
where
    F: FnOnce() -> Option<String>,
{
    if let Some(tz) = requested.and_then(parse_timezone) {
        return Some(tz);
    }

    if let Some(name) = requested {
        warn!("Unrecognised timezone '{}', falling back to host timezone", name);
    }

    match host_zone() {
        Some(name) => {
            let tz = parse_timezone(&name);
            if tz.is_none() {
                warn!("Host timezone '{}' is not a valid IANA zone", name);
            }
            tz
        }
        None => None,
    }
}

/// Pure slot-grid builder. Output depends only on its inputs.
#[derive(Debug, Clone, Default)]
pub struct SlotGenerator {
    config: SlotGridConfig,
    host_timezone: Option<String>,
}

impl SlotGenerator {
    pub fn new(config: SlotGridConfig) -> Self {
        Self { config, host_timezone: None }
    }

    /// Use a fixed host zone instead of asking the operating system.
    pub fn with_host_timezone(mut self, host_timezone: Option<String>) -> Self {
        self.host_timezone = host_timezone;
        self
    }

    pub fn config(&self) -> &SlotGridConfig {
        &self.config
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.config.slot_minutes))
    }

    pub fn horizon(&self) -> Duration {
        Duration::days(i64::from(self.config.horizon_days))
    }

    pub fn resolve_timezone(&self, requested: Option<&str>) -> Option<Tz> {
        resolve_timezone_with(requested, || {
            self.host_timezone.clone().or_else(detect_host_timezone)
        })
    }

    /// Grid for the horizon starting at `now`, in the requested zone.
    pub fn generate(&self, now: DateTime<Utc>, requested_timezone: Option<&str>) -> SlotGrid {
        match self.resolve_timezone(requested_timezone) {
            Some(tz) => self.generate_in(now, tz),
            None => {
                warn!("No usable timezone for slot generation, returning an empty grid");
                SlotGrid::empty()
            }
        }
    }

    pub fn generate_in(&self, now: DateTime<Utc>, tz: Tz) -> SlotGrid {
        let today = now.with_timezone(&tz).date_naive();
        let duration = self.slot_duration();
        let mut days = Vec::new();

        if duration <= Duration::zero() {
            return SlotGrid { timezone: Some(tz.name().to_string()), days };
        }

        for offset in 0..self.config.horizon_days {
            let Some(date) = today.checked_add_days(Days::new(u64::from(offset))) else {
                break;
            };

            let mut slots = Vec::new();
            let mut start = self.config.work_start;
            loop {
                let (end, wrapped) = start.overflowing_add_signed(duration);
                if wrapped != 0 || end > self.config.work_end {
                    break;
                }
                if let Some(slot) = self.local_slot(&tz, date, start, now) {
                    slots.push(slot);
                }
                start = end;
            }

            if !slots.is_empty() {
                days.push(DaySlots { date, label: day_label(date), slots });
            }
        }

        debug!("Generated {} slot days in {}", days.len(), tz.name());
        SlotGrid { timezone: Some(tz.name().to_string()), days }
    }

    /// Whether `start_utc` begins a slot of the working-hours grid in `tz`.
    ///
    /// Of two instants sharing a repeated local time only the earlier counts.
    pub fn is_grid_start(&self, tz: &Tz, start_utc: DateTime<Utc>) -> bool {
        let duration = self.slot_duration();
        if duration <= Duration::zero() {
            return false;
        }

        let local = start_utc.with_timezone(tz);
        let offset = local.time().signed_duration_since(self.config.work_start);
        if offset < Duration::zero() || offset.num_seconds() % duration.num_seconds() != 0 {
            return false;
        }

        self.local_slot(tz, local.date_naive(), local.time(), DateTime::<Utc>::MIN_UTC)
            .map_or(false, |slot| slot.start_utc == start_utc)
    }

    /// Render known UTC start instants as a grid in `tz`, grouped by local day.
    pub fn render<I>(&self, tz: Tz, starts: I) -> SlotGrid
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let mut by_day: BTreeMap<NaiveDate, Vec<Slot>> = BTreeMap::new();

        for start_utc in starts {
            let slot = slot_at(&tz, start_utc, self.slot_duration());
            by_day.entry(slot.date).or_default().push(slot);
        }

        let days = by_day
            .into_iter()
            .map(|(date, mut slots)| {
                slots.sort_by_key(|slot| slot.start_utc);
                disambiguate_repeated_ids(&tz, &mut slots);
                DaySlots { date, label: day_label(date), slots }
            })
            .collect();

        SlotGrid { timezone: Some(tz.name().to_string()), days }
    }

    fn local_slot(&self, tz: &Tz, date: NaiveDate, start: NaiveTime, now: DateTime<Utc>) -> Option<Slot> {
        // Nonexistent local times (spring-forward gap) yield no slot.
        let start_local = tz.from_local_datetime(&date.and_time(start)).earliest()?;
        let start_utc = start_local.with_timezone(&Utc);
        let end_utc = start_utc + self.slot_duration();

        if end_utc <= now {
            return None;
        }

        let end_local = end_utc.with_timezone(tz);
        let inside_window = start_local.date_naive() == date
            && start_local.time() >= self.config.work_start
            && end_local.date_naive() == date
            && end_local.time() <= self.config.work_end;
        if !inside_window {
            return None;
        }

        Some(slot_at(tz, start_utc, self.slot_duration()))
    }
}

fn slot_at(tz: &Tz, start_utc: DateTime<Utc>, duration: Duration) -> Slot {
    let end_utc = start_utc + duration;
    let start_local = start_utc.with_timezone(tz);
    let end_local = end_utc.with_timezone(tz);
    let date = start_local.date_naive();
    let start_time = TimeSlot::from_time(start_local.time());

    Slot {
        id: format!("{}_{}", date.format("%Y-%m-%d"), start_time),
        label: format!(
            "{} - {}",
            start_local.format("%-I:%M %p"),
            end_local.format("%-I:%M %p")
        ),
        date,
        start_time,
        start_utc,
        end_utc,
    }
}

/// Fall-back hours repeat local times. Later repeats get the UTC offset appended.
fn disambiguate_repeated_ids(tz: &Tz, slots: &mut [Slot]) {
    let mut seen = HashSet::new();
    for slot in slots.iter_mut() {
        if !seen.insert(slot.id.clone()) {
            slot.id = format!("{}{}", slot.id, slot.start_utc.with_timezone(tz).format("%:z"));
            seen.insert(slot.id.clone());
        }
    }
}

fn day_label(date: NaiveDate) -> String {
    date.format("%a, %b %-d").to_string()
}
