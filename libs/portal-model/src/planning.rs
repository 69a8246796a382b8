//! Layers, plannings and schedules driving downlink commands
//!
//! A layer groups devices and may carry a planning; layers without one
//! inherit the planning of their nearest ancestor. A planning is active over
//! an inclusive date range and owns time-of-day schedules, each tied to a
//! command.

use bitflags::bitflags;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use errors::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

bitflags! {
    /// Days on which a planning switches to its day-off command
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DaysOff: u8 {
        const MONDAY = 1;
        const TUESDAY = 1 << 1;
        const WEDNESDAY = 1 << 2;
        const THURSDAY = 1 << 3;
        const FRIDAY = 1 << 4;
        const SATURDAY = 1 << 5;
        const SUNDAY = 1 << 6;
    }
}

impl DaysOff {
    pub fn from_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::MONDAY,
            Weekday::Tue => Self::TUESDAY,
            Weekday::Wed => Self::WEDNESDAY,
            Weekday::Thu => Self::THURSDAY,
            Weekday::Fri => Self::FRIDAY,
            Weekday::Sat => Self::SATURDAY,
            Weekday::Sun => Self::SUNDAY,
        }
    }

    pub fn includes(&self, day: Weekday) -> bool {
        self.contains(Self::from_weekday(day))
    }
}

/// Minutes since midnight, `24:00` allowed as an end bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(24 * 60);

    pub fn new(hour: u32, minute: u32) -> PortalResult<Self> {
        if minute >= 60 || hour > 24 || (hour == 24 && minute != 0) {
            return Err(PortalError::Validation(format!(
                "Invalid time of day {:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self((hour * 60 + minute) as u16))
    }

    /// Parse `HH:MM` (seconds in `HH:MM:SS` are ignored)
    pub fn parse(value: &str) -> PortalResult<Self> {
        let invalid = || PortalError::Validation(format!("Invalid time of day '{}'", value));
        let mut parts = value.trim().split(':');
        let hour = parts
            .next()
            .and_then(|h| h.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let minute = parts
            .next()
            .and_then(|m| m.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        if let Some(seconds) = parts.next() {
            seconds.parse::<u32>().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Self::new(hour, minute)
    }

    pub fn of(datetime: &NaiveDateTime) -> Self {
        Self((datetime.hour() * 60 + datetime.minute()) as u16)
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    /// Parent layer
    pub father: Option<String>,
    pub planning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planning {
    pub id: String,
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub day_off: DaysOff,
    /// Command sent on days off
    pub command_id: Option<String>,
}

impl Planning {
    /// Inclusive on both ends
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_day_off(&self, date: NaiveDate) -> bool {
        self.day_off.includes(date.weekday())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub planning_id: String,
    #[serde(with = "time_of_day_serde")]
    pub start: TimeOfDay,
    #[serde(with = "time_of_day_serde")]
    pub end: TimeOfDay,
    pub command_id: String,
}

impl Schedule {
    /// Start inclusive, end exclusive
    pub fn is_open_at(&self, time: TimeOfDay) -> bool {
        self.start <= time && time < self.end
    }
}

mod time_of_day_serde {
    use super::TimeOfDay;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &TimeOfDay, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeOfDay, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeOfDay::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Planning that applies to a layer, walking up through `father` links
///
/// Returns `None` when neither the layer nor any ancestor has a planning, or
/// when the parent chain loops.
pub fn effective_planning<'a>(layers: &'a HashMap<String, Layer>, layer_id: &str) -> Option<&'a str> {
    let mut visited = HashSet::new();
    let mut current = layers.get(layer_id)?;
    loop {
        if !visited.insert(current.id.as_str()) {
            tracing::warn!("Layer cycle at {}", current.id);
            return None;
        }
        if let Some(planning) = current.planning.as_deref().filter(|p| !p.is_empty()) {
            return Some(planning);
        }
        let father = current.father.as_deref()?;
        current = layers.get(father)?;
    }
}

/// Command IDs a planning wants dispatched at `now`
///
/// On a day off the planning's own command replaces the schedules when it
/// has one.
pub fn due_commands(planning: &Planning, schedules: &[Schedule], now: NaiveDateTime) -> Vec<String> {
    let today = now.date();
    if !planning.is_active_on(today) {
        return Vec::new();
    }

    if planning.is_day_off(today) {
        if let Some(command_id) = planning.command_id.as_deref().filter(|c| !c.is_empty()) {
            return vec![command_id.to_string()];
        }
    }

    let time = TimeOfDay::of(&now);
    schedules
        .iter()
        .filter(|s| s.planning_id == planning.id && s.is_open_at(time))
        .map(|s| s.command_id.clone())
        .collect()
}
