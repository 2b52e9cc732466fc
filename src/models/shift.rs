use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub type ShiftId = String;

/// A local time of day parsed from an `HH:MM` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShiftTime(NaiveTime);

impl ShiftTime {
    pub fn new(inner: NaiveTime) -> Self {
        let normalized_time = inner
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(inner);
        Self(normalized_time)
    }

    /// Parses `HH:MM`. Anything else, including an empty string, yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        NaiveTime::parse_from_str(value, "%H:%M").ok().map(Self::new)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minutes_from_midnight(&self) -> i64 {
        i64::from(self.0.num_seconds_from_midnight() / 60)
    }
}

/// A recurring weekly work pattern as defined by the shift editor.
///
/// Times are kept in their edited `HH:MM` form; the timing calculator parses
/// them and treats malformed values as missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: ShiftId,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub office_end_time: String,
    pub departure_time: String,
    #[serde(with = "weekday_codes")]
    pub days_applied: Vec<Weekday>,
    #[serde(default)]
    pub break_minutes: u32,
    #[serde(default)]
    pub remind_before_start: u32,
    #[serde(default)]
    pub remind_after_end: u32,
    #[serde(default)]
    pub is_active: bool,
}

impl Shift {
    pub fn applies_on(&self, weekday: Weekday) -> bool {
        self.days_applied.contains(&weekday)
    }

    pub fn start(&self) -> Option<ShiftTime> {
        ShiftTime::parse(&self.start_time)
    }

    /// End of the shift, falling back to the office end time.
    pub fn end(&self) -> Option<ShiftTime> {
        ShiftTime::parse(&self.end_time).or_else(|| ShiftTime::parse(&self.office_end_time))
    }

    pub fn office_end(&self) -> Option<ShiftTime> {
        ShiftTime::parse(&self.office_end_time).or_else(|| ShiftTime::parse(&self.end_time))
    }

    /// Departure time, falling back to the start time.
    pub fn departure(&self) -> Option<ShiftTime> {
        ShiftTime::parse(&self.departure_time).or_else(|| self.start())
    }

    pub fn is_overnight(&self) -> bool {
        matches!((self.start(), self.end()), (Some(start), Some(end)) if end < start)
    }

    /// Minutes between start and office end minus the break, never negative.
    pub fn office_work_minutes(&self) -> Option<i64> {
        let start = self.start()?.minutes_from_midnight();
        let mut office_end = self.office_end()?.minutes_from_midnight();
        if office_end < start {
            office_end += 24 * 60;
        }

        Some((office_end - start - i64::from(self.break_minutes)).max(0))
    }
}

mod weekday_codes {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    pub fn serialize<S: Serializer>(days: &[Weekday], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(days.len()))?;
        for day in days {
            seq.serialize_element(&day.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Weekday>, D::Error> {
        let codes = Vec::<String>::deserialize(deserializer)?;
        codes
            .iter()
            .map(|code| {
                code.parse::<Weekday>()
                    .map_err(|_| D::Error::custom(format!("unknown weekday code {code:?}")))
            })
            .collect()
    }
}
