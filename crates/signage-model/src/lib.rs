//! Image records, the eligibility predicate, and playlist ordering.
//!
//! Everything here is pure: callers pass the evaluation instant in the
//! device's local wall-clock time and get a deterministic answer back.

use std::fmt;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub use image::{Image, Ineligible};
pub use playlist::{Playlist, PlaylistEntry};
pub use schedule::{ClockTime, DayToken, DisplaySchedule, ExpiryDate, MIN_DURATION, WEEKDAY_TOKENS};

mod schedule {
    use super::*;

    /// Shortest on-screen time any playlist entry is granted.
    pub const MIN_DURATION: Duration = Duration::from_secs(1);

    /// Weekday tokens in `chrono` order starting from Sunday.
    pub const WEEKDAY_TOKENS: [(&str, Weekday); 7] = [
        ("Sun", Weekday::Sun),
        ("Mon", Weekday::Mon),
        ("Tue", Weekday::Tue),
        ("Wed", Weekday::Wed),
        ("Thu", Weekday::Thu),
        ("Fri", Weekday::Fri),
        ("Sat", Weekday::Sat),
    ];

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DisplaySchedule {
        pub start_time: ClockTime,
        pub end_time: ClockTime,
        #[serde(default)]
        pub repeat_days: Vec<DayToken>,
        #[serde(default)]
        pub every_day: bool,
        #[serde(default, deserialize_with = "lenient_seconds")]
        pub duration_sec: i64,
    }

    /// Whole seconds from an integer, a float, a numeric string or `null`.
    /// Text that is not a number becomes 0, which the playlist clamps.
    fn lenient_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        let truncate = |secs: f64| if secs.is_finite() { secs.trunc() as i64 } else { 0 };
        let raw: Option<Raw> = Option::deserialize(deserializer)?;
        Ok(match raw {
            Some(Raw::Int(secs)) => secs,
            Some(Raw::Float(secs)) => truncate(secs),
            Some(Raw::Text(text)) => text.trim().parse::<f64>().map_or(0, truncate),
            None => 0,
        })
    }

    impl DisplaySchedule {
        pub fn matches_day(&self, weekday: Weekday) -> bool {
            self.every_day
                || self
                    .repeat_days
                    .iter()
                    .any(|day| day.weekday() == Some(weekday))
        }

        /// Inclusive on both ends. A window that cannot be parsed or runs
        /// backwards contains nothing.
        pub fn contains_time(&self, time: NaiveTime) -> bool {
            self.window_check(time).is_ok()
        }

        pub(crate) fn window_check(&self, time: NaiveTime) -> Result<(), Ineligible> {
            let (Some(start), Some(end)) = (
                self.start_time.seconds_from_midnight(),
                self.end_time.seconds_from_midnight(),
            ) else {
                return Err(Ineligible::MalformedWindow);
            };
            if start > end {
                return Err(Ineligible::InvertedWindow);
            }
            let now = time.num_seconds_from_midnight();
            if now < start || now > end {
                return Err(Ineligible::OutsideWindow);
            }
            Ok(())
        }

        /// `duration_sec` clamped to `minimum` (never below [`MIN_DURATION`]).
        pub fn effective_duration(&self, minimum: Duration) -> Duration {
            let secs = u64::try_from(self.duration_sec).unwrap_or(0);
            Duration::from_secs(secs).max(minimum.max(MIN_DURATION))
        }
    }

    /// Time of day as stored in the record. Unparseable input is kept
    /// verbatim so the collection can be written back unchanged.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ClockTime {
        Valid(NaiveTime),
        Malformed(String),
    }

    impl ClockTime {
        pub fn parse(raw: &str) -> Self {
            let trimmed = raw.trim();
            for format in ["%H:%M:%S", "%H:%M"] {
                if let Ok(parsed) = NaiveTime::parse_from_str(trimmed, format) {
                    return Self::Valid(parsed);
                }
            }
            Self::Malformed(raw.to_string())
        }

        pub fn time(&self) -> Option<NaiveTime> {
            match self {
                Self::Valid(time) => Some(*time),
                Self::Malformed(_) => None,
            }
        }

        pub fn seconds_from_midnight(&self) -> Option<u32> {
            self.time().map(|time| time.num_seconds_from_midnight())
        }
    }

    impl From<NaiveTime> for ClockTime {
        fn from(time: NaiveTime) -> Self {
            Self::Valid(time)
        }
    }

    impl fmt::Display for ClockTime {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Valid(time) => write!(f, "{}", time.format("%H:%M:%S")),
                Self::Malformed(raw) => f.write_str(raw),
            }
        }
    }

    impl Serialize for ClockTime {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for ClockTime {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = String::deserialize(deserializer)?;
            Ok(Self::parse(&raw))
        }
    }

    /// First calendar day on which an image is no longer shown; it stays
    /// eligible through the whole of the day before.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ExpiryDate {
        Valid(NaiveDate),
        Malformed(String),
    }

    impl ExpiryDate {
        /// Accepts `YYYY-MM-DD`, optionally followed by a `T…` time suffix
        /// which is discarded.
        pub fn parse(raw: &str) -> Self {
            let trimmed = raw.trim();
            let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
            match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
                Ok(date) => Self::Valid(date),
                Err(_) => Self::Malformed(raw.to_string()),
            }
        }

        pub fn date(&self) -> Option<NaiveDate> {
            match self {
                Self::Valid(date) => Some(*date),
                Self::Malformed(_) => None,
            }
        }

        pub(crate) fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<Self>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            Ok(raw
                .filter(|value| !value.trim().is_empty())
                .map(|value| Self::parse(&value)))
        }
    }

    impl From<NaiveDate> for ExpiryDate {
        fn from(date: NaiveDate) -> Self {
            Self::Valid(date)
        }
    }

    impl fmt::Display for ExpiryDate {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Valid(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                Self::Malformed(raw) => f.write_str(raw),
            }
        }
    }

    impl Serialize for ExpiryDate {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for ExpiryDate {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = String::deserialize(deserializer)?;
            Ok(Self::parse(&raw))
        }
    }

    /// Entry of `repeat_days`. Tokens outside the fixed set are carried
    /// along but never match a day.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DayToken {
        Day(Weekday),
        Unknown(String),
    }

    impl DayToken {
        pub fn parse(raw: &str) -> Self {
            WEEKDAY_TOKENS
                .iter()
                .find(|(token, _)| *token == raw)
                .map(|(_, weekday)| Self::Day(*weekday))
                .unwrap_or_else(|| Self::Unknown(raw.to_string()))
        }

        pub fn weekday(&self) -> Option<Weekday> {
            match self {
                Self::Day(weekday) => Some(*weekday),
                Self::Unknown(_) => None,
            }
        }

        pub fn token_for(weekday: Weekday) -> &'static str {
            WEEKDAY_TOKENS[weekday.num_days_from_sunday() as usize].0
        }
    }

    impl From<Weekday> for DayToken {
        fn from(weekday: Weekday) -> Self {
            Self::Day(weekday)
        }
    }

    impl fmt::Display for DayToken {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Day(weekday) => f.write_str(Self::token_for(*weekday)),
                Self::Unknown(raw) => f.write_str(raw),
            }
        }
    }

    impl Serialize for DayToken {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for DayToken {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = String::deserialize(deserializer)?;
            Ok(Self::parse(&raw))
        }
    }
}

mod image {
    use super::*;

    /// A scheduled display unit.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Image {
        pub id: u64,
        pub url: String,
        #[serde(default, deserialize_with = "ExpiryDate::deserialize_optional")]
        pub expiry_date: Option<ExpiryDate>,
        pub display_schedule: DisplaySchedule,
    }

    /// First check an image failed when evaluated at some instant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Ineligible {
        Expired,
        MalformedExpiry,
        OffDay,
        MalformedWindow,
        InvertedWindow,
        OutsideWindow,
    }

    impl fmt::Display for Ineligible {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(match self {
                Self::Expired => "expired",
                Self::MalformedExpiry => "unreadable expiry date",
                Self::OffDay => "not scheduled today",
                Self::MalformedWindow => "unreadable time window",
                Self::InvertedWindow => "window ends before it starts",
                Self::OutsideWindow => "outside time window",
            })
        }
    }

    impl Image {
        /// Runs the expiry, day and time-window checks in that order and
        /// reports the first one that fails.
        pub fn ineligibility(&self, now: NaiveDateTime) -> Option<Ineligible> {
            match &self.expiry_date {
                Some(ExpiryDate::Valid(expiry)) if *expiry <= now.date() => {
                    return Some(Ineligible::Expired);
                }
                Some(ExpiryDate::Malformed(_)) => return Some(Ineligible::MalformedExpiry),
                _ => {}
            }
            if !self.display_schedule.matches_day(now.weekday()) {
                return Some(Ineligible::OffDay);
            }
            self.display_schedule.window_check(now.time()).err()
        }

        pub fn is_eligible_at(&self, now: NaiveDateTime) -> bool {
            self.ineligibility(now).is_none()
        }
    }
}

mod playlist {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PlaylistEntry {
        pub image: Image,
        pub duration: Duration,
    }

    /// Images eligible at one instant, ascending by id.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Playlist {
        entries: Vec<PlaylistEntry>,
    }

    impl Playlist {
        pub fn build(snapshot: &[Image], now: NaiveDateTime, minimum: Duration) -> Self {
            let mut entries: Vec<PlaylistEntry> = snapshot
                .iter()
                .filter(|image| image.is_eligible_at(now))
                .map(|image| PlaylistEntry {
                    duration: image.display_schedule.effective_duration(minimum),
                    image: image.clone(),
                })
                .collect();
            entries.sort_by_key(|entry| entry.image.id);
            Self { entries }
        }

        pub fn len(&self) -> usize {
            self.entries.len()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }

        pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
            self.entries.get(index)
        }

        pub fn entries(&self) -> &[PlaylistEntry] {
            &self.entries
        }

        pub fn ids(&self) -> Vec<u64> {
            self.entries.iter().map(|entry| entry.image.id).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    fn image(id: u64, start: &str, end: &str) -> Image {
        Image {
            id,
            url: format!("https://cdn.example/{id}.jpg"),
            expiry_date: None,
            display_schedule: DisplaySchedule {
                start_time: ClockTime::parse(start),
                end_time: ClockTime::parse(end),
                repeat_days: Vec::new(),
                every_day: true,
                duration_sec: 10,
            },
        }
    }

    // 2024-01-03 is a Wednesday.
    const WED: (i32, u32, u32) = (2024, 1, 3);

    #[test]
    fn expired_images_are_never_eligible() {
        let mut img = image(1, "00:00:00", "23:59:59");
        img.expiry_date = Some(ExpiryDate::parse("2024-01-03"));
        assert!(img.is_eligible_at(at(2024, 1, 2, 23, 59, 59)));
        for moment in [
            at(2024, 1, 3, 0, 0, 0),
            at(2024, 1, 3, 12, 0, 0),
            at(2024, 1, 4, 12, 0, 0),
        ] {
            assert_eq!(
                img.ineligibility(moment),
                Some(Ineligible::Expired),
                "{moment}"
            );
        }
    }

    #[test]
    fn expiry_with_time_suffix_uses_date_part() {
        assert_eq!(
            ExpiryDate::parse("2024-05-01T00:00:00.000Z").date(),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        let mut img = image(1, "00:00:00", "23:59:59");
        img.expiry_date = Some(ExpiryDate::parse("soon"));
        assert_eq!(
            img.ineligibility(at(2024, 1, 1, 12, 0, 0)),
            Some(Ineligible::MalformedExpiry)
        );
    }

    #[test]
    fn every_day_bypasses_repeat_days() {
        let mut img = image(1, "00:00:00", "23:59:59");
        img.display_schedule.repeat_days = vec![DayToken::parse("Mon")];
        for day in 1..=7 {
            assert!(img.is_eligible_at(at(2024, 1, day, 12, 0, 0)));
        }
    }

    #[test]
    fn repeat_days_only_match_listed_weekdays() {
        let mut img = image(1, "00:00:00", "23:59:59");
        img.display_schedule.every_day = false;
        img.display_schedule.repeat_days = vec![DayToken::parse("Wed")];
        for day in 1..=7 {
            let eligible = img.is_eligible_at(at(2024, 1, day, 12, 0, 0));
            assert_eq!(eligible, day == WED.2, "day {day}");
        }
    }

    #[test]
    fn unknown_day_tokens_are_ignored() {
        let mut img = image(1, "00:00:00", "23:59:59");
        img.display_schedule.every_day = false;
        img.display_schedule.repeat_days =
            vec![DayToken::parse("Wednesday"), DayToken::parse("wed")];
        assert_eq!(
            img.ineligibility(at(WED.0, WED.1, WED.2, 12, 0, 0)),
            Some(Ineligible::OffDay)
        );
    }

    #[test]
    fn time_window_is_inclusive() {
        let img = image(1, "08:00:00", "20:00:00");
        let (y, m, d) = WED;
        assert!(img.is_eligible_at(at(y, m, d, 8, 0, 0)));
        assert!(img.is_eligible_at(at(y, m, d, 20, 0, 0)));
        assert!(!img.is_eligible_at(at(y, m, d, 7, 59, 59)));
        assert!(!img.is_eligible_at(at(y, m, d, 20, 0, 1)));
    }

    #[test]
    fn overnight_and_malformed_windows_never_match() {
        let (y, m, d) = WED;
        let overnight = image(1, "22:00:00", "02:00:00");
        assert_eq!(
            overnight.ineligibility(at(y, m, d, 23, 0, 0)),
            Some(Ineligible::InvertedWindow)
        );
        let garbled = image(2, "8 o'clock", "20:00:00");
        assert_eq!(
            garbled.ineligibility(at(y, m, d, 12, 0, 0)),
            Some(Ineligible::MalformedWindow)
        );
    }

    #[test]
    fn short_time_form_is_accepted() {
        let img = image(1, "08:00", "20:00");
        assert_eq!(img.display_schedule.start_time.to_string(), "08:00:00");
        assert!(img.is_eligible_at(at(2024, 1, 3, 20, 0, 0)));
    }

    #[test]
    fn playlist_sorts_by_id() {
        let snapshot = vec![
            image(3, "00:00:00", "23:59:59"),
            image(1, "00:00:00", "23:59:59"),
            image(2, "00:00:00", "23:59:59"),
        ];
        let now = at(2024, 1, 3, 12, 0, 0);
        let playlist = Playlist::build(&snapshot, now, MIN_DURATION);
        assert_eq!(playlist.ids(), vec![1, 2, 3]);
        assert_eq!(playlist, Playlist::build(&snapshot, now, MIN_DURATION));
    }

    #[test]
    fn playlist_drops_ineligible_and_clamps_duration() {
        let mut zero = image(5, "00:00:00", "23:59:59");
        zero.display_schedule.duration_sec = 0;
        let mut negative = image(4, "00:00:00", "23:59:59");
        negative.display_schedule.duration_sec = -30;
        let late = image(6, "21:00:00", "22:00:00");
        let playlist = Playlist::build(
            &[zero, negative, late],
            at(2024, 1, 3, 12, 0, 0),
            Duration::from_secs(2),
        );
        assert_eq!(playlist.ids(), vec![4, 5]);
        assert!(
            playlist
                .entries()
                .iter()
                .all(|entry| entry.duration == Duration::from_secs(2))
        );
    }

    #[test]
    fn loose_durations_are_read_and_clamped() {
        let record = |duration: &str| {
            format!(
                r#"{{"id": 1, "url": "a.jpg", "display_schedule": {{
                    "start_time": "00:00", "end_time": "23:59",
                    "every_day": true, "duration_sec": {duration}}}}}"#
            )
        };
        let cases = [("null", 0), ("\"15\"", 15), ("12.7", 12), ("\"\"", 0), ("-4", -4)];
        for (raw, expected) in cases {
            let image: Image = serde_json::from_str(&record(raw)).expect(raw);
            assert_eq!(image.display_schedule.duration_sec, expected, "{raw}");
        }

        let missing = r#"{"id": 1, "url": "a.jpg", "display_schedule": {
            "start_time": "00:00", "end_time": "23:59", "every_day": true}}"#;
        let image: Image = serde_json::from_str(missing).unwrap();
        assert_eq!(
            image.display_schedule.effective_duration(MIN_DURATION),
            MIN_DURATION
        );

        assert!(serde_json::from_str::<Image>(&record("true")).is_err());
    }

    #[test]
    fn parses_stored_record_format() {
        let json = r#"[
            {
                "id": 7,
                "url": "https://cdn.example/promo.png",
                "expiry_date": null,
                "display_schedule": {
                    "start_time": "08:00:00",
                    "end_time": "20:00:00",
                    "repeat_days": ["Mon", "Fri", "Someday"],
                    "every_day": false,
                    "duration_sec": 15
                }
            },
            {
                "id": 8,
                "url": "https://cdn.example/sale.png",
                "expiry_date": "",
                "display_schedule": {
                    "start_time": "garbage",
                    "end_time": "20:00:00",
                    "repeat_days": [],
                    "every_day": true,
                    "duration_sec": 5
                }
            }
        ]"#;
        let images: Vec<Image> = serde_json::from_str(json).expect("valid records");
        assert_eq!(images.len(), 2);
        let schedule = &images[0].display_schedule;
        assert!(schedule.matches_day(Weekday::Fri));
        assert!(!schedule.matches_day(Weekday::Sat));
        assert_eq!(schedule.repeat_days[2], DayToken::Unknown("Someday".into()));
        assert_eq!(images[1].expiry_date, None);

        // Malformed values are written back as they were read.
        let written = serde_json::to_value(&images[1]).expect("serializable");
        assert_eq!(written["display_schedule"]["start_time"], "garbage");
        assert!(written["expiry_date"].is_null());
    }
}
