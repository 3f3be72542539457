use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::SlotError;

pub const TEMP_ID_PREFIX: &str = "temp_";

/// Server ids are integers. Until the server confirms a locally created slot
/// it carries a `temp_` prefixed string id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotId {
    Server(i64),
    Temp(String),
}

impl SlotId {
    pub fn temporary() -> Self {
        SlotId::Temp(format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, SlotId::Temp(s) if s.starts_with(TEMP_ID_PREFIX))
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::Server(id) => write!(f, "{id}"),
            SlotId::Temp(id) => f.write_str(id),
        }
    }
}

impl From<i64> for SlotId {
    fn from(id: i64) -> Self {
        SlotId::Server(id)
    }
}

impl Serialize for SlotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SlotId::Server(id) => serializer.serialize_i64(*id),
            SlotId::Temp(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for SlotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(id) => SlotId::Server(id),
            Raw::Text(s) => match s.parse::<i64>() {
                Ok(id) => SlotId::Server(id),
                Err(_) => SlotId::Temp(s),
            },
        })
    }
}

/// Wall-clock times travel as `HH:MM:SS` from the server and `HH:MM` from
/// the client. Both decode; encoding always uses `HH:MM`.
pub mod wall_clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            time: &Option<NaiveTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => super::serialize(t, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveTime>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// The calendar position of a slot, ignoring its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotSpan {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    #[serde(default)]
    pub teacher_id: String,
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub is_booked: bool,
}

impl Slot {
    pub fn order_key(&self) -> (NaiveDate, NaiveTime) {
        (self.date, self.start_time)
    }

    pub fn span(&self) -> SlotSpan {
        SlotSpan {
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    pub fn same_span(&self, other: &Slot) -> bool {
        self.span() == other.span()
    }

    pub fn is_temporary(&self) -> bool {
        self.id.is_temporary()
    }
}

/// A teacher-entered slot before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDraft {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SlotDraft {
    pub fn parse(date: &str, start: &str, end: &str) -> Result<Self, SlotError> {
        if date.trim().is_empty() {
            return Err(SlotError::MissingField("date"));
        }
        if start.trim().is_empty() {
            return Err(SlotError::MissingField("start_time"));
        }
        if end.trim().is_empty() {
            return Err(SlotError::MissingField("end_time"));
        }

        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| SlotError::InvalidDate(date.to_string()))?;
        let start_time = parse_hh_mm(start.trim())?;
        let end_time = parse_hh_mm(end.trim())?;

        if end_time <= start_time {
            return Err(SlotError::EndBeforeStart);
        }

        Ok(Self {
            date,
            start_time,
            end_time,
        })
    }

    pub fn into_slot(self, id: SlotId, teacher_id: &str) -> Slot {
        Slot {
            id,
            teacher_id: teacher_id.to_string(),
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            is_booked: false,
        }
    }
}

fn parse_hh_mm(s: &str) -> Result<NaiveTime, SlotError> {
    let invalid = || SlotError::InvalidTime(s.to_string());

    let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return Err(invalid());
    }
    if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_server_slot() {
        let json = r#"{"id":7,"date":"2024-06-01","start_time":"10:00:00","end_time":"11:00:00","is_booked":false}"#;
        let slot: Slot = serde_json::from_str(json).unwrap();
        assert_eq!(slot.id, SlotId::Server(7));
        assert_eq!(slot.teacher_id, "");
        assert_eq!(slot.start_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert!(!slot.is_temporary());
    }

    #[test]
    fn test_decode_temp_slot_with_short_times() {
        let json = r#"{"id":"temp_123","teacher_id":"t-1","date":"2024-06-02","start_time":"09:00","end_time":"10:00"}"#;
        let slot: Slot = serde_json::from_str(json).unwrap();
        assert_eq!(slot.id, SlotId::Temp("temp_123".into()));
        assert!(slot.is_temporary());
        assert!(!slot.is_booked);
    }

    #[test]
    fn test_numeric_string_id_is_server_id() {
        let id: SlotId = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(id, SlotId::Server(42));
    }

    #[test]
    fn test_encode_uses_short_times() {
        let slot = SlotDraft::parse("2024-06-02", "09:00", "10:30")
            .unwrap()
            .into_slot(SlotId::Server(1), "t-1");
        let value = serde_json::to_value(&slot).unwrap();
        assert_eq!(value["start_time"], "09:00");
        assert_eq!(value["end_time"], "10:30");
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_temporary_ids_are_unique() {
        let a = SlotId::temporary();
        let b = SlotId::temporary();
        assert!(a.is_temporary());
        assert_ne!(a, b);
    }

    #[test]
    fn test_draft_rejects_bad_input() {
        assert_eq!(
            SlotDraft::parse("", "09:00", "10:00"),
            Err(SlotError::MissingField("date"))
        );
        assert!(matches!(
            SlotDraft::parse("2024-06-02", "25:00", "26:00"),
            Err(SlotError::InvalidTime(_))
        ));
        assert!(matches!(
            SlotDraft::parse("2024-06-02", "9am", "10:00"),
            Err(SlotError::InvalidTime(_))
        ));
        assert_eq!(
            SlotDraft::parse("2024-06-02", "10:00", "10:00"),
            Err(SlotError::EndBeforeStart)
        );
        assert!(SlotDraft::parse("2024-06-02", "9:30", "10:00").is_ok());
    }

    #[test]
    fn test_draft_rejects_signed_times() {
        for start in ["+9:30", "-1:30", "9:+3"] {
            assert_eq!(
                SlotDraft::parse("2024-06-02", start, "10:00"),
                Err(SlotError::InvalidTime(start.to_string())),
                "{start} should be rejected"
            );
        }
    }
}
