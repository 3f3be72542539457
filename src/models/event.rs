use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::booking::BookingUpdate;
use super::slot::{wall_clock, Slot, SlotId};
use crate::errors::DecodeError;

/// A server push, already decoded into the shape the reconciler consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotEvent {
    SlotAdded(Slot),
    SlotDeleted(SlotId),
    BookingUpdate(BookingUpdate),
    SlotsCount {
        teacher_id: Option<String>,
        count: usize,
    },
    Error(String),
}

impl SlotEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SlotEvent::SlotAdded(_) => "slot_added",
            SlotEvent::SlotDeleted(_) => "slot_deleted",
            SlotEvent::BookingUpdate(_) => "booking_update",
            SlotEvent::SlotsCount { .. } => "slots_count",
            SlotEvent::Error(_) => "error",
        }
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: Frame = serde_json::from_str(text)?;
        frame.try_into()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum SlotAction {
    Added,
    Deleted,
}

fn default_error_message() -> String {
    "An error occurred".to_string()
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    BookingUpdate {
        booking: BookingUpdate,
    },
    SlotUpdate {
        #[serde(default)]
        action: Option<SlotAction>,
        #[serde(default)]
        slot: Option<Slot>,
        #[serde(default)]
        slot_id: Option<SlotId>,
    },
    SlotsCount {
        #[serde(default)]
        teacher_id: Option<String>,
        count: usize,
    },
    Error {
        #[serde(default = "default_error_message")]
        message: String,
    },
}

impl TryFrom<Frame> for SlotEvent {
    type Error = DecodeError;

    fn try_from(frame: Frame) -> Result<Self, DecodeError> {
        match frame {
            Frame::BookingUpdate { booking } => Ok(SlotEvent::BookingUpdate(booking)),
            // The backend omits `action` when broadcasting a freshly created slot.
            Frame::SlotUpdate {
                action: None | Some(SlotAction::Added),
                slot,
                ..
            } => slot
                .map(SlotEvent::SlotAdded)
                .ok_or(DecodeError::MissingField("slot")),
            Frame::SlotUpdate {
                action: Some(SlotAction::Deleted),
                slot,
                slot_id,
            } => slot_id
                .or_else(|| slot.map(|s| s.id))
                .map(SlotEvent::SlotDeleted)
                .ok_or(DecodeError::MissingField("slot_id")),
            Frame::SlotsCount { teacher_id, count } => {
                Ok(SlotEvent::SlotsCount { teacher_id, count })
            }
            Frame::Error { message } => Ok(SlotEvent::Error(message)),
        }
    }
}

/// Client to server requests over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    BookSlot {
        slot_id: SlotId,
        student_id: String,
    },
    AddSlot {
        id: SlotId,
        teacher_id: String,
        date: NaiveDate,
        #[serde(with = "wall_clock")]
        start_time: NaiveTime,
        #[serde(with = "wall_clock")]
        end_time: NaiveTime,
    },
}

impl ClientMessage {
    pub fn add_slot(slot: &Slot) -> Self {
        ClientMessage::AddSlot {
            id: slot.id.clone(),
            teacher_id: slot.teacher_id.clone(),
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;

    #[test]
    fn test_decode_booking_update() {
        let event = SlotEvent::decode(
            r#"{"type":"booking_update","booking":{"id":11,"slot_id":1,"student_id":"s-1","status":"pending"}}"#,
        )
        .unwrap();
        match event {
            SlotEvent::BookingUpdate(update) => {
                assert_eq!(update.slot_id, SlotId::Server(1));
                assert_eq!(update.status, BookingStatus::Pending);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_slot_update_without_action_is_added() {
        let event = SlotEvent::decode(
            r#"{"type":"slot_update","slot":{"id":42,"teacher_id":"t-1","date":"2024-06-02","start_time":"09:00:00","end_time":"10:00:00","is_booked":false}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "slot_added");
    }

    #[test]
    fn test_decode_slot_deleted() {
        let event =
            SlotEvent::decode(r#"{"type":"slot_update","action":"deleted","slot_id":5}"#).unwrap();
        assert_eq!(event, SlotEvent::SlotDeleted(SlotId::Server(5)));
    }

    #[test]
    fn test_decode_incomplete_frames() {
        assert!(matches!(
            SlotEvent::decode(r#"{"type":"slot_update","action":"deleted"}"#),
            Err(DecodeError::MissingField("slot_id"))
        ));
        assert!(matches!(
            SlotEvent::decode(r#"{"type":"slot_update","action":"added"}"#),
            Err(DecodeError::MissingField("slot"))
        ));
        assert!(matches!(
            SlotEvent::decode("not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(SlotEvent::decode(r#"{"type":"chat","text":"hi"}"#).is_err());
    }

    #[test]
    fn test_decode_count_and_error() {
        assert_eq!(
            SlotEvent::decode(r#"{"type":"slots_count","teacher_id":"t-1","count":4}"#).unwrap(),
            SlotEvent::SlotsCount {
                teacher_id: Some("t-1".into()),
                count: 4
            }
        );
        assert_eq!(
            SlotEvent::decode(r#"{"type":"error"}"#).unwrap(),
            SlotEvent::Error("An error occurred".into())
        );
    }

    #[test]
    fn test_encode_book_slot() {
        let msg = ClientMessage::BookSlot {
            slot_id: SlotId::Server(1),
            student_id: "S".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"action": "book_slot", "slot_id": 1, "student_id": "S"})
        );
    }

    #[test]
    fn test_encode_add_slot() {
        let slot = crate::models::SlotDraft::parse("2024-06-02", "09:00", "10:00")
            .unwrap()
            .into_slot(SlotId::Temp("temp_123".into()), "t-1");
        let value = serde_json::to_value(ClientMessage::add_slot(&slot)).unwrap();
        assert_eq!(value["action"], "add_slot");
        assert_eq!(value["id"], "temp_123");
        assert_eq!(value["date"], "2024-06-02");
        assert_eq!(value["start_time"], "09:00");
    }
}
