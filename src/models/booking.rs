use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::time::Instant;

use super::slot::{wall_clock, SlotId};

/// A student's booking as returned by get-student-bookings, joined with the
/// slot and teacher display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub slot_id: SlotId,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "wall_clock::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "wall_clock::option")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

// The backend stores payment status as a boolean flag.
impl<'de> Deserialize<'de> for PaymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => PaymentStatus::Paid,
            Raw::Flag(false) => PaymentStatus::Unpaid,
            Raw::Text(s) if s == "paid" => PaymentStatus::Paid,
            Raw::Text(_) => PaymentStatus::Unpaid,
        })
    }
}

/// Payload of a `booking_update` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingUpdate {
    #[serde(default)]
    pub id: Option<i64>,
    pub slot_id: SlotId,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub status: BookingStatus,
}

/// The one booking attempt a student session may have in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBooking {
    pub slot_id: SlotId,
    pub requested_at: Instant,
}
