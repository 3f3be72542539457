use chrono::NaiveDate;

use crate::config::ClientConfig;
use crate::errors::ApiError;
use crate::models::{Role, Slot};
use crate::services::api::{BookingApi, SlotQuery};
use crate::services::reconciler::SlotSnapshot;

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn stamp(slots: &mut [Slot], teacher_id: &str) {
    for slot in slots.iter_mut() {
        slot.teacher_id = teacher_id.to_string();
    }
}

fn sort(slots: &mut [Slot]) {
    slots.sort_by_key(|s| s.order_key());
}

/// Every open slot from `today` on.
pub async fn fetch_open_slots(
    api: &dyn BookingApi,
    teacher_id: &str,
    limit: u32,
    today: NaiveDate,
) -> Result<Vec<Slot>, ApiError> {
    let query = SlotQuery {
        teacher_id: teacher_id.to_string(),
        limit,
        include_all: Some(true),
        date: None,
    };
    let mut slots: Vec<Slot> = api
        .teacher_slots(&query)
        .await?
        .into_iter()
        .filter(|s| !s.is_booked && s.date >= today)
        .collect();
    stamp(&mut slots, teacher_id);
    sort(&mut slots);
    Ok(slots)
}

/// Open slots on one date.
pub async fn fetch_available_slots(
    api: &dyn BookingApi,
    teacher_id: &str,
    date: NaiveDate,
    limit: u32,
) -> Result<Vec<Slot>, ApiError> {
    let query = SlotQuery {
        teacher_id: teacher_id.to_string(),
        limit,
        include_all: None,
        date: Some(date),
    };
    let mut slots: Vec<Slot> = api
        .teacher_slots(&query)
        .await?
        .into_iter()
        .filter(|s| !s.is_booked && s.date == date)
        .collect();
    stamp(&mut slots, teacher_id);
    sort(&mut slots);
    Ok(slots)
}

/// A teacher's own schedule split into `(open, booked)`.
pub async fn fetch_schedule(
    api: &dyn BookingApi,
    teacher_id: &str,
    limit: u32,
) -> Result<(Vec<Slot>, Vec<Slot>), ApiError> {
    let query = SlotQuery {
        teacher_id: teacher_id.to_string(),
        limit,
        include_all: None,
        date: None,
    };
    let mut slots = api.teacher_slots(&query).await?;
    stamp(&mut slots, teacher_id);
    sort(&mut slots);
    Ok(slots.into_iter().partition(|s| !s.is_booked))
}

/// One pull pass for the role's view of `teacher_id`.
pub async fn fetch_snapshot(
    api: &dyn BookingApi,
    role: Role,
    teacher_id: &str,
    date: Option<NaiveDate>,
    config: &ClientConfig,
) -> Result<SlotSnapshot, ApiError> {
    let (open, booked) = match role {
        Role::Student => (
            fetch_open_slots(api, teacher_id, config.slot_fetch_limit, today()).await?,
            Vec::new(),
        ),
        Role::Teacher => fetch_schedule(api, teacher_id, config.schedule_fetch_limit).await?,
    };

    let available = match date {
        Some(date) => fetch_available_slots(api, teacher_id, date, config.slot_fetch_limit).await?,
        None => Vec::new(),
    };

    Ok(SlotSnapshot {
        teacher_id: teacher_id.to_string(),
        open,
        booked,
        date,
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApiAck, Booking, CreateOrder, PaymentOrder, PaymentVerification, Profile, ProfileUpdate,
        SlotId, Teacher,
    };
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::Mutex;

    struct FixedSlots {
        slots: Vec<Slot>,
        queries: Mutex<Vec<SlotQuery>>,
    }

    #[async_trait]
    impl BookingApi for FixedSlots {
        async fn list_teachers(&self) -> Result<Vec<Teacher>, ApiError> {
            Ok(vec![])
        }

        async fn teacher_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, ApiError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.slots.clone())
        }

        async fn student_bookings(&self, _student_id: &str) -> Result<Vec<Booking>, ApiError> {
            Ok(vec![])
        }

        async fn get_profile(&self, _role: Role, _user_id: &str) -> Result<Profile, ApiError> {
            Err(ApiError::Rejected("unused".into()))
        }

        async fn update_profile(&self, _role: Role, _update: &ProfileUpdate) -> Result<ApiAck, ApiError> {
            Err(ApiError::Rejected("unused".into()))
        }

        async fn create_payment_order(&self, _order: &CreateOrder) -> Result<PaymentOrder, ApiError> {
            Err(ApiError::Rejected("unused".into()))
        }

        async fn verify_payment(&self, _verification: &PaymentVerification) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn slot(id: i64, day: &str, start: &str, booked: bool) -> Slot {
        let start = NaiveTime::parse_from_str(start, "%H:%M").unwrap();
        Slot {
            id: SlotId::Server(id),
            teacher_id: String::new(),
            date: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
            start_time: start,
            end_time: start + chrono::Duration::hours(1),
            is_booked: booked,
        }
    }

    fn api() -> FixedSlots {
        FixedSlots {
            slots: vec![
                slot(1, "2024-06-03", "10:00", false),
                slot(2, "2024-05-01", "10:00", false),
                slot(3, "2024-06-02", "09:00", true),
                slot(4, "2024-06-02", "14:00", false),
            ],
            queries: Mutex::new(vec![]),
        }
    }

    #[tokio::test]
    async fn test_open_slots_drop_booked_and_past() {
        let api = api();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let slots = fetch_open_slots(&api, "t-1", 500, today).await.unwrap();

        let ids: Vec<SlotId> = slots.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![SlotId::Server(4), SlotId::Server(1)]);
        assert!(slots.iter().all(|s| s.teacher_id == "t-1"));

        let query = api.queries.lock().unwrap()[0].clone();
        assert_eq!(query.include_all, Some(true));
        assert_eq!(query.limit, 500);
    }

    #[tokio::test]
    async fn test_schedule_splits_open_and_booked() {
        let api = api();
        let (open, booked) = fetch_schedule(&api, "t-1", 100).await.unwrap();
        assert_eq!(open.len(), 3);
        assert_eq!(booked.len(), 1);
        assert_eq!(booked[0].id, SlotId::Server(3));
        assert_eq!(open[0].id, SlotId::Server(2));
    }

    #[tokio::test]
    async fn test_available_slots_keep_only_that_date() {
        let api = api();
        let date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let slots = fetch_available_slots(&api, "t-1", date, 500).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id, SlotId::Server(4));
        assert_eq!(api.queries.lock().unwrap()[0].date, Some(date));
    }
}
