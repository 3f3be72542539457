use chrono::NaiveDate;

use crate::models::{BookingUpdate, Slot, SlotEvent, SlotId};
use crate::services::slot_cache::SlotCache;

/// Everything a session shows about the selected teacher's slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotViews {
    teacher_id: Option<String>,
    selected_date: Option<NaiveDate>,
    track_booked: bool,
    /// Open slots of the selected teacher.
    pub all: SlotCache,
    /// Open slots on the selected date.
    pub available: SlotCache,
    /// Booked slots; only filled for a teacher watching their own schedule.
    pub booked: SlotCache,
}

/// Result of one pull reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotSnapshot {
    pub teacher_id: String,
    pub open: Vec<Slot>,
    pub booked: Vec<Slot>,
    /// The date `available` was fetched for.
    pub date: Option<NaiveDate>,
    pub available: Vec<Slot>,
}

/// Work the session has to do after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Resync,
    RefreshBookings,
    BookingResolved(SlotId),
    ServerError(String),
}

impl SlotViews {
    pub fn for_teacher(teacher_id: impl Into<String>, track_booked: bool) -> Self {
        Self {
            teacher_id: Some(teacher_id.into()),
            track_booked,
            ..Self::default()
        }
    }

    pub fn teacher_id(&self) -> Option<&str> {
        self.teacher_id.as_deref()
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected_date
    }

    /// Derives the date view from `all` right away; the next pull refines it.
    pub fn select_date(&mut self, date: Option<NaiveDate>) {
        self.selected_date = date;
        self.rederive_available();
    }

    pub fn with_selected_date(mut self, date: Option<NaiveDate>) -> Self {
        self.select_date(date);
        self
    }

    pub fn find_open(&self, id: &SlotId) -> Option<&Slot> {
        self.all.get(id).or_else(|| self.available.get(id))
    }

    pub fn insert_open(&mut self, slot: Slot) {
        if self.selected_date == Some(slot.date) {
            self.available.insert(slot.clone());
        }
        self.all.insert(slot);
    }

    /// Removes a slot from every open view.
    pub fn remove_open(&mut self, id: &SlotId) -> Option<Slot> {
        let from_date = self.available.remove(id);
        self.all.remove(id).or(from_date)
    }

    /// What the server's `slots_count` is compared against.
    pub fn tracked_count(&self) -> usize {
        self.all.len() + self.booked.len()
    }

    fn is_watching(&self, teacher_id: &str) -> bool {
        match self.teacher_id.as_deref() {
            Some(watching) => teacher_id.is_empty() || teacher_id == watching,
            None => false,
        }
    }

    fn rederive_available(&mut self) {
        let slots = match self.selected_date {
            Some(date) => self.all.iter().filter(|s| s.date == date).cloned().collect(),
            None => Vec::new(),
        };
        self.available = SlotCache::from_slots(slots);
    }

    /// Pull reconciliation. A snapshot for another teacher is stale and is
    /// ignored. `hidden` is a slot with a booking in flight; it stays out of
    /// the open views until the booking resolves.
    pub fn apply_snapshot(&mut self, snapshot: SlotSnapshot, hidden: Option<&SlotId>) -> bool {
        if self.teacher_id.as_deref() != Some(snapshot.teacher_id.as_str()) {
            return false;
        }

        let visible = |slots: Vec<Slot>| -> Vec<Slot> {
            slots
                .into_iter()
                .filter(|s| Some(&s.id) != hidden)
                .collect()
        };

        self.all.replace_all(visible(snapshot.open));
        if self.track_booked {
            self.booked.replace_all(snapshot.booked);
            let booked = &self.booked;
            self.all
                .retain(|s| !(s.is_temporary() && booked.find_span(&s.span()).is_some()));
        }

        if snapshot.date.is_some() && snapshot.date == self.selected_date {
            self.available.replace_all(visible(snapshot.available));
            let temps: Vec<Slot> = self
                .all
                .iter()
                .filter(|s| s.is_temporary() && Some(s.date) == self.selected_date)
                .cloned()
                .collect();
            for temp in temps {
                if self.available.find_span(&temp.span()).is_none() {
                    self.available.insert(temp);
                }
            }
        } else {
            self.rederive_available();
        }
        true
    }
}

/// Applies one pushed event. Every arm is idempotent: applying the same event
/// again leaves the views unchanged. `hidden` is a slot with a booking in
/// flight; a push cannot bring it back while the attempt is open.
pub fn apply(views: &mut SlotViews, event: &SlotEvent, hidden: Option<&SlotId>) -> Vec<FollowUp> {
    match event {
        SlotEvent::SlotAdded(slot) if Some(&slot.id) == hidden => {
            tracing::debug!(slot_id = %slot.id, "slot_added for slot being booked, ignoring");
            Vec::new()
        }
        SlotEvent::SlotAdded(slot) => slot_added(views, slot),
        SlotEvent::SlotDeleted(id) => {
            views.remove_open(id);
            Vec::new()
        }
        SlotEvent::BookingUpdate(update) => booking_update(views, update),
        SlotEvent::SlotsCount { teacher_id, count } => {
            slots_count(views, teacher_id.as_deref(), *count)
        }
        SlotEvent::Error(message) => vec![FollowUp::ServerError(message.clone())],
    }
}

fn slot_added(views: &mut SlotViews, slot: &Slot) -> Vec<FollowUp> {
    if !views.is_watching(&slot.teacher_id) || slot.is_booked || views.booked.contains(&slot.id) {
        return Vec::new();
    }

    // Only a temporary placeholder collapses into the canonical record; two
    // confirmed slots with the same span stay distinct.
    let placeholder = if slot.is_temporary() {
        None
    } else {
        views
            .all
            .find(|s| s.is_temporary() && s.same_span(slot))
            .map(|s| s.id.clone())
    };

    if let Some(temp_id) = &placeholder {
        tracing::debug!(temp_id = %temp_id, slot_id = %slot.id, "collapsing placeholder");
        views.remove_open(temp_id);
    }
    views.insert_open(slot.clone());

    if placeholder.is_some() {
        vec![FollowUp::Resync]
    } else {
        Vec::new()
    }
}

fn booking_update(views: &mut SlotViews, update: &BookingUpdate) -> Vec<FollowUp> {
    let removed = views.remove_open(&update.slot_id);
    if views.track_booked {
        if let Some(mut slot) = removed {
            slot.is_booked = true;
            views.booked.insert(slot);
        }
    }

    vec![
        FollowUp::BookingResolved(update.slot_id.clone()),
        FollowUp::RefreshBookings,
        FollowUp::Resync,
    ]
}

fn slots_count(views: &SlotViews, teacher_id: Option<&str>, count: usize) -> Vec<FollowUp> {
    let Some(watching) = views.teacher_id() else {
        return Vec::new();
    };
    if teacher_id.is_some_and(|t| t != watching) {
        return Vec::new();
    }

    let local = views.tracked_count();
    if count != local {
        tracing::info!(teacher_id = watching, server = count, local, "slot count mismatch");
        vec![FollowUp::Resync]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn slot(id: SlotId, day: &str, start: &str, end: &str) -> Slot {
        Slot {
            id,
            teacher_id: "t-1".to_string(),
            date: date(day),
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
            is_booked: false,
        }
    }

    fn student_views() -> SlotViews {
        let mut views = SlotViews::for_teacher("t-1", false).with_selected_date(Some(date("2024-06-01")));
        views.insert_open(slot(SlotId::Server(1), "2024-06-01", "10:00", "11:00"));
        views.insert_open(slot(SlotId::Server(2), "2024-06-02", "10:00", "11:00"));
        views
    }

    fn booking_update(slot_id: i64) -> SlotEvent {
        SlotEvent::BookingUpdate(BookingUpdate {
            id: Some(100),
            slot_id: SlotId::Server(slot_id),
            student_id: Some("s-1".into()),
            status: Default::default(),
        })
    }

    fn apply(views: &mut SlotViews, event: &SlotEvent) -> Vec<FollowUp> {
        super::apply(views, event, None)
    }

    fn assert_idempotent(views: SlotViews, event: SlotEvent) {
        let mut once = views.clone();
        apply(&mut once, &event);
        let mut twice = views;
        apply(&mut twice, &event);
        apply(&mut twice, &event);
        assert_eq!(once, twice, "event {} is not idempotent", event.kind());
    }

    #[test]
    fn test_slot_added_goes_to_both_views() {
        let mut views = student_views();
        let follow_ups = apply(
            &mut views,
            &SlotEvent::SlotAdded(slot(SlotId::Server(3), "2024-06-01", "08:00", "09:00")),
        );
        assert!(follow_ups.is_empty());
        assert_eq!(views.all.len(), 3);
        assert_eq!(views.available.len(), 2);
        assert_eq!(views.available.to_ordered_list()[0].id, SlotId::Server(3));
    }

    #[test]
    fn test_every_event_kind_is_idempotent() {
        let events = vec![
            SlotEvent::SlotAdded(slot(SlotId::Server(3), "2024-06-01", "08:00", "09:00")),
            SlotEvent::SlotDeleted(SlotId::Server(1)),
            booking_update(2),
            SlotEvent::SlotsCount { teacher_id: Some("t-1".into()), count: 9 },
            SlotEvent::Error("Slot is already booked".into()),
        ];
        for event in events {
            assert_idempotent(student_views(), event);
        }
    }

    #[test]
    fn test_slot_deleted_absent_is_noop() {
        let mut views = student_views();
        let before = views.clone();
        let follow_ups = apply(&mut views, &SlotEvent::SlotDeleted(SlotId::Server(77)));
        assert!(follow_ups.is_empty());
        assert_eq!(views, before);
    }

    #[test]
    fn test_slot_deleted_removes_from_date_view() {
        let mut views = student_views();
        apply(&mut views, &SlotEvent::SlotDeleted(SlotId::Server(1)));
        assert!(!views.all.contains(&SlotId::Server(1)));
        assert!(views.available.is_empty());
    }

    #[test]
    fn test_slot_for_other_teacher_is_ignored() {
        let mut views = student_views();
        let mut other = slot(SlotId::Server(9), "2024-06-01", "12:00", "13:00");
        other.teacher_id = "t-2".into();
        apply(&mut views, &SlotEvent::SlotAdded(other));
        assert_eq!(views.all.len(), 2);
    }

    #[test]
    fn test_booked_slot_added_is_ignored() {
        let mut views = student_views();
        let mut booked = slot(SlotId::Server(9), "2024-06-01", "12:00", "13:00");
        booked.is_booked = true;
        apply(&mut views, &SlotEvent::SlotAdded(booked));
        assert!(!views.all.contains(&SlotId::Server(9)));
    }

    #[test]
    fn test_temp_placeholder_collapses_into_canonical() {
        let mut views = SlotViews::for_teacher("t-1", true);
        views.insert_open(slot(SlotId::Temp("temp_123".into()), "2024-06-02", "09:00", "10:00"));

        let follow_ups = apply(
            &mut views,
            &SlotEvent::SlotAdded(slot(SlotId::Server(42), "2024-06-02", "09:00", "10:00")),
        );

        assert_eq!(follow_ups, vec![FollowUp::Resync]);
        let ids: Vec<SlotId> = views.all.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![SlotId::Server(42)]);
    }

    #[test]
    fn test_confirmed_slots_with_same_span_stay_distinct() {
        let mut views = SlotViews::for_teacher("t-1", true);
        views.insert_open(slot(SlotId::Temp("temp_123".into()), "2024-06-02", "09:00", "10:00"));

        for id in [42, 43] {
            apply(
                &mut views,
                &SlotEvent::SlotAdded(slot(SlotId::Server(id), "2024-06-02", "09:00", "10:00")),
            );
        }

        let ids: Vec<SlotId> = views.all.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![SlotId::Server(42), SlotId::Server(43)]);
    }

    #[test]
    fn test_booking_update_removes_everywhere() {
        let mut views = student_views();
        let follow_ups = apply(&mut views, &booking_update(1));
        assert!(!views.all.contains(&SlotId::Server(1)));
        assert!(views.available.is_empty());
        assert!(views.booked.is_empty());
        assert_eq!(
            follow_ups,
            vec![
                FollowUp::BookingResolved(SlotId::Server(1)),
                FollowUp::RefreshBookings,
                FollowUp::Resync,
            ]
        );
    }

    #[test]
    fn test_booking_update_moves_slot_to_teacher_booked_list() {
        let mut views = SlotViews::for_teacher("t-1", true);
        views.insert_open(slot(SlotId::Server(1), "2024-06-01", "10:00", "11:00"));
        apply(&mut views, &booking_update(1));
        assert!(views.all.is_empty());
        assert!(views.booked.get(&SlotId::Server(1)).unwrap().is_booked);
        assert_eq!(views.tracked_count(), 1);
    }

    #[test]
    fn test_slots_count_mismatch_requests_resync() {
        let mut views = student_views();
        assert_eq!(
            apply(&mut views, &SlotEvent::SlotsCount { teacher_id: None, count: 5 }),
            vec![FollowUp::Resync]
        );
        assert!(apply(&mut views, &SlotEvent::SlotsCount { teacher_id: None, count: 2 }).is_empty());
        assert!(apply(
            &mut views,
            &SlotEvent::SlotsCount { teacher_id: Some("t-2".into()), count: 5 }
        )
        .is_empty());
    }

    #[test]
    fn test_slots_count_without_teacher_is_ignored() {
        let mut views = SlotViews::default();
        assert!(apply(&mut views, &SlotEvent::SlotsCount { teacher_id: None, count: 5 }).is_empty());
    }

    #[test]
    fn test_error_does_not_touch_cache() {
        let mut views = student_views();
        let before = views.clone();
        let follow_ups = apply(&mut views, &SlotEvent::Error("Slot not found".into()));
        assert_eq!(follow_ups, vec![FollowUp::ServerError("Slot not found".into())]);
        assert_eq!(views, before);
    }

    #[test]
    fn test_snapshot_for_other_teacher_is_stale() {
        let mut views = student_views();
        let before = views.clone();
        let applied = views.apply_snapshot(
            SlotSnapshot {
                teacher_id: "t-2".into(),
                ..Default::default()
            },
            None,
        );
        assert!(!applied);
        assert_eq!(views, before);
    }

    #[test]
    fn test_snapshot_converges_after_out_of_order_push() {
        let mut views = student_views();
        let five = slot(SlotId::Server(5), "2024-06-01", "12:00", "13:00");
        apply(&mut views, &SlotEvent::SlotAdded(five.clone()));
        apply(&mut views, &SlotEvent::SlotDeleted(SlotId::Server(5)));
        assert!(!views.all.contains(&SlotId::Server(5)));

        let open = vec![
            slot(SlotId::Server(1), "2024-06-01", "10:00", "11:00"),
            slot(SlotId::Server(2), "2024-06-02", "10:00", "11:00"),
            five.clone(),
        ];
        views.apply_snapshot(
            SlotSnapshot {
                teacher_id: "t-1".into(),
                open,
                booked: Vec::new(),
                date: Some(date("2024-06-01")),
                available: vec![
                    slot(SlotId::Server(1), "2024-06-01", "10:00", "11:00"),
                    five,
                ],
            },
            None,
        );

        assert!(views.all.contains(&SlotId::Server(5)));
        assert!(views.available.contains(&SlotId::Server(5)));
    }

    #[test]
    fn test_snapshot_hides_slot_with_booking_in_flight() {
        let mut views = student_views();
        views.remove_open(&SlotId::Server(1));
        views.apply_snapshot(
            SlotSnapshot {
                teacher_id: "t-1".into(),
                open: vec![
                    slot(SlotId::Server(1), "2024-06-01", "10:00", "11:00"),
                    slot(SlotId::Server(2), "2024-06-02", "10:00", "11:00"),
                ],
                booked: Vec::new(),
                date: Some(date("2024-06-01")),
                available: vec![slot(SlotId::Server(1), "2024-06-01", "10:00", "11:00")],
            },
            Some(&SlotId::Server(1)),
        );
        assert!(!views.all.contains(&SlotId::Server(1)));
        assert!(views.available.is_empty());
    }

    #[test]
    fn test_slot_added_cannot_resurrect_slot_being_booked() {
        let mut views = student_views();
        views.remove_open(&SlotId::Server(1));
        let event = SlotEvent::SlotAdded(slot(SlotId::Server(1), "2024-06-01", "10:00", "11:00"));

        let follow_ups = super::apply(&mut views, &event, Some(&SlotId::Server(1)));
        assert!(follow_ups.is_empty());
        assert!(!views.all.contains(&SlotId::Server(1)));
        assert!(views.available.is_empty());

        // Other slots still arrive while the attempt is open.
        let other = SlotEvent::SlotAdded(slot(SlotId::Server(3), "2024-06-01", "08:00", "09:00"));
        super::apply(&mut views, &other, Some(&SlotId::Server(1)));
        assert!(views.available.contains(&SlotId::Server(3)));
    }

    #[test]
    fn test_select_date_rederives_view() {
        let mut views = student_views();
        views.select_date(Some(date("2024-06-02")));
        let ids: Vec<SlotId> = views.available.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![SlotId::Server(2)]);
        views.select_date(None);
        assert!(views.available.is_empty());
    }
}
