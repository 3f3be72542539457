use std::time::Duration;

use tokio::time::Instant;

use crate::errors::BookingError;
use crate::models::{ClientMessage, PendingBooking, SlotId};
use crate::services::reconciler::SlotViews;

/// How a booking attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Confirmed(SlotId),
    TimedOut(SlotId),
    Failed { slot_id: SlotId, message: String },
}

impl BookingOutcome {
    pub fn slot_id(&self) -> &SlotId {
        match self {
            BookingOutcome::Confirmed(id) | BookingOutcome::TimedOut(id) => id,
            BookingOutcome::Failed { slot_id, .. } => slot_id,
        }
    }

    /// Failed attempts are rolled back by re-reading the server, never by
    /// re-inserting the slot locally.
    pub fn needs_resync(&self) -> bool {
        !matches!(self, BookingOutcome::Confirmed(_))
    }
}

/// `Idle -> Requested -> {Confirmed | TimedOut | Failed}` for one student
/// session. At most one attempt is in flight.
#[derive(Debug)]
pub struct BookingCoordinator {
    pending: Option<PendingBooking>,
    timeout: Duration,
}

impl BookingCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: None,
            timeout,
        }
    }

    pub fn pending(&self) -> Option<&PendingBooking> {
        self.pending.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending
            .as_ref()
            .map(|p| p.requested_at + self.timeout)
    }

    /// `Idle -> Requested`. Removes the slot from every open view and returns
    /// the request to send. Nothing is mutated when the guard rejects.
    pub fn request(
        &mut self,
        views: &mut SlotViews,
        slot_id: &SlotId,
        student_id: &str,
        connected: bool,
        now: Instant,
    ) -> Result<ClientMessage, BookingError> {
        if self.pending.is_some() {
            return Err(BookingError::AlreadyInProgress);
        }
        if views.teacher_id().is_none() {
            return Err(BookingError::NoTeacherSelected);
        }
        if !connected {
            return Err(BookingError::ConnectionUnavailable);
        }
        match views.find_open(slot_id) {
            Some(slot) if !slot.is_booked && !slot.is_temporary() => {}
            _ => return Err(BookingError::SlotNotAvailable(slot_id.clone())),
        }

        views.remove_open(slot_id);
        self.pending = Some(PendingBooking {
            slot_id: slot_id.clone(),
            requested_at: now,
        });
        tracing::info!(slot_id = %slot_id, student_id, "booking requested");

        Ok(ClientMessage::BookSlot {
            slot_id: slot_id.clone(),
            student_id: student_id.to_string(),
        })
    }

    /// The request never left the client.
    pub fn abort(&mut self) -> Option<PendingBooking> {
        self.pending.take()
    }

    /// `Requested -> Confirmed` when the update matches within the window.
    /// A late match counts as a timeout.
    pub fn on_booking_update(&mut self, slot_id: &SlotId, now: Instant) -> Option<BookingOutcome> {
        let deadline = self.deadline()?;
        if &self.pending.as_ref()?.slot_id != slot_id {
            return None;
        }
        let pending = self.pending.take()?;
        if now > deadline {
            return Some(BookingOutcome::TimedOut(pending.slot_id));
        }
        Some(BookingOutcome::Confirmed(pending.slot_id))
    }

    /// `Requested -> Failed(error)`.
    pub fn on_error(&mut self, message: &str) -> Option<BookingOutcome> {
        let pending = self.pending.take()?;
        Some(BookingOutcome::Failed {
            slot_id: pending.slot_id,
            message: message.to_string(),
        })
    }

    /// `Requested -> Failed(timeout)` once the deadline has passed.
    pub fn on_tick(&mut self, now: Instant) -> Option<BookingOutcome> {
        if now < self.deadline()? {
            return None;
        }
        self.pending
            .take()
            .map(|p| BookingOutcome::TimedOut(p.slot_id))
    }

    /// Teardown. Drops the attempt without an outcome.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
