use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::config::ClientConfig;
use crate::errors::{ApiError, BookingError, ErrorClass, SessionClosed, SlotError};
use crate::models::{Booking, ClientMessage, Role, Slot, SlotDraft, SlotEvent, SlotId};
use crate::services::api::BookingApi;
use crate::services::booking::{BookingCoordinator, BookingOutcome};
use crate::services::polling::{PollWork, PollingScheduler};
use crate::services::reconciler::{self, FollowUp, SlotSnapshot, SlotViews};
use crate::services::slots;
use crate::state::ClientState;

const COMMAND_CAPACITY: usize = 64;
const NOTICE_CAPACITY: usize = 256;

enum SessionCommand {
    SelectTeacher(Option<String>),
    SelectDate(Option<NaiveDate>),
    BookSlot {
        slot_id: SlotId,
        reply: oneshot::Sender<Result<(), BookingError>>,
    },
    AddSlot {
        draft: SlotDraft,
        reply: oneshot::Sender<Result<SlotId, SlotError>>,
    },
    Refresh,
    RefreshBookings,
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// What a session reports to whoever drives it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    SlotsRefreshed,
    BookingRequested(SlotId),
    BookingConfirmed(SlotId),
    BookingTimedOut(SlotId),
    BookingFailed { slot_id: SlotId, message: String },
    ServerError(String),
    BookingsUpdated(Vec<Booking>),
    RefreshFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub teacher_id: Option<String>,
    pub selected_date: Option<NaiveDate>,
    pub all: Vec<Slot>,
    pub available: Vec<Slot>,
    pub booked: Vec<Slot>,
    pub pending: Option<SlotId>,
    pub bookings: Vec<Booking>,
    pub connected: bool,
}

/// Results that come back from fetches running off the session task.
enum Inbox {
    Slots {
        generation: u64,
        /// Push count when the fetch started.
        pushes: u64,
        result: Result<SlotSnapshot, ApiError>,
    },
    Bookings(Result<Vec<Booking>, ApiError>),
}

/// Caller side of a running session. Dropping it or calling
/// [`SessionHandle::shutdown`] tears the session down.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    notices: broadcast::Sender<SessionNotice>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionClosed> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(build(tx)).await.map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }

    async fn tell(&self, command: SessionCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }

    /// Switches the watched teacher. Caches are rebuilt and polling restarts.
    pub async fn select_teacher(&self, teacher_id: Option<String>) -> Result<(), SessionClosed> {
        self.tell(SessionCommand::SelectTeacher(teacher_id)).await
    }

    pub async fn select_date(&self, date: Option<NaiveDate>) -> Result<(), SessionClosed> {
        self.tell(SessionCommand::SelectDate(date)).await
    }

    /// Sends a booking request. `Ok` means the request left the client; the
    /// outcome arrives later as a [`SessionNotice`].
    pub async fn book_slot(&self, slot_id: SlotId) -> Result<(), BookingError> {
        self.request(|reply| SessionCommand::BookSlot { slot_id, reply })
            .await?
    }

    /// Adds a slot to a teacher's own schedule. Returns the temporary id the
    /// slot is shown under until the server confirms it.
    pub async fn add_slot(&self, draft: SlotDraft) -> Result<SlotId, SlotError> {
        self.request(|reply| SessionCommand::AddSlot { draft, reply })
            .await?
    }

    pub async fn refresh(&self) -> Result<(), SessionClosed> {
        self.tell(SessionCommand::Refresh).await
    }

    pub async fn refresh_bookings(&self) -> Result<(), SessionClosed> {
        self.tell(SessionCommand::RefreshBookings).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionClosed> {
        self.request(SessionCommand::Snapshot).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub async fn shutdown(self) {
        let SessionHandle { commands, task, .. } = self;
        drop(commands);
        let _ = task.await;
    }
}

/// Starts a session for `state.user`. Students watch `config.teacher_id` if
/// set; teachers watch their own schedule.
pub fn spawn(state: Arc<ClientState>) -> SessionHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (date_tx, _) = watch::channel(None);

    // Subscribe before the task starts so no push is missed.
    let events = BroadcastStream::new(state.channel.subscribe());

    let initial_teacher = match state.user.role {
        Role::Teacher => Some(state.user.user_id.clone()),
        Role::Student => state.config.teacher_id.clone(),
    };

    let session = Session {
        coordinator: BookingCoordinator::new(state.config.booking_timeout),
        state,
        views: SlotViews::default(),
        bookings: Vec::new(),
        pending_adds: HashMap::new(),
        poller: None,
        generation: 0,
        pushes: Arc::new(AtomicU64::new(0)),
        date_tx,
        inbox_tx,
        notices: notices.clone(),
    };

    let task = tokio::spawn(session.run(initial_teacher, commands_rx, events, inbox_rx));

    SessionHandle {
        commands: commands_tx,
        notices,
        task,
    }
}

struct SlotRefresh {
    api: Arc<dyn BookingApi>,
    config: ClientConfig,
    role: Role,
    teacher_id: String,
    generation: u64,
    pushes: Arc<AtomicU64>,
    date: watch::Receiver<Option<NaiveDate>>,
    inbox: mpsc::UnboundedSender<Inbox>,
}

#[async_trait]
impl PollWork for SlotRefresh {
    async fn run(&self) {
        let date = *self.date.borrow();
        let pushes = self.pushes.load(Ordering::SeqCst);
        let result =
            slots::fetch_snapshot(self.api.as_ref(), self.role, &self.teacher_id, date, &self.config)
                .await;
        let _ = self.inbox.send(Inbox::Slots {
            generation: self.generation,
            pushes,
            result,
        });
    }
}

struct Session {
    state: Arc<ClientState>,
    views: SlotViews,
    coordinator: BookingCoordinator,
    bookings: Vec<Booking>,
    /// Temporary slots awaiting server confirmation, with when they were sent.
    pending_adds: HashMap<SlotId, Instant>,
    poller: Option<PollingScheduler>,
    /// Bumped on every teacher switch; older fetch results are dropped.
    generation: u64,
    /// Counts pushes that changed the slot set. A fetch that started before
    /// the latest one may predate it and is not applied.
    pushes: Arc<AtomicU64>,
    date_tx: watch::Sender<Option<NaiveDate>>,
    inbox_tx: mpsc::UnboundedSender<Inbox>,
    notices: broadcast::Sender<SessionNotice>,
}

impl Session {
    async fn run(
        mut self,
        initial_teacher: Option<String>,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: BroadcastStream<SlotEvent>,
        mut inbox: mpsc::UnboundedReceiver<Inbox>,
    ) {
        tracing::info!(
            user_id = %self.state.user.user_id,
            role = self.state.user.role.as_str(),
            "session started"
        );
        self.refresh_bookings();
        self.select_teacher(initial_teacher);

        let mut events_open = true;
        loop {
            let deadline = self.coordinator.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(message) = inbox.recv() => self.handle_inbox(message),
                event = events.next(), if events_open => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                        tracing::warn!(
                            missed,
                            class = ?ErrorClass::Consistency,
                            "realtime events lost, resyncing"
                        );
                        self.pushes.fetch_add(1, Ordering::SeqCst);
                        self.force_resync();
                    }
                    None => {
                        tracing::warn!("realtime event stream ended");
                        events_open = false;
                    }
                },
                _ = wait_until(deadline) => self.expire_booking(),
            }
        }

        self.teardown();
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SelectTeacher(teacher_id) => self.select_teacher(teacher_id),
            SessionCommand::SelectDate(date) => self.select_date(date),
            SessionCommand::BookSlot { slot_id, reply } => {
                let result = self.book_slot(slot_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::AddSlot { draft, reply } => {
                let result = self.add_slot(draft).await;
                let _ = reply.send(result);
            }
            SessionCommand::Refresh => {
                self.force_resync();
                self.refresh_bookings();
            }
            SessionCommand::RefreshBookings => self.refresh_bookings(),
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn select_teacher(&mut self, teacher_id: Option<String>) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        self.generation += 1;
        self.pending_adds.clear();

        let date = self.views.selected_date();
        let track_booked = self.state.user.role == Role::Teacher;
        self.views = match &teacher_id {
            Some(id) => SlotViews::for_teacher(id.as_str(), track_booked),
            None => SlotViews::default(),
        }
        .with_selected_date(date);

        let Some(teacher_id) = teacher_id else {
            tracing::info!("no teacher selected");
            return;
        };
        tracing::info!(teacher_id = %teacher_id, generation = self.generation, "watching teacher");

        let work = SlotRefresh {
            api: Arc::clone(&self.state.api),
            config: self.state.config.clone(),
            role: self.state.user.role,
            teacher_id,
            generation: self.generation,
            pushes: Arc::clone(&self.pushes),
            date: self.date_tx.subscribe(),
            inbox: self.inbox_tx.clone(),
        };
        self.poller = Some(PollingScheduler::start(
            self.state.config.poll_interval,
            Arc::new(work),
        ));
    }

    fn select_date(&mut self, date: Option<NaiveDate>) {
        self.views.select_date(date);
        self.date_tx.send_replace(date);
        self.force_resync();
    }

    async fn book_slot(&mut self, slot_id: SlotId) -> Result<(), BookingError> {
        if self.state.user.role != Role::Student {
            return Err(BookingError::WrongRole);
        }

        let connected = self.state.channel.is_connected();
        let message = self.coordinator.request(
            &mut self.views,
            &slot_id,
            &self.state.user.user_id,
            connected,
            Instant::now(),
        )?;

        if let Err(e) = self.state.channel.send(&message).await {
            tracing::warn!(slot_id = %slot_id, error = %e, "booking request not sent");
            self.coordinator.abort();
            self.force_resync();
            return Err(BookingError::ConnectionUnavailable);
        }

        self.notify(SessionNotice::BookingRequested(slot_id));
        Ok(())
    }

    async fn add_slot(&mut self, draft: SlotDraft) -> Result<SlotId, SlotError> {
        if self.state.user.role != Role::Teacher {
            return Err(SlotError::WrongRole);
        }
        if !self.state.channel.is_connected() {
            return Err(SlotError::ConnectionUnavailable);
        }

        let teacher_id = self.state.user.user_id.clone();
        let slot = draft.into_slot(SlotId::temporary(), &teacher_id);
        let id = slot.id.clone();
        let message = ClientMessage::add_slot(&slot);

        self.views.insert_open(slot);
        self.pending_adds.insert(id.clone(), Instant::now());

        if let Err(e) = self.state.channel.send(&message).await {
            tracing::warn!(temp_id = %id, error = %e, "add_slot not sent");
            self.views.remove_open(&id);
            self.pending_adds.remove(&id);
            return Err(SlotError::ConnectionUnavailable);
        }

        tracing::info!(temp_id = %id, teacher_id = %teacher_id, "slot added");
        self.force_resync();
        Ok(id)
    }

    fn handle_event(&mut self, event: SlotEvent) {
        tracing::debug!(kind = event.kind(), "applying realtime event");

        if matches!(
            event,
            SlotEvent::SlotAdded(_) | SlotEvent::SlotDeleted(_) | SlotEvent::BookingUpdate(_)
        ) {
            self.pushes.fetch_add(1, Ordering::SeqCst);
        }
        if let SlotEvent::BookingUpdate(update) = &event {
            tracing::info!(
                slot_id = %update.slot_id,
                status = update.status.as_str(),
                "booking update"
            );
        }

        let hidden = self.coordinator.pending().map(|p| p.slot_id.clone());
        let mut resync = false;
        for follow_up in reconciler::apply(&mut self.views, &event, hidden.as_ref()) {
            match follow_up {
                FollowUp::Resync => resync = true,
                FollowUp::RefreshBookings => self.refresh_bookings(),
                FollowUp::BookingResolved(slot_id) => {
                    if let Some(outcome) =
                        self.coordinator.on_booking_update(&slot_id, Instant::now())
                    {
                        self.finish(outcome);
                    }
                }
                FollowUp::ServerError(message) => {
                    tracing::warn!(message = %message, "server reported an error");
                    self.notify(SessionNotice::ServerError(message.clone()));
                    match self.coordinator.on_error(&message) {
                        Some(outcome) => self.finish(outcome),
                        None if self.state.user.role == Role::Teacher => resync = true,
                        None => {}
                    }
                }
            }
        }

        if resync {
            self.force_resync();
        }
    }

    fn handle_inbox(&mut self, message: Inbox) {
        match message {
            Inbox::Slots { generation, pushes, .. }
                if generation == self.generation
                    && pushes < self.pushes.load(Ordering::SeqCst) =>
            {
                tracing::debug!(
                    class = ?ErrorClass::Consistency,
                    "slot refresh started before the latest push, refetching"
                );
                self.force_resync();
            }
            Inbox::Slots { generation, result, .. } if generation == self.generation => match result {
                Ok(snapshot) => {
                    let hidden = self.coordinator.pending().map(|p| p.slot_id.clone());
                    if self.views.apply_snapshot(snapshot, hidden.as_ref()) {
                        self.expire_placeholders(Instant::now());
                        self.notify(SessionNotice::SlotsRefreshed);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        class = ?e.class(),
                        retryable = e.is_retryable(),
                        "slot refresh failed"
                    );
                    self.notify(SessionNotice::RefreshFailed(e.to_string()));
                }
            },
            Inbox::Slots { generation, .. } => {
                tracing::debug!(generation, current = self.generation, "dropping stale slot refresh");
            }
            Inbox::Bookings(Ok(bookings)) => {
                self.bookings = bookings;
                self.notify(SessionNotice::BookingsUpdated(self.bookings.clone()));
            }
            Inbox::Bookings(Err(e)) => {
                tracing::error!(error = %e, "booking list refresh failed");
                self.notify(SessionNotice::RefreshFailed(e.to_string()));
            }
        }
    }

    /// Drops placeholders the server has confirmed or has not confirmed in time.
    fn expire_placeholders(&mut self, now: Instant) {
        let timeout = self.state.config.booking_timeout;
        let views = &mut self.views;
        self.pending_adds.retain(|id, sent_at| {
            if !views.all.contains(id) {
                return false;
            }
            if now.duration_since(*sent_at) >= timeout {
                tracing::warn!(temp_id = %id, "slot never confirmed, discarding");
                views.remove_open(id);
                return false;
            }
            true
        });
    }

    fn expire_booking(&mut self) {
        if let Some(outcome) = self.coordinator.on_tick(Instant::now()) {
            self.finish(outcome);
        }
    }

    fn finish(&mut self, outcome: BookingOutcome) {
        match &outcome {
            BookingOutcome::Confirmed(slot_id) => {
                tracing::info!(slot_id = %slot_id, "booking confirmed");
                self.notify(SessionNotice::BookingConfirmed(slot_id.clone()));
            }
            BookingOutcome::TimedOut(slot_id) => {
                tracing::warn!(slot_id = %slot_id, "booking timed out");
                self.notify(SessionNotice::BookingTimedOut(slot_id.clone()));
            }
            BookingOutcome::Failed { slot_id, message } => {
                tracing::warn!(slot_id = %slot_id, message = %message, "booking failed");
                self.notify(SessionNotice::BookingFailed {
                    slot_id: slot_id.clone(),
                    message: message.clone(),
                });
            }
        }
        if outcome.needs_resync() {
            self.force_resync();
        }
    }

    fn force_resync(&self) {
        if let Some(poller) = &self.poller {
            tracing::debug!("forcing resync");
            poller.trigger();
        }
    }

    fn refresh_bookings(&self) {
        if self.state.user.role != Role::Student {
            return;
        }
        let api = Arc::clone(&self.state.api);
        let student_id = self.state.user.user_id.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.student_bookings(&student_id).await;
            let _ = inbox.send(Inbox::Bookings(result));
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            teacher_id: self.views.teacher_id().map(str::to_string),
            selected_date: self.views.selected_date(),
            all: self.views.all.to_ordered_list(),
            available: self.views.available.to_ordered_list(),
            booked: self.views.booked.to_ordered_list(),
            pending: self.coordinator.pending().map(|p| p.slot_id.clone()),
            bookings: self.bookings.clone(),
            connected: self.state.channel.is_connected(),
        }
    }

    fn notify(&self, notice: SessionNotice) {
        // No listeners is fine.
        let _ = self.notices.send(notice);
    }

    fn teardown(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        self.coordinator.cancel();
        self.state.channel.close();
        tracing::info!(user_id = %self.state.user.user_id, "session closed");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
