use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reading_core::Zone;
use reading_core::model::{BookId, ReadingSession, SessionForm, SessionId};
use storage::repository::{SessionRepository, StorageError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::TimerError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Countdown presets offered by the timer configuration, in minutes.
pub const COUNTDOWN_PRESETS: [u32; 3] = [5, 10, 20];

const TICK: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 64;

//
// ─── MODES AND PHASES ──────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimerMode {
    #[default]
    Stopwatch,
    Countdown { duration_seconds: u64 },
}

impl TimerMode {
    /// Countdown of `minutes` whole minutes.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::InvalidDuration` for zero minutes.
    pub fn countdown_minutes(minutes: u32) -> Result<Self, TimerError> {
        if minutes == 0 {
            return Err(TimerError::InvalidDuration);
        }
        Ok(Self::Countdown {
            duration_seconds: u64::from(minutes) * 60,
        })
    }

    fn validate(self) -> Result<Self, TimerError> {
        match self {
            Self::Countdown {
                duration_seconds: 0,
            } => Err(TimerError::InvalidDuration),
            mode => Ok(mode),
        }
    }

    fn initial_remaining(self) -> Option<u64> {
        match self {
            Self::Stopwatch => None,
            Self::Countdown { duration_seconds } => Some(duration_seconds),
        }
    }
}

/// Externally visible state tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Configuring,
    Running,
    Finalizing,
    ManualEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick {
        elapsed_seconds: u64,
        remaining_seconds: Option<u64>,
    },
    /// The countdown reached zero. The session stays open until ended or cancelled.
    CountdownFinished,
}

/// Snapshot of the in-progress session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub session_id: SessionId,
    pub book_id: BookId,
    pub start_time: DateTime<Utc>,
    pub mode: TimerMode,
    pub elapsed_seconds: u64,
    pub remaining_seconds: Option<u64>,
    pub pages_read: Option<u32>,
    pub notes: String,
}

//
// ─── TICKING ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default)]
struct TickCounters {
    elapsed: u64,
    remaining: Option<u64>,
}

type SharedCounters = Arc<Mutex<TickCounters>>;

fn read_counters(counters: &SharedCounters) -> TickCounters {
    *counters.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the one-second tick task; dropping it aborts the task.
struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    fn spawn(counters: SharedCounters, events: broadcast::Sender<TimerEvent>) -> Self {
        let first = Instant::now() + TICK;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(first, TICK);
            loop {
                interval.tick().await;
                let (tick, finished) = {
                    let mut c = counters.lock().unwrap_or_else(PoisonError::into_inner);
                    c.elapsed = c.elapsed.saturating_add(1);
                    let finished = match c.remaining.as_mut() {
                        Some(remaining) => {
                            *remaining = remaining.saturating_sub(1);
                            *remaining == 0
                        }
                        None => false,
                    };
                    let tick = TimerEvent::Tick {
                        elapsed_seconds: c.elapsed,
                        remaining_seconds: c.remaining,
                    };
                    (tick, finished)
                };
                // No subscribers is fine.
                let _ = events.send(tick);
                if finished {
                    tracing::debug!("countdown finished, tick stopped");
                    let _ = events.send(TimerEvent::CountdownFinished);
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct ActiveSession {
    session_id: SessionId,
    book_id: BookId,
    start_time: DateTime<Utc>,
    mode: TimerMode,
    pages_read: Option<u32>,
    notes: String,
    counters: SharedCounters,
    ticker: Option<Ticker>,
}

impl ActiveSession {
    fn stop_ticking(&mut self) {
        if self.ticker.take().is_some() {
            tracing::debug!(session_id = %self.session_id, "tick stopped");
        }
    }

    fn resume_ticking(&mut self, events: &broadcast::Sender<TimerEvent>) {
        if self.ticker.is_some() || read_counters(&self.counters).remaining == Some(0) {
            return;
        }
        self.ticker = Some(Ticker::spawn(Arc::clone(&self.counters), events.clone()));
    }

    fn draft(&self) -> SessionDraft {
        let counters = read_counters(&self.counters);
        SessionDraft {
            session_id: self.session_id,
            book_id: self.book_id,
            start_time: self.start_time,
            mode: self.mode,
            elapsed_seconds: counters.elapsed,
            remaining_seconds: counters.remaining,
            pages_read: self.pages_read,
            notes: self.notes.clone(),
        }
    }
}

enum State {
    Idle,
    Configuring,
    Running(ActiveSession),
    Finalizing(ActiveSession),
    ManualEntry,
}

//
// ─── TIMER ─────────────────────────────────────────────────────────────────────
//

/// Drives one reading session at a time: stopwatch or countdown ticking, or
/// back-dated manual entry.
///
/// Every mutation takes `&mut self`, so two finalizations can never race. The
/// tick task is owned by the running state and is aborted when the timer leaves
/// `Running` or is dropped.
pub struct SessionTimer {
    repo: Arc<dyn SessionRepository>,
    zone: Zone,
    request_timeout: Duration,
    mode: TimerMode,
    state: State,
    events: broadcast::Sender<TimerEvent>,
}

impl SessionTimer {
    #[must_use]
    pub fn new(repo: Arc<dyn SessionRepository>, zone: Zone) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            repo,
            zone,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            mode: TimerMode::Stopwatch,
            state: State::Idle,
            events,
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn phase(&self) -> TimerPhase {
        match self.state {
            State::Idle => TimerPhase::Idle,
            State::Configuring => TimerPhase::Configuring,
            State::Running(_) => TimerPhase::Running,
            State::Finalizing(_) => TimerPhase::Finalizing,
            State::ManualEntry => TimerPhase::ManualEntry,
        }
    }

    /// Mode the next (or current) session ticks in.
    #[must_use]
    pub fn mode(&self) -> TimerMode {
        match &self.state {
            State::Running(active) | State::Finalizing(active) => active.mode,
            _ => self.mode,
        }
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        self.active().map_or(0, |a| read_counters(&a.counters).elapsed)
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u64> {
        self.active()
            .and_then(|a| read_counters(&a.counters).remaining)
    }

    #[must_use]
    pub fn draft(&self) -> Option<SessionDraft> {
        self.active().map(ActiveSession::draft)
    }

    /// Tick and countdown notifications for the presentation layer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    fn active(&self) -> Option<&ActiveSession> {
        match &self.state {
            State::Running(active) | State::Finalizing(active) => Some(active),
            _ => None,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout),
        }
    }

    /// Choose stopwatch or countdown before starting.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::InvalidDuration` for a zero-length countdown and
    /// `TimerError::ConflictingMode` while a session or manual entry is open.
    pub fn configure_timer(&mut self, mode: TimerMode) -> Result<(), TimerError> {
        let mode = mode.validate()?;
        match self.state {
            State::Idle | State::Configuring => {
                self.mode = mode;
                self.state = State::Configuring;
                Ok(())
            }
            _ => Err(TimerError::ConflictingMode),
        }
    }

    /// Leave configuration and fall back to the stopwatch.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::ConflictingMode` while a session or manual entry is open.
    pub fn reset_configuration(&mut self) -> Result<(), TimerError> {
        match self.state {
            State::Idle | State::Configuring => {
                self.mode = TimerMode::Stopwatch;
                self.state = State::Idle;
                Ok(())
            }
            _ => Err(TimerError::ConflictingMode),
        }
    }

    /// # Errors
    ///
    /// Returns `TimerError::ConflictingMode` while a session is running.
    pub fn begin_manual_entry(&mut self) -> Result<(), TimerError> {
        match self.state {
            State::Idle | State::Configuring | State::ManualEntry => {
                self.mode = TimerMode::Stopwatch;
                self.state = State::ManualEntry;
                Ok(())
            }
            _ => Err(TimerError::ConflictingMode),
        }
    }

    /// # Errors
    ///
    /// Returns `TimerError::ConflictingMode` unless manual entry is open.
    pub fn cancel_manual_entry(&mut self) -> Result<(), TimerError> {
        match self.state {
            State::ManualEntry => {
                self.state = State::Idle;
                Ok(())
            }
            _ => Err(TimerError::ConflictingMode),
        }
    }

    /// Open a session for `book_id` on the server and start ticking.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::ConflictingMode` if a session or manual entry is already
    /// open, and `TimerError::SessionStart` if the repository call fails or times out.
    /// The state is unchanged on error.
    pub async fn start_session(&mut self, book_id: BookId) -> Result<SessionDraft, TimerError> {
        if !matches!(self.state, State::Idle | State::Configuring) {
            return Err(TimerError::ConflictingMode);
        }

        let started = self
            .bounded(self.repo.start_session(book_id))
            .await
            .map_err(|e| {
                tracing::warn!(book_id = %book_id, error = %e, "failed to start session");
                TimerError::SessionStart(e)
            })?;
        let session_id = started.id().ok_or_else(|| {
            TimerError::SessionStart(StorageError::Serialization(
                "started session has no id".into(),
            ))
        })?;

        let counters = Arc::new(Mutex::new(TickCounters {
            elapsed: 0,
            remaining: self.mode.initial_remaining(),
        }));
        let ticker = Ticker::spawn(Arc::clone(&counters), self.events.clone());
        let active = ActiveSession {
            session_id,
            book_id,
            start_time: started.start_time(),
            mode: self.mode,
            pages_read: None,
            notes: String::new(),
            counters,
            ticker: Some(ticker),
        };
        let draft = active.draft();
        self.state = State::Running(active);
        tracing::info!(
            session_id = %session_id,
            book_id = %book_id,
            mode = ?self.mode,
            "session started"
        );
        Ok(draft)
    }

    /// Stop ticking and move the active session into `Finalizing`.
    fn begin_finalizing(&mut self) -> Result<&mut ActiveSession, TimerError> {
        self.state = match mem::replace(&mut self.state, State::Idle) {
            State::Running(active) | State::Finalizing(active) => State::Finalizing(active),
            other => {
                self.state = other;
                return Err(TimerError::NotRunning);
            }
        };
        match &mut self.state {
            State::Finalizing(active) => {
                active.stop_ticking();
                Ok(active)
            }
            _ => Err(TimerError::NotRunning),
        }
    }

    /// Put a session whose finalization failed back into `Running`.
    fn restore_running(&mut self) {
        if let State::Finalizing(mut active) = mem::replace(&mut self.state, State::Idle) {
            active.resume_ticking(&self.events);
            self.state = State::Running(active);
        }
    }

    fn finish(&mut self) {
        self.state = State::Idle;
        self.mode = TimerMode::Stopwatch;
    }

    /// Record pages and notes and close the session at server time.
    ///
    /// Ticking stops before the request is sent.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::NotRunning` without an active session and
    /// `TimerError::SessionEnd` if the repository call fails or times out. On
    /// failure the session is running again and keeps `pages_read` and `notes`.
    pub async fn end_session(
        &mut self,
        pages_read: Option<u32>,
        notes: impl Into<String>,
    ) -> Result<ReadingSession, TimerError> {
        let active = self.begin_finalizing()?;
        active.pages_read = pages_read;
        active.notes = notes.into();
        let session_id = active.session_id;
        let notes = active.notes.clone();

        let result = self
            .bounded(self.repo.end_session(session_id, pages_read, &notes))
            .await;
        match result {
            Ok(session) => {
                self.finish();
                tracing::info!(
                    session_id = %session_id,
                    minutes = session.duration_minutes(),
                    "session ended"
                );
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "failed to end session");
                self.restore_running();
                Err(TimerError::SessionEnd(e))
            }
        }
    }

    /// Discard the active session and delete its record. There is no undo.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::NotRunning` without an active session and
    /// `TimerError::SessionCancel` if the delete fails or times out, in which case
    /// the session is running again.
    pub async fn cancel_session(&mut self) -> Result<(), TimerError> {
        let session_id = self.begin_finalizing()?.session_id;

        let result = self.bounded(self.repo.delete_session(session_id)).await;
        match result {
            Ok(()) => {
                self.finish();
                tracing::info!(session_id = %session_id, "session cancelled");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "failed to cancel session");
                self.restore_running();
                Err(TimerError::SessionCancel(e))
            }
        }
    }

    /// Save a back-dated session entered by hand.
    ///
    /// The form's wall-clock values are resolved in the timer's zone and
    /// validated before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::ConflictingMode` unless idle or in manual entry,
    /// `TimerError::InvalidTimestamp`/`TimerError::InvalidRange` for bad input, and
    /// `TimerError::ManualSubmit` if the repository call fails. The state is
    /// unchanged on error.
    pub async fn submit_manual_session(
        &mut self,
        form: &SessionForm,
    ) -> Result<ReadingSession, TimerError> {
        if !matches!(self.state, State::Idle | State::ManualEntry) {
            return Err(TimerError::ConflictingMode);
        }
        let new = form.resolve(self.zone)?;

        let created = self
            .bounded(self.repo.create_session(&new))
            .await
            .map_err(|e| {
                tracing::warn!(
                    book_id = %form.book_id,
                    error = %e,
                    "failed to save manual session"
                );
                TimerError::ManualSubmit(e)
            })?;
        self.state = State::Idle;
        tracing::info!(
            book_id = %form.book_id,
            minutes = created.duration_minutes(),
            "manual session saved"
        );
        Ok(created)
    }
}
