use async_trait::async_trait;
use chrono::Duration;
use reading_core::Clock;
use reading_core::model::{BookId, NewSession, ReadingSession, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("request timed out")]
    Timeout,
}

/// One page of the session collection plus the collection's total size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPage {
    pub results: Vec<ReadingSession>,
    pub count: u64,
}

/// Repository contract for reading sessions.
///
/// The backing store assigns ids and stamps `now` for start/end; callers never
/// send their own clock for those two operations.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Open a new session for `book_id` starting now.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the book is unknown, or other storage errors.
    async fn start_session(&self, book_id: BookId) -> Result<ReadingSession, StorageError>;

    /// Close a session with `end_time = now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing, or other storage errors.
    async fn end_session(
        &self,
        id: SessionId,
        pages_read: Option<u32>,
        notes: &str,
    ) -> Result<ReadingSession, StorageError>;

    /// Remove a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing, or other storage errors.
    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError>;

    /// Create a complete session in one call.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn create_session(&self, session: &NewSession) -> Result<ReadingSession, StorageError>;

    /// Replace every field of an existing session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing, or other storage errors.
    async fn update_session(
        &self,
        id: SessionId,
        session: &NewSession,
    ) -> Result<ReadingSession, StorageError>;

    /// Fetch one page (1-based) of sessions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for a page past the end, or other storage errors.
    async fn list_sessions(&self, page: u32, page_size: u32) -> Result<SessionPage, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    clock: Clock,
    next_id: u64,
    sessions: Vec<ReadingSession>,
    titles: HashMap<BookId, String>,
}

impl MemoryState {
    fn assign_id(&mut self) -> SessionId {
        self.next_id += 1;
        SessionId::new(self.next_id)
    }

    fn titled(&self, session: ReadingSession) -> ReadingSession {
        match self.titles.get(&session.book_id()) {
            Some(title) => session.with_book_title(title.clone()),
            None => session,
        }
    }

    fn position(&self, id: SessionId) -> Result<usize, StorageError> {
        self.sessions
            .iter()
            .position(|s| s.id() == Some(id))
            .ok_or(StorageError::NotFound)
    }
}

/// Simple in-memory repository implementation for testing and offline use.
///
/// Sessions are listed in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository whose "server time" comes from `clock`.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        let repo = Self::new();
        if let Ok(mut state) = repo.state.lock() {
            state.clock = clock;
        }
        repo
    }

    /// Advance the repository clock (fixed clocks only).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn advance(&self, delta: Duration) -> Result<(), StorageError> {
        self.lock()?.clock.advance(delta);
        Ok(())
    }

    /// Attach a title to every record returned for `book_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn register_book(
        &self,
        book_id: BookId,
        title: impl Into<String>,
    ) -> Result<(), StorageError> {
        self.lock()?.titles.insert(book_id, title.into());
        Ok(())
    }

    /// Snapshot of every stored session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn all(&self) -> Result<Vec<ReadingSession>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .sessions
            .iter()
            .map(|s| state.titled(s.clone()))
            .collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn start_session(&self, book_id: BookId) -> Result<ReadingSession, StorageError> {
        let mut state = self.lock()?;
        let id = state.assign_id();
        let session = ReadingSession::started(book_id, state.clock.now()).with_id(id);
        state.sessions.push(session.clone());
        Ok(state.titled(session))
    }

    async fn end_session(
        &self,
        id: SessionId,
        pages_read: Option<u32>,
        notes: &str,
    ) -> Result<ReadingSession, StorageError> {
        let mut state = self.lock()?;
        let now = state.clock.now();
        let i = state.position(id)?;
        state.sessions[i]
            .finish(now, pages_read, notes)
            .map_err(|_| StorageError::Conflict)?;
        let session = state.sessions[i].clone();
        Ok(state.titled(session))
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let i = state.position(id)?;
        state.sessions.remove(i);
        Ok(())
    }

    async fn create_session(&self, session: &NewSession) -> Result<ReadingSession, StorageError> {
        let mut state = self.lock()?;
        let id = state.assign_id();
        let created = ReadingSession::from_new(id, session.clone());
        state.sessions.push(created.clone());
        Ok(state.titled(created))
    }

    async fn update_session(
        &self,
        id: SessionId,
        session: &NewSession,
    ) -> Result<ReadingSession, StorageError> {
        let mut state = self.lock()?;
        let i = state.position(id)?;
        let updated = ReadingSession::from_new(id, session.clone());
        state.sessions[i] = updated.clone();
        Ok(state.titled(updated))
    }

    async fn list_sessions(&self, page: u32, page_size: u32) -> Result<SessionPage, StorageError> {
        if page == 0 || page_size == 0 {
            return Err(StorageError::NotFound);
        }
        let state = self.lock()?;
        let count = state.sessions.len();
        let size = usize::try_from(page_size).unwrap_or(usize::MAX);
        let offset = usize::try_from(page - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(size);
        // An empty collection still has a (blank) first page.
        if offset >= count && page > 1 {
            return Err(StorageError::NotFound);
        }
        let results = state
            .sessions
            .iter()
            .skip(offset)
            .take(size)
            .map(|s| state.titled(s.clone()))
            .collect();
        Ok(SessionPage {
            results,
            count: count as u64,
        })
    }
}
