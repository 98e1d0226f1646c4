#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use reading_core::model::{BookId, NewSession, ReadingSession, SessionId};
use storage::repository::{InMemoryRepository, SessionPage, SessionRepository, StorageError};

/// Wraps the in-memory repository to count calls and inject failures.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: InMemoryRepository,
    calls: AtomicUsize,
    fail_next: AtomicUsize,
    stall: AtomicBool,
}

impl FlakyRepository {
    pub fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next `n` calls with a connection error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make every call hang until the caller gives up.
    pub fn stall(&self, on: bool) {
        self.stall.store(on, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Connection("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for FlakyRepository {
    async fn start_session(&self, book_id: BookId) -> Result<ReadingSession, StorageError> {
        self.gate().await?;
        self.inner.start_session(book_id).await
    }

    async fn end_session(
        &self,
        id: SessionId,
        pages_read: Option<u32>,
        notes: &str,
    ) -> Result<ReadingSession, StorageError> {
        self.gate().await?;
        self.inner.end_session(id, pages_read, notes).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        self.gate().await?;
        self.inner.delete_session(id).await
    }

    async fn create_session(&self, session: &NewSession) -> Result<ReadingSession, StorageError> {
        self.gate().await?;
        self.inner.create_session(session).await
    }

    async fn update_session(
        &self,
        id: SessionId,
        session: &NewSession,
    ) -> Result<ReadingSession, StorageError> {
        self.gate().await?;
        self.inner.update_session(id, session).await
    }

    async fn list_sessions(&self, page: u32, page_size: u32) -> Result<SessionPage, StorageError> {
        self.gate().await?;
        self.inner.list_sessions(page, page_size).await
    }
}
