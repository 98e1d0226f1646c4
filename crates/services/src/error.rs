//! Shared error types for the services crate.

use thiserror::Error;

use reading_core::model::{SessionFormError, SessionId};
use reading_core::organize::OrganizeError;
use reading_core::time::LocalTimeError;
use storage::repository::StorageError;

/// Errors emitted by `SessionTimer`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TimerError {
    #[error("another timing mode is already in progress")]
    ConflictingMode,
    #[error("countdown duration must be a positive number of minutes")]
    InvalidDuration,
    #[error("end time must not be before start time")]
    InvalidRange,
    #[error(transparent)]
    InvalidTimestamp(LocalTimeError),
    #[error("no session is running")]
    NotRunning,
    #[error("could not start session: {0}")]
    SessionStart(#[source] StorageError),
    #[error("could not end session: {0}")]
    SessionEnd(#[source] StorageError),
    #[error("could not cancel session: {0}")]
    SessionCancel(#[source] StorageError),
    #[error("could not save manual session: {0}")]
    ManualSubmit(#[source] StorageError),
}

impl From<SessionFormError> for TimerError {
    fn from(e: SessionFormError) -> Self {
        match e {
            SessionFormError::InvalidTimestamp(inner) => Self::InvalidTimestamp(inner),
            _ => Self::InvalidRange,
        }
    }
}

/// Errors emitted by `SessionHistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("could not load sessions: {0}")]
    Load(#[source] StorageError),
    #[error("could not delete session: {0}")]
    Delete(#[source] StorageError),
    #[error("could not restore session: {0}")]
    Undo(#[source] StorageError),
    #[error("could not update session: {0}")]
    Update(#[source] StorageError),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("session {0} is not on the current page")]
    NotOnPage(SessionId),
    #[error("page {page} is out of range")]
    PageOutOfRange { page: u32 },
    #[error(transparent)]
    InvalidForm(#[from] SessionFormError),
    #[error(transparent)]
    InvalidPage(#[from] OrganizeError),
}
