use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::{BookId, SessionId};
use crate::time::{elapsed_minutes, elapsed_seconds};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionModelError {
    #[error("end_time is before start_time")]
    InvalidTimeRange,

    #[error("session is already finished")]
    AlreadyFinished,
}

//
// ─── NEW SESSION ───────────────────────────────────────────────────────────────
//

/// Validated payload for creating (or fully replacing) a session in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    book_id: BookId,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    pages_read: Option<u32>,
    notes: String,
}

impl NewSession {
    /// # Errors
    ///
    /// Returns `SessionModelError::InvalidTimeRange` if `end_time` is before `start_time`.
    pub fn new(
        book_id: BookId,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        pages_read: Option<u32>,
        notes: impl Into<String>,
    ) -> Result<Self, SessionModelError> {
        check_range(start_time, end_time)?;
        Ok(Self {
            book_id,
            start_time,
            end_time,
            pages_read,
            notes: notes.into(),
        })
    }

    #[must_use]
    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    #[must_use]
    pub fn pages_read(&self) -> Option<u32> {
        self.pages_read
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }
}

fn check_range(
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
) -> Result<(), SessionModelError> {
    match end_time {
        Some(end) if end < start_time => Err(SessionModelError::InvalidTimeRange),
        _ => Ok(()),
    }
}

//
// ─── READING SESSION ───────────────────────────────────────────────────────────
//

/// One recorded interval of reading tied to a book.
///
/// A session without `end_time` is still in progress and has no duration yet;
/// every duration helper reports zero for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingSession {
    id: Option<SessionId>,
    book_id: BookId,
    book_title: Option<String>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    pages_read: Option<u32>,
    notes: String,
}

impl ReadingSession {
    /// An in-progress session that has not been persisted yet.
    #[must_use]
    pub fn started(book_id: BookId, start_time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            book_id,
            book_title: None,
            start_time,
            end_time: None,
            pages_read: None,
            notes: String::new(),
        }
    }

    /// Rehydrate a session from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::InvalidTimeRange` if `end_time` is before `start_time`.
    pub fn from_persisted(
        id: SessionId,
        book_id: BookId,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        pages_read: Option<u32>,
        notes: impl Into<String>,
    ) -> Result<Self, SessionModelError> {
        check_range(start_time, end_time)?;
        Ok(Self {
            id: Some(id),
            book_id,
            book_title: None,
            start_time,
            end_time,
            pages_read,
            notes: notes.into(),
        })
    }

    /// Materialize a validated payload under a freshly assigned id.
    #[must_use]
    pub fn from_new(id: SessionId, new: NewSession) -> Self {
        Self {
            id: Some(id),
            book_id: new.book_id,
            book_title: None,
            start_time: new.start_time,
            end_time: new.end_time,
            pages_read: new.pages_read,
            notes: new.notes,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_book_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.book_title = (!title.trim().is_empty()).then_some(title);
        self
    }

    /// Close an in-progress session.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::AlreadyFinished` if the session has an end time,
    /// or `SessionModelError::InvalidTimeRange` if `end_time` precedes the start.
    pub fn finish(
        &mut self,
        end_time: DateTime<Utc>,
        pages_read: Option<u32>,
        notes: impl Into<String>,
    ) -> Result<(), SessionModelError> {
        if self.end_time.is_some() {
            return Err(SessionModelError::AlreadyFinished);
        }
        check_range(self.start_time, Some(end_time))?;
        self.end_time = Some(end_time);
        self.pages_read = pages_read;
        self.notes = notes.into();
        Ok(())
    }

    /// Payload that re-creates this session (minus its id) in one call.
    #[must_use]
    pub fn to_new_session(&self) -> NewSession {
        NewSession {
            book_id: self.book_id,
            start_time: self.start_time,
            end_time: self.end_time,
            pages_read: self.pages_read,
            notes: self.notes.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    #[must_use]
    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    #[must_use]
    pub fn book_title(&self) -> Option<&str> {
        self.book_title.as_deref()
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    #[must_use]
    pub fn pages_read(&self) -> Option<u32> {
        self.pages_read
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        self.end_time
            .map_or(0, |end| elapsed_seconds(self.start_time, end))
    }

    /// Whole minutes, truncated per session.
    #[must_use]
    pub fn duration_minutes(&self) -> i64 {
        self.end_time
            .map_or(0, |end| elapsed_minutes(self.start_time, end))
    }

    /// Length of the notes in characters.
    #[must_use]
    pub fn notes_length(&self) -> usize {
        self.notes.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn rejects_end_before_start() {
        let now = fixed_now();
        let err = NewSession::new(BookId::new(1), now, Some(now - Duration::minutes(1)), None, "")
            .unwrap_err();
        assert_eq!(err, SessionModelError::InvalidTimeRange);

        let err = ReadingSession::from_persisted(
            SessionId::new(1),
            BookId::new(1),
            now,
            Some(now - Duration::seconds(1)),
            None,
            "",
        )
        .unwrap_err();
        assert_eq!(err, SessionModelError::InvalidTimeRange);
    }

    #[test]
    fn active_session_has_zero_duration() {
        let session = ReadingSession::started(BookId::new(1), fixed_now());
        assert!(session.is_active());
        assert_eq!(session.duration(), None);
        assert_eq!(session.duration_minutes(), 0);
        assert_eq!(session.duration_seconds(), 0);
    }

    #[test]
    fn finish_closes_once() {
        let now = fixed_now();
        let mut session = ReadingSession::started(BookId::new(1), now);
        session
            .finish(now + Duration::minutes(45), Some(12), "good chapter")
            .unwrap();
        assert_eq!(session.duration_minutes(), 45);
        assert_eq!(session.pages_read(), Some(12));
        assert_eq!(session.notes_length(), 12);

        let err = session.finish(now + Duration::minutes(50), None, "").unwrap_err();
        assert_eq!(err, SessionModelError::AlreadyFinished);
    }

    #[test]
    fn to_new_session_drops_id_only() {
        let now = fixed_now();
        let session = ReadingSession::from_persisted(
            SessionId::new(9),
            BookId::new(2),
            now,
            Some(now + Duration::minutes(30)),
            Some(10),
            "notes",
        )
        .unwrap();
        let recreated = ReadingSession::from_new(SessionId::new(10), session.to_new_session());
        assert_eq!(recreated.id(), Some(SessionId::new(10)));
        assert_eq!(recreated.book_id(), session.book_id());
        assert_eq!(recreated.duration_minutes(), 30);
        assert_eq!(recreated.notes(), "notes");
    }

    #[test]
    fn blank_title_is_ignored() {
        let session = ReadingSession::started(BookId::new(1), fixed_now()).with_book_title("  ");
        assert_eq!(session.book_title(), None);
    }
}
