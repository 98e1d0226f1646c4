use thiserror::Error;

use crate::model::{BookId, NewSession, SessionModelError};
use crate::time::{LocalTimeError, Zone, parse_local_datetime};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionFormError {
    #[error(transparent)]
    InvalidTimestamp(#[from] LocalTimeError),

    #[error("end time must not be before start time")]
    InvalidRange,
}

impl From<SessionModelError> for SessionFormError {
    fn from(_: SessionModelError) -> Self {
        Self::InvalidRange
    }
}

/// Values a person typed into a session form.
///
/// `start` and `end` are wall-clock `YYYY-MM-DDTHH:MM` strings with no zone;
/// they only become instants once resolved against a `Zone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionForm {
    pub book_id: BookId,
    pub start: String,
    pub end: String,
    pub pages_read: Option<u32>,
    pub notes: String,
}

impl SessionForm {
    #[must_use]
    pub fn new(book_id: BookId, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            book_id,
            start: start.into(),
            end: end.into(),
            pages_read: None,
            notes: String::new(),
        }
    }

    #[must_use]
    pub fn with_pages(mut self, pages_read: u32) -> Self {
        self.pages_read = Some(pages_read);
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Convert the wall-clock values to instants in `zone` and validate the range.
    ///
    /// # Errors
    ///
    /// Returns `SessionFormError::InvalidTimestamp` when either value cannot be parsed
    /// or does not exist in `zone`, and `SessionFormError::InvalidRange` when the end
    /// precedes the start.
    pub fn resolve(&self, zone: Zone) -> Result<NewSession, SessionFormError> {
        let start = parse_local_datetime(&self.start, zone)?;
        let end = parse_local_datetime(&self.end, zone)?;
        let session = NewSession::new(
            self.book_id,
            start,
            Some(end),
            self.pages_read,
            self.notes.clone(),
        )?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReadingSession, SessionId};
    use crate::time::LocalInstant;

    #[test]
    fn resolves_ninety_minute_entry() {
        let form = SessionForm::new(BookId::new(4), "2025-07-05T09:00", "2025-07-05T10:30")
            .with_pages(40);
        let new = form.resolve(Zone::utc()).unwrap();
        let session = ReadingSession::from_new(SessionId::new(1), new);
        assert_eq!(session.duration_minutes(), 90);
        assert_eq!(session.pages_read(), Some(40));
    }

    #[test]
    fn offset_shifts_both_ends_equally() {
        let zone = Zone::from_offset_minutes(-300).unwrap();
        let new = SessionForm::new(BookId::new(4), "2025-07-05T23:00", "2025-07-06T00:15")
            .resolve(zone)
            .unwrap();
        assert_eq!(new.start_time().to_rfc3339(), "2025-07-06T04:00:00+00:00");
        assert_eq!(
            new.end_time().map(|t| t.to_rfc3339()).as_deref(),
            Some("2025-07-06T05:15:00+00:00")
        );
    }

    #[test]
    fn end_before_start_is_invalid_range() {
        let err = SessionForm::new(BookId::new(4), "2025-07-05T10:30", "2025-07-05T09:00")
            .resolve(Zone::utc())
            .unwrap_err();
        assert_eq!(err, SessionFormError::InvalidRange);
    }

    #[test]
    fn missing_value_is_invalid_timestamp() {
        let err = SessionForm::new(BookId::new(4), "", "2025-07-05T09:00")
            .resolve(Zone::utc())
            .unwrap_err();
        assert!(matches!(err, SessionFormError::InvalidTimestamp(_)));
    }

    #[test]
    fn dst_gap_surfaces_as_invalid_timestamp() {
        let gap = LocalInstant::Nonexistent
            .into_instant("2025-03-30T02:30")
            .unwrap_err();
        assert!(matches!(
            SessionFormError::from(gap),
            SessionFormError::InvalidTimestamp(LocalTimeError::Nonexistent { .. })
        ));
    }
}
