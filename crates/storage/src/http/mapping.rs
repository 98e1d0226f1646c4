//! Wire shapes of the reading-session REST API.
//!
//! These mirror the JSON the server speaks so serde stays out of the domain model.

use chrono::{DateTime, Utc};
use reading_core::model::{BookId, NewSession, ReadingSession, SessionId};
use serde::{Deserialize, Serialize};

use crate::repository::{SessionPage, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// A session as the API returns it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionRecord {
    pub id: u64,
    pub book: u64,
    #[serde(default)]
    pub book_title: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pages_read: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SessionRecord {
    /// Convert the record into a validated domain session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the record's times are inverted.
    pub fn into_session(self) -> Result<ReadingSession, StorageError> {
        let session = ReadingSession::from_persisted(
            SessionId::new(self.id),
            BookId::new(self.book),
            self.start_time,
            self.end_time,
            self.pages_read,
            self.notes.unwrap_or_default(),
        )
        .map_err(ser)?;
        Ok(match self.book_title {
            Some(title) => session.with_book_title(title),
            None => session,
        })
    }
}

/// List responses are paginated, but an unpaginated deployment answers with a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse {
    Paged {
        results: Vec<SessionRecord>,
        count: u64,
    },
    Plain(Vec<SessionRecord>),
}

impl ListResponse {
    pub fn into_page(self) -> Result<SessionPage, StorageError> {
        let (records, count) = match self {
            ListResponse::Paged { results, count } => (results, count),
            ListResponse::Plain(results) => {
                let count = results.len() as u64;
                (results, count)
            }
        };
        let results = records
            .into_iter()
            .map(SessionRecord::into_session)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SessionPage { results, count })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StartPayload {
    pub book: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct EndPayload<'a> {
    pub pages_read: Option<u32>,
    pub notes: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionPayload<'a> {
    pub book: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub pages_read: Option<u32>,
    pub notes: &'a str,
}

impl<'a> SessionPayload<'a> {
    pub fn from_new(session: &'a NewSession) -> Self {
        Self {
            book: session.book_id().value(),
            start_time: session.start_time(),
            end_time: session.end_time(),
            pages_read: session.pages_read(),
            notes: session.notes(),
        }
    }
}
