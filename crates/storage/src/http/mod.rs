use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reading_core::model::{BookId, NewSession, ReadingSession, SessionId};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::repository::{SessionPage, SessionRepository, StorageError};

mod mapping;

use mapping::{EndPayload, ListResponse, SessionPayload, SessionRecord, StartPayload};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SESSIONS_PATH: &str = "/api/reading-sessions/";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    /// Read `READING_API_BASE_URL`, `READING_API_TOKEN` and `READING_API_TIMEOUT_SECS`.
    ///
    /// Missing or unparsable values fall back to the defaults; a blank token means
    /// unauthenticated requests.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("READING_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let token = env::var("READING_API_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let timeout = env::var("READING_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Self {
            base_url,
            token,
            timeout,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}{SESSIONS_PATH}", self.base_url.trim_end_matches('/'))
    }

    fn session_url(&self, id: SessionId, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}{}/{action}/", self.collection_url(), id.value()),
            None => format!("{}{}/", self.collection_url(), id.value()),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpInitError {
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

/// `SessionRepository` backed by the reading-session REST API.
#[derive(Clone)]
pub struct HttpSessionRepository {
    client: Client,
    config: ApiConfig,
}

impl HttpSessionRepository {
    /// Build a client for the API described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `HttpInitError` if the TLS backend cannot be initialised.
    pub fn new(config: ApiConfig) -> Result<Self, HttpInitError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => {
                request.header(reqwest::header::AUTHORIZATION, format!("Token {token}"))
            }
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), %message, "reading api rejected request");
        Err(status_error(status, message))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StorageError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                StorageError::Serialization(e.to_string())
            } else {
                transport_error(e)
            }
        })
    }

    async fn session(&self, request: RequestBuilder) -> Result<ReadingSession, StorageError> {
        let response = self.send(request).await?;
        Self::decode::<SessionRecord>(response).await?.into_session()
    }
}

fn transport_error(e: reqwest::Error) -> StorageError {
    tracing::warn!(error = %e, "reading api request failed");
    if e.is_timeout() {
        StorageError::Timeout
    } else if e.is_decode() {
        StorageError::Serialization(e.to_string())
    } else {
        StorageError::Connection(e.to_string())
    }
}

fn status_error(status: StatusCode, message: String) -> StorageError {
    match status {
        StatusCode::NOT_FOUND => StorageError::NotFound,
        StatusCode::CONFLICT => StorageError::Conflict,
        _ => StorageError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl SessionRepository for HttpSessionRepository {
    async fn start_session(&self, book_id: BookId) -> Result<ReadingSession, StorageError> {
        let url = format!("{}start/", self.config.collection_url());
        let request = self.client.post(url).json(&StartPayload {
            book: book_id.value(),
        });
        self.session(request).await
    }

    async fn end_session(
        &self,
        id: SessionId,
        pages_read: Option<u32>,
        notes: &str,
    ) -> Result<ReadingSession, StorageError> {
        let url = self.config.session_url(id, Some("end"));
        let request = self
            .client
            .post(url)
            .json(&EndPayload { pages_read, notes });
        self.session(request).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let url = self.config.session_url(id, None);
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn create_session(&self, session: &NewSession) -> Result<ReadingSession, StorageError> {
        let request = self
            .client
            .post(self.config.collection_url())
            .json(&SessionPayload::from_new(session));
        self.session(request).await
    }

    async fn update_session(
        &self,
        id: SessionId,
        session: &NewSession,
    ) -> Result<ReadingSession, StorageError> {
        let request = self
            .client
            .put(self.config.session_url(id, None))
            .json(&SessionPayload::from_new(session));
        self.session(request).await
    }

    async fn list_sessions(&self, page: u32, page_size: u32) -> Result<SessionPage, StorageError> {
        let request = self
            .client
            .get(self.config.collection_url())
            .query(&[("page", page), ("page_size", page_size)]);
        let response = self.send(request).await?;
        Self::decode::<ListResponse>(response).await?.into_page()
    }
}
