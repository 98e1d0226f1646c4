#![forbid(unsafe_code)]

pub mod http;
pub mod repository;

pub use http::{ApiConfig, HttpInitError, HttpSessionRepository};
pub use repository::{InMemoryRepository, SessionPage, SessionRepository, StorageError};
