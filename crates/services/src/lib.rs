#![forbid(unsafe_code)]

pub mod error;
pub mod history;
pub mod timer;

pub use reading_core::{Clock, Zone};

pub use error::{HistoryError, TimerError};
pub use history::{DEFAULT_PAGE_SIZE, PAGE_SIZE_CHOICES, SessionHistoryService};
pub use timer::{
    COUNTDOWN_PRESETS, DEFAULT_REQUEST_TIMEOUT, SessionDraft, SessionTimer, TimerEvent, TimerMode,
    TimerPhase,
};
