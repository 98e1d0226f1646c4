mod form;
mod ids;
mod session;

pub use form::{SessionForm, SessionFormError};
pub use ids::{BookId, ParseIdError, SessionId};
pub use session::{NewSession, ReadingSession, SessionModelError};
