use thiserror::Error;

use crate::model::{SessionFormError, SessionModelError};
use crate::organize::OrganizeError;
use crate::time::LocalTimeError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionModelError),
    #[error(transparent)]
    Form(#[from] SessionFormError),
    #[error(transparent)]
    LocalTime(#[from] LocalTimeError),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organize::GroupBy;

    #[test]
    fn wraps_module_errors() {
        let err: Error = "month".parse::<GroupBy>().unwrap_err().into();
        assert!(matches!(err, Error::Organize(OrganizeError::UnknownGroupBy(_))));
    }
}
