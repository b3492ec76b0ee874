use thiserror::Error;

use crate::lock::RequesterKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("requester kind {0} is not registered")]
    Unregistered(RequesterKind),
    #[error("priority of {0} must be positive")]
    InvalidPriority(RequesterKind),
}
