mod error;
mod priority_lock;

pub use error::LockError;
pub use priority_lock::{Acquire, LockNotice, PriorityLock, Requester, RequesterKind};
