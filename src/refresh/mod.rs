mod candidates;
mod coalesce;
mod refresher;

pub use candidates::{RefreshBodyShape, RefreshCandidate, DEFAULT_ACCESS_FIELDS, DEFAULT_REFRESH_FIELDS};
pub use coalesce::RefreshCoalescer;
pub use refresher::{RefreshError, RefreshState, Refresher, SESSION_EXPIRED_MESSAGE};
