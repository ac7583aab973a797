//! Filesystem and validation helpers.
//!
//! - **Atomic writes**: temp file + fsync + rename, so a feed is never left half-written
//! - **Feed lock**: exclusive advisory lock serializing load-merge-save runs
//! - **URL validation**: scheme checks for configured endpoints and asset links

mod fs;
mod lock;
mod url_check;

pub use fs::atomic_write;
pub use lock::{FeedLock, LockError};
pub use url_check::{validate_http_url, UrlValidationError};
