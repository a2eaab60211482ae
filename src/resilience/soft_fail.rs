//! Best-effort combinators.
//!
//! Cache reads and writes, stored-token decryption and intermediate upstream
//! lookups may fail without failing the request. Failures are logged at warn
//! and turned into `None`.

use std::fmt::Display;
use std::future::Future;

/// Await `operation`, turning an error into `None` after logging it.
pub async fn soft_fail<T, E, Fut>(operation: &str, fut: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    soft_fail_sync(operation, fut.await)
}

/// Synchronous counterpart of [`soft_fail`].
pub fn soft_fail_sync<T, E>(operation: &str, result: Result<T, E>) -> Option<T>
where
    E: Display,
{
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(operation, %error, "Best-effort operation failed, continuing");
            None
        }
    }
}
