//! Lock-retry for store writes
//!
//! Repository workers merge into the same SQLite file concurrently, so a
//! write transaction may find the file busy. Such attempts are repeated with
//! doubling backoff until the store's lock wait budget is spent; any other
//! error is returned at once.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::{Error, Result};

const FIRST_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Run `operation` until it succeeds, fails with a non-lock error, or
/// `max_wait_ms` has elapsed since the first attempt
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let budget = Duration::from_millis(max_wait_ms);
    let mut backoff = FIRST_BACKOFF;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts,
                        waited_ms = started.elapsed().as_millis(),
                        "Store write went through after lock contention"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_error() => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= budget {
            error!(
                operation = operation_name,
                attempts,
                waited_ms = waited.as_millis(),
                error = %err,
                "Store still locked, giving up"
            );
            return Err(Error::Internal(format!(
                "{}: store locked for {} ms after {} attempts",
                operation_name,
                waited.as_millis(),
                attempts
            )));
        }

        warn!(
            operation = operation_name,
            attempts,
            backoff_ms = backoff.as_millis(),
            "Store locked, backing off"
        );
        tokio::time::sleep(backoff.min(budget - waited)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
