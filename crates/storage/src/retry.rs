//! Bounded retry with exponential backoff for transient store failures

use crate::{StorageError, StorageResult};
use std::time::Duration;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_millis(10);

/// Retry `op` on transient failures; any other error passes through.
/// Exhaustion escalates to [`StorageError::RetriesExhausted`].
pub fn retry_backoff<T>(
    what: &str,
    mut op: impl FnMut() -> StorageResult<T>,
) -> StorageResult<T> {
    let mut delay = BASE_DELAY;
    for attempt in 1..=MAX_ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(StorageError::Transient(reason)) => {
                if attempt == MAX_ATTEMPTS {
                    warn!(what, attempt, reason, "transient storage failure, giving up");
                    return Err(StorageError::RetriesExhausted {
                        what: what.to_string(),
                        attempts: MAX_ATTEMPTS,
                    });
                }
                warn!(what, attempt, reason, "transient storage failure, retrying");
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(other) => return Err(other),
        }
    }
    unreachable!("retry loop returns on the final attempt")
}
