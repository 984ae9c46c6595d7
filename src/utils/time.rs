use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Unix time in whole seconds, 0 if the clock is before the epoch
pub(crate) fn unix_now() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(_) => 0,
    }
}
