use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current UNIX timestamp in whole seconds.
pub fn current_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before UNIX epoch")
        .as_secs()
}

/// Returns the current UNIX timestamp in milliseconds, used for heartbeat
/// freshness checks (spec §4.3) and reservation/transfer timestamps.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before UNIX epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_time_ms_is_monotonic_enough() {
        let t1 = current_time_ms();
        let t2 = current_time_ms();
        assert!(t2 >= t1);
    }

    #[test]
    fn current_time_nonzero() {
        assert!(current_time() > 0);
    }
}
