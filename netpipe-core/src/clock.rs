//! Monotonic clock used for endpoint activity timestamps.

use std::sync::OnceLock;
use std::time::Instant;

/// Start of the clock, fixed at the first query.
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Returns the number of seconds elapsed since the first clock query of the
/// process.
///
/// The value is derived from [std::time::Instant], so it never decreases and
/// is unaffected by wall-clock adjustments.
pub fn now() -> f32 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f32()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_never_goes_backwards() {
        let mut prev = now();
        for _ in 0..1_000 {
            let current = now();
            assert!(current >= prev);
            prev = current;
        }
    }

    #[test]
    fn clock_advances_across_sleep() {
        let before = now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let after = now();
        assert!(after > before);
    }
}
