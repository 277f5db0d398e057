//! Shared helpers for the integration tests

#![allow(dead_code)] // each test binary uses a different subset

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};

/// How long a test waits on the acquisition thread before giving up
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `condition` until it holds or [`SETTLE_TIMEOUT`] passes
///
/// Returns whether the condition was met.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Assert two floats are within `epsilon` of each other
pub fn assert_float_eq(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "{} differs from {} by more than {}",
        actual,
        expected,
        epsilon
    );
}
