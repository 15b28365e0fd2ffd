//! Cooperative shutdown helpers shared by the gateway and the monitor.
//!
//! Both binaries stop by clearing one `Arc<AtomicBool>` that every loop
//! checks.  Long waits go through [`pause`] so a cleared flag is noticed
//! within one slice instead of after a whole interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Longest single sleep inside [`pause`].
pub const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Sleeps for `duration`, returning early once `running` is cleared.
///
/// Returns `true` if the process is still running afterwards.
pub async fn pause(duration: Duration, running: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(PAUSE_SLICE);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    running.load(Ordering::Relaxed)
}
