//! Exponential backoff for peer reconnection and invoice-subscription retry
//! loops.

use std::time::Duration;

/// Returns an infinite iterator of exponentially increasing durations,
/// starting at 250ms and capping at 10s, with +/-20% jitter to avoid
/// thundering-herd reconnects.
pub fn get_backoff_iter() -> impl Iterator<Item = Duration> {
    const BASE: Duration = Duration::from_millis(250);
    const MAX: Duration = Duration::from_secs(10);
    const MULTIPLIER: f64 = 1.5;

    let mut current = BASE;
    std::iter::from_fn(move || {
        let this = current;
        let next_millis = (current.as_millis() as f64 * MULTIPLIER) as u64;
        current = Duration::from_millis(next_millis).min(MAX);

        let jitter_pct = 0.8 + 0.4 * deterministic_jitter();
        let jittered_millis = (this.as_millis() as f64 * jitter_pct) as u64;
        Some(Duration::from_millis(jittered_millis))
    })
}

/// A cheap, non-cryptographic jitter source. We avoid pulling in `rand` here
/// since this value only needs to scatter reconnect timing, not be
/// unpredictable.
fn deterministic_jitter() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}
