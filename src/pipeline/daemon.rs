//! Fixed-interval cycle loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::Pipeline;

/// Runs cycles back to back with `interval` between them until `cancel`
/// fires.
///
/// A running cycle is always finished; cancellation is only observed while
/// waiting for the next one. Returns the number of completed cycles.
pub async fn run_daemon(pipeline: &Pipeline, interval: Duration, cancel: CancellationToken) -> usize {
    let mut cycles = 0usize;
    while !cancel.is_cancelled() {
        let stats = pipeline.run_cycle().await;
        cycles += 1;
        log::info!(
            "Daemon cycle {cycles} done ({} alive, {} saved); next in {}s",
            stats.alive,
            stats.saved,
            interval.as_secs()
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    log::info!("Daemon stopped after {cycles} cycles");
    cycles
}
