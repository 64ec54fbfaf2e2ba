use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use crate::config::ScheduleConfig;
use crate::discovery::CycleSummary;

/// When discovery cycles run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A single cycle, then exit
    Once,
    /// A cycle at startup and then on every tick, until cancelled
    Every(Duration),
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        match config.interval() {
            Some(period) => Schedule::Every(period),
            None => Schedule::Once,
        }
    }
}

/// Drive `cycle` according to `schedule`. Returns the number of completed cycles.
///
/// Cycles never overlap: a tick that falls due while a cycle is running is
/// delayed until it finishes. A failing first cycle is returned as an error;
/// later failures are logged and the next tick tries again.
pub async fn run<F, Fut>(schedule: Schedule, cancel: CancellationToken, mut cycle: F) -> Result<usize>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<CycleSummary>>,
{
    let period = match schedule {
        Schedule::Once => {
            cycle().await?;
            return Ok(1);
        }
        Schedule::Every(period) => period,
    };

    tracing::info!("Running discovery every {}s", period.as_secs());

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0usize;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel.cancelled() => {
                tracing::info!("Discovery schedule stopped");
                break;
            }
        }

        match cycle().await {
            Ok(_) => completed += 1,
            Err(e) if completed == 0 => return Err(e),
            Err(e) => tracing::error!("Discovery cycle failed: {:#}", e),
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    Ok(completed)
}
