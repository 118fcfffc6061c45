//! Calendar and fixed-period timers

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::FireContext;

/// Fires every `period`, starting one period from now
pub(crate) async fn run_interval(period: Duration, context: FireContext, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Interval timer for '{}' cancelled", context.pipeline);
                return;
            }
            _ = ticker.tick() => {
                if !context.fire() {
                    return;
                }
            }
        }
    }
}

/// Fires at each upcoming time of `schedule`, in local time
pub(crate) async fn run_cron(
    schedule: Box<cron::Schedule>,
    context: FireContext,
    cancel: CancellationToken,
) {
    let mut last_fire: Option<DateTime<Local>> = None;

    loop {
        let now = Local::now();
        let from = match last_fire {
            Some(last) if last > now => last,
            _ => now,
        };
        let Some(next) = schedule.after(&from).next() else {
            warn!("Cron schedule for '{}' has no upcoming times", context.pipeline);
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!("Next run of '{}' at {}", context.pipeline, next);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Cron timer for '{}' cancelled", context.pipeline);
                return;
            }
            _ = tokio::time::sleep(wait) => {
                last_fire = Some(next);
                if !context.fire() {
                    return;
                }
            }
        }
    }
}
