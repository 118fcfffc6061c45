//! Sustained-metric monitoring

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::FireContext;
use super::trigger::MonitorSpec;
use crate::metrics::MetricSource;

/// Edge-triggered breach tracking for one monitor schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Armed,
    Breaching {
        since: Instant,
    },
    /// Already fired for the current breach; waits for a sample below the
    /// threshold
    Cooldown,
}

impl MonitorState {
    /// Feeds one sample, returning `true` exactly when the schedule fires
    pub fn observe(&mut self, value: f64, threshold: f64, sustain: Duration, now: Instant) -> bool {
        if value < threshold {
            *self = MonitorState::Armed;
            return false;
        }

        let since = match *self {
            MonitorState::Cooldown => return false,
            MonitorState::Breaching { since } => since,
            MonitorState::Armed => now,
        };

        if now.duration_since(since) >= sustain {
            *self = MonitorState::Cooldown;
            true
        } else {
            *self = MonitorState::Breaching { since };
            false
        }
    }
}

/// Polls `metrics` until `cancel` fires
pub(crate) async fn run_monitor(
    spec: MonitorSpec,
    metrics: Arc<dyn MetricSource>,
    context: FireContext,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(spec.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut state = MonitorState::Armed;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Monitor for '{}' cancelled", context.pipeline);
                return;
            }
            _ = ticker.tick() => {}
        }

        let value = match metrics.sample(spec.metric) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to sample {}: {:#}", spec.metric, e);
                continue;
            }
        };

        if state.observe(value, spec.threshold, spec.sustain, Instant::now()) {
            context.log(&format!(
                "Monitor triggered: {} usage = {:.1}%, threshold = {}% (pipeline {})",
                spec.metric, value, spec.threshold, context.pipeline
            ));
            if !context.fire() {
                return;
            }
        }
    }
}
