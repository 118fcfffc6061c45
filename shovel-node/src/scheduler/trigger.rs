//! Trigger construction from keyword arguments
//!
//! Schedules arrive as a trigger type plus loose `k=v` arguments, either
//! from the command line or from the configuration document. This module
//! validates them once and produces a typed [`Trigger`].

use serde_json::Value;
use shovel_core::domain::trigger::{Metric, TriggerArgs, TriggerKind, arg_to_string};
use std::str::FromStr;
use std::time::Duration;

use super::ScheduleError;

/// Cron fields, most significant first, with the value used when a field
/// less significant than every given field is left out
const CRON_FIELDS: [(&str, &str); 7] = [
    ("year", "*"),
    ("month", "1"),
    ("day", "1"),
    ("day_of_week", "*"),
    ("hour", "0"),
    ("minute", "0"),
    ("second", "0"),
];

const INTERVAL_UNITS: [(&str, f64); 5] = [
    ("weeks", 604_800.0),
    ("days", 86_400.0),
    ("hours", 3_600.0),
    ("minutes", 60.0),
    ("seconds", 1.0),
];

const MONITOR_KEYS: [&str; 4] = ["metric", "threshold", "duration", "interval"];

/// Parameters of a sustained-metric trigger
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSpec {
    pub metric: Metric,
    pub threshold: f64,
    pub sustain: Duration,
    pub poll_interval: Duration,
}

impl Default for MonitorSpec {
    fn default() -> Self {
        Self {
            metric: Metric::Cpu,
            threshold: 90.0,
            sustain: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// A validated firing policy
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron(Box<cron::Schedule>),
    Interval(Duration),
    Monitor(MonitorSpec),
}

impl Trigger {
    pub fn from_args(kind: TriggerKind, args: &TriggerArgs) -> Result<Self, ScheduleError> {
        match kind {
            TriggerKind::Cron => cron_schedule(args).map(|s| Trigger::Cron(Box::new(s))),
            TriggerKind::Interval => interval(args).map(Trigger::Interval),
            TriggerKind::Monitor => monitor(args).map(Trigger::Monitor),
        }
    }
}

/// Builds the seven-field expression (`sec min hour day month dow year`)
/// understood by the `cron` crate
pub(crate) fn cron_expression(args: &TriggerArgs) -> Result<String, ScheduleError> {
    reject_unknown(TriggerKind::Cron, args, CRON_FIELDS.iter().map(|(k, _)| *k))?;
    if args.is_empty() {
        return Err(ScheduleError::MissingArguments(TriggerKind::Cron));
    }

    let mut remaining = args.len();
    let mut defaults_apply = false;
    let mut values = std::collections::HashMap::new();

    for (field, default) in CRON_FIELDS {
        let value = match args.get(field) {
            Some(value) => {
                remaining -= 1;
                defaults_apply = remaining == 0;
                let text = arg_to_string(value);
                if text.is_empty() || text.chars().any(char::is_whitespace) {
                    return Err(ScheduleError::invalid(field, "expected a single cron token"));
                }
                text
            }
            None if defaults_apply => default.to_string(),
            None => "*".to_string(),
        };
        values.insert(field, value);
    }

    Ok(format!(
        "{} {} {} {} {} {} {}",
        values["second"],
        values["minute"],
        values["hour"],
        values["day"],
        values["month"],
        values["day_of_week"],
        values["year"]
    ))
}

fn cron_schedule(args: &TriggerArgs) -> Result<cron::Schedule, ScheduleError> {
    let expression = cron_expression(args)?;
    cron::Schedule::from_str(&expression).map_err(|e| ScheduleError::InvalidCron {
        expression,
        reason: e.to_string(),
    })
}

fn interval(args: &TriggerArgs) -> Result<Duration, ScheduleError> {
    reject_unknown(
        TriggerKind::Interval,
        args,
        INTERVAL_UNITS.iter().map(|(k, _)| *k),
    )?;

    let mut total = 0.0;
    for (unit, seconds) in INTERVAL_UNITS {
        if let Some(value) = args.get(unit) {
            let amount = number(unit, value)?;
            if amount < 0.0 {
                return Err(ScheduleError::invalid(unit, "must not be negative"));
            }
            total += amount * seconds;
        }
    }

    let period = duration_from_secs("interval", total)?;
    if period.is_zero() {
        return Err(ScheduleError::MissingArguments(TriggerKind::Interval));
    }
    Ok(period)
}

fn monitor(args: &TriggerArgs) -> Result<MonitorSpec, ScheduleError> {
    reject_unknown(TriggerKind::Monitor, args, MONITOR_KEYS)?;

    let mut spec = MonitorSpec::default();
    if let Some(value) = args.get("metric") {
        spec.metric = arg_to_string(value)
            .parse()
            .map_err(|e: String| ScheduleError::invalid("metric", &e))?;
    }
    if let Some(value) = args.get("threshold") {
        spec.threshold = number("threshold", value)?;
    }
    if let Some(value) = args.get("duration") {
        spec.sustain = seconds("duration", value)?;
    }
    if let Some(value) = args.get("interval") {
        spec.poll_interval = seconds("interval", value)?;
        if spec.poll_interval.is_zero() {
            return Err(ScheduleError::invalid("interval", "must be greater than 0"));
        }
    }
    Ok(spec)
}

fn reject_unknown<'a>(
    kind: TriggerKind,
    args: &TriggerArgs,
    allowed: impl IntoIterator<Item = &'a str>,
) -> Result<(), ScheduleError> {
    let allowed: Vec<&str> = allowed.into_iter().collect();
    match args.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(ScheduleError::UnknownArgument {
            trigger: kind,
            key: key.clone(),
        }),
        None => Ok(()),
    }
}

fn number(key: &str, value: &Value) -> Result<f64, ScheduleError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| ScheduleError::invalid(key, "expected a number"))
}

fn seconds(key: &str, value: &Value) -> Result<Duration, ScheduleError> {
    let secs = number(key, value)?;
    if secs < 0.0 {
        return Err(ScheduleError::invalid(key, "must not be negative"));
    }
    duration_from_secs(key, secs)
}

fn duration_from_secs(key: &str, secs: f64) -> Result<Duration, ScheduleError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ScheduleError::invalid(key, "too large"))
}
