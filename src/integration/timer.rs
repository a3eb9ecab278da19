/// Timer pseudo-integration
///
/// Connection-less, time-based triggers evaluated entirely in-process: no
/// outbound calls, no credentials. The timer loop evaluates
/// `TimerActionConfig::is_due` directly and uses `build_timer_event` for
/// the reaction payload; the trait implementation exists so timers appear
/// in the catalog like any other service.

use crate::area::config::ActionKind;
use crate::area::types::TimerActionConfig;
use crate::error::EngineError;
use crate::integration::schema::{ActionDefinition, FieldDefinition, FieldKind, ReactionDefinition};
use crate::integration::{ServiceIntegration, TriggerEvent};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};

/// Build the substitution payload for a fired timer.
pub fn build_timer_event(config: &TimerActionConfig, now: DateTime<Utc>) -> TriggerEvent {
    let date = now.format("%d/%m").to_string();
    let time = now.format("%H:%M").to_string();
    let day_of_week = now.weekday().to_string();

    let mut event = TriggerEvent::new(
        format!("Timer fired ({}) at {}", config.timer_type, time),
        now,
    )
    .with_value("date", date)
    .with_value("time", time)
    .with_value("day_of_week", day_of_week)
    .with_value("timer_type", config.timer_type.clone());

    // Countdown payload for days_until timers.
    if config.timer_type == "days_until" {
        if let Some(days) = config.days_count {
            let future = now + chrono::Duration::days(days);
            let plural = if days == 1 { "" } else { "s" };
            event = event
                .with_value("days_count", days.to_string())
                .with_value("future_day", future.weekday().to_string())
                .with_value("future_date", future.format("%d/%m").to_string())
                .with_value(
                    "days_until_message",
                    format!(
                        "In {} day{}, it will be {} ({})",
                        days,
                        plural,
                        future.weekday(),
                        future.format("%d/%m")
                    ),
                );
        }
    }

    event
}

/// The timer service: actions only, no auth, no reactions
pub struct TimerIntegration;

#[async_trait]
impl ServiceIntegration for TimerIntegration {
    fn service_id(&self) -> &'static str {
        "timer"
    }

    fn service_name(&self) -> &'static str {
        "Timer"
    }

    fn service_description(&self) -> &'static str {
        "Time-based triggers: fixed times, recurring intervals, and countdowns"
    }

    fn actions(&self) -> Vec<ActionDefinition> {
        vec![
            ActionDefinition::builder("timer.current_time", "At a Specific Time")
                .description("Triggers once per day when the clock reaches the configured time")
                .field(
                    FieldDefinition::builder("at", FieldKind::String)
                        .label("Time")
                        .required()
                        .description("Wall-clock time in HH:MM (24h, UTC)")
                        .build(),
                )
                .build(),
            ActionDefinition::builder("timer.interval", "Recurring Interval")
                .description("Triggers every N minutes")
                .field(
                    FieldDefinition::builder("intervalMinutes", FieldKind::Number)
                        .label("Interval (minutes)")
                        .required()
                        .description("Minutes between fires")
                        .build(),
                )
                .build(),
            ActionDefinition::builder("timer.days_until", "Countdown")
                .description("Triggers daily with a countdown toward a date N days out")
                .field(
                    FieldDefinition::builder("daysCount", FieldKind::Number)
                        .label("Days")
                        .required()
                        .description("Number of days to count toward")
                        .build(),
                )
                .build(),
        ]
    }

    fn reactions(&self) -> Vec<ReactionDefinition> {
        Vec::new()
    }

    fn requires_oauth(&self) -> bool {
        false
    }

    async fn check_trigger(
        &self,
        action: &ActionKind,
        _access_token: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Option<TriggerEvent>, EngineError> {
        // Timers normally run in the dedicated timer loop; this path only
        // serves manual/one-off evaluation.
        let ActionKind::Timer(config) = action else {
            return Ok(None);
        };
        let now = Utc::now();
        if config.is_due(now, Some(since)) {
            Ok(Some(build_timer_event(config, now)))
        } else {
            Ok(None)
        }
    }
}
