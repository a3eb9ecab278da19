/// Core Area type definitions
///
/// Defines the stored shapes for automations: the Area binding itself, the
/// user's per-service connections, the loosely-typed WorkflowData config
/// envelope, and the timer trigger configuration. These types are
/// serialized/deserialized from JSON for persistence.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A user's stored credentials/authorization for one external service
///
/// OAuth-backed services keep access/refresh tokens here; webhook-backed
/// services (e.g. Discord) keep their credentials in the metadata blob.
/// Connections are owned by the user and referenced, never owned, by Areas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConnection {
    /// Database identifier
    pub id: i64,
    /// Stable lowercase service identifier (e.g. "github", "gmail")
    pub service_id: String,
    /// Current OAuth access token, when applicable
    pub access_token: Option<String>,
    /// OAuth refresh token, when applicable
    pub refresh_token: Option<String>,
    /// Access token expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Service-specific extras (webhook URL, channel id, account label)
    pub metadata: Option<Value>,
}

impl ServiceConnection {
    /// Whether the access token is missing, expired, or inside the refresh
    /// skew window and must be refreshed before use.
    pub fn needs_refresh(&self, skew: Duration, now: DateTime<Utc>) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => expires_at - skew <= now,
            // No recorded expiry: assume the token is still usable.
            None => false,
        }
    }

    /// Read a string value out of the metadata blob (e.g. "webhook_url").
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Timer trigger configuration for connection-less, time-based Areas
///
/// Three timer flavors:
/// - "current_time": fires once per matching minute boundary ("at" = HH:MM)
/// - "interval": fires every `interval_minutes` since the last fire
/// - "days_until": daily countdown toward a date `days_count` days out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerActionConfig {
    /// "current_time", "interval", or "days_until"
    pub timer_type: String,
    /// Minutes between fires for interval-style timers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<i64>,
    /// Wall-clock "HH:MM" for current_time timers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    /// Days remaining for days_until timers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_count: Option<i64>,
}

impl TimerActionConfig {
    /// Evaluate whether this timer is due at `now`, given when it last fired.
    ///
    /// Idempotent within a tick: once `last_fired` is advanced to a value in
    /// the current boundary/window, re-evaluating at the same instant
    /// returns false, so one boundary never fires twice.
    pub fn is_due(&self, now: DateTime<Utc>, last_fired: Option<DateTime<Utc>>) -> bool {
        match self.timer_type.as_str() {
            "current_time" => {
                let Some(at) = self.at.as_deref() else {
                    return false;
                };
                if now.format("%H:%M").to_string() != at {
                    return false;
                }
                // Fire at most once per matching minute boundary.
                match last_fired {
                    Some(lf) => {
                        lf.format("%Y-%m-%d %H:%M").to_string()
                            != now.format("%Y-%m-%d %H:%M").to_string()
                    }
                    None => true,
                }
            }
            "days_until" => self.interval_due(now, last_fired, 1440),
            // "interval" plus any unrecognized timer type falls back to
            // interval semantics, defaulting to one fire per hour.
            _ => self.interval_due(now, last_fired, 60),
        }
    }

    fn interval_due(
        &self,
        now: DateTime<Utc>,
        last_fired: Option<DateTime<Utc>>,
        default_minutes: i64,
    ) -> bool {
        let interval = self.interval_minutes.unwrap_or(default_minutes).max(1);
        match last_fired {
            Some(lf) => (now - lf).num_minutes() >= interval,
            None => true,
        }
    }
}

/// Stored config envelope: the trigger half and the reaction half
///
/// Parsed from the Area's JSON blob. Both halves carry a free-form
/// field-name -> value mapping that the workflow config resolver turns into
/// a typed per-service config at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowData {
    pub trigger: TriggerConfig,
    pub reaction: TriggerConfig,
}

/// One half of a stored automation config (trigger or reaction)
///
/// Historical configs stored `type` both with and without the service
/// prefix; `full_type()` tolerates both and produces one canonical
/// `service.type` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub service: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(
        rename = "connectionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_id: Option<i64>,
}

impl TriggerConfig {
    /// Canonical `service.type` string for this half of the config.
    ///
    /// Falls back to `actionType`/`reactionType`/`type` keys inside the
    /// free-form config map when the `type` field itself is absent (older
    /// clients stored it there). Returns None when no type is recorded
    /// anywhere.
    pub fn full_type(&self) -> Option<String> {
        let kind = self
            .kind
            .as_deref()
            .or_else(|| self.config_str("actionType"))
            .or_else(|| self.config_str("reactionType"))
            .or_else(|| self.config_str("type"))?;
        Some(normalize_full_type(&self.service, kind))
    }

    /// The lowercase service segment of this config.
    pub fn service_id(&self) -> String {
        self.service.to_lowercase()
    }

    fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Join `service` and `type` into the canonical `service.type` string.
///
/// If `kind` already carries the service prefix (compared
/// case-insensitively on the service segment only), the prefix is
/// normalized to lowercase and the remainder kept as-is; otherwise the
/// lowercased service is prepended.
pub fn normalize_full_type(service: &str, kind: &str) -> String {
    let service = service.to_lowercase();
    if let Some((head, rest)) = kind.split_once('.') {
        if head.to_lowercase() == service {
            return format!("{service}.{rest}");
        }
    }
    format!("{service}.{kind}")
}

/// A single automation binding: one trigger, one reaction
///
/// Invariant: timer Areas carry a `timer_config` and no action connection;
/// every other Area carries an action connection whose service matches the
/// prefix of `action_type`. Enforced at creation, assumed by the loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: i64,
    pub name: String,
    /// Canonical trigger type, e.g. "github.issue_created"
    pub action_type: String,
    /// Connection used for the trigger check; None for timer Areas
    pub action_connection_id: Option<i64>,
    /// Canonical reaction type, e.g. "discord.send_webhook"
    pub reaction_type: String,
    /// Connection used to execute the reaction
    pub reaction_connection_id: Option<i64>,
    /// The stored config envelope
    pub workflow_data: WorkflowData,
    /// Set when the action is timer-based
    pub timer_config: Option<TimerActionConfig>,
    pub active: bool,
    /// Lower bound for "new" events in service trigger checks
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When the trigger last fired; timer de-duplication anchor
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Circuit-breaker counter, reset on success
    pub consecutive_failures: i64,
}

impl Area {
    /// Whether this Area is evaluated by the timer loop.
    pub fn is_timer(&self) -> bool {
        self.timer_config.is_some()
    }

    /// The lowercase service segment of the action type.
    pub fn action_service(&self) -> &str {
        self.action_type
            .split_once('.')
            .map(|(s, _)| s)
            .unwrap_or(&self.action_type)
    }

    /// The lowercase service segment of the reaction type.
    pub fn reaction_service(&self) -> &str {
        self.reaction_type
            .split_once('.')
            .map(|(s, _)| s)
            .unwrap_or(&self.reaction_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trigger(service: &str, kind: Option<&str>) -> TriggerConfig {
        TriggerConfig {
            service: service.to_string(),
            kind: kind.map(|k| k.to_string()),
            config: HashMap::new(),
            connection_id: None,
        }
    }

    #[test]
    fn full_type_prepends_lowercased_service() {
        let t = trigger("GitHub", Some("issue_created"));
        assert_eq!(t.full_type().as_deref(), Some("github.issue_created"));
    }

    #[test]
    fn full_type_keeps_already_prefixed_type() {
        let t = trigger("GitHub", Some("github.issue_created"));
        assert_eq!(t.full_type().as_deref(), Some("github.issue_created"));

        let t = trigger("github", Some("github.issue_created"));
        assert_eq!(t.full_type().as_deref(), Some("github.issue_created"));
    }

    #[test]
    fn full_type_is_case_insensitive_on_service_segment_only() {
        let t = trigger("github", Some("GitHub.issue_created"));
        assert_eq!(t.full_type().as_deref(), Some("github.issue_created"));
    }

    #[test]
    fn full_type_does_not_strip_foreign_prefix() {
        let t = trigger("gmail", Some("github.issue_created"));
        assert_eq!(
            t.full_type().as_deref(),
            Some("gmail.github.issue_created")
        );
    }

    #[test]
    fn full_type_falls_back_to_config_keys() {
        let mut t = trigger("Timer", None);
        t.config.insert(
            "actionType".to_string(),
            Value::String("current_time".to_string()),
        );
        assert_eq!(t.full_type().as_deref(), Some("timer.current_time"));

        let t = trigger("timer", None);
        assert_eq!(t.full_type(), None);
    }

    #[test]
    fn interval_timer_fires_then_waits() {
        let config = TimerActionConfig {
            timer_type: "interval".to_string(),
            interval_minutes: Some(5),
            at: None,
            days_count: None,
        };
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        // Never fired: due immediately.
        assert!(config.is_due(now, None));
        // Just fired: not due again at the same instant.
        assert!(!config.is_due(now, Some(now)));
        // Interval elapsed: due again.
        assert!(config.is_due(now + Duration::minutes(5), Some(now)));
        assert!(!config.is_due(now + Duration::minutes(4), Some(now)));
    }

    #[test]
    fn current_time_timer_fires_once_per_minute_boundary() {
        let config = TimerActionConfig {
            timer_type: "current_time".to_string(),
            interval_minutes: None,
            at: Some("12:30".to_string()),
            days_count: None,
        };
        let boundary = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 10).unwrap();

        assert!(config.is_due(boundary, None));
        // Same minute boundary, already fired: stays quiet.
        assert!(!config.is_due(boundary, Some(boundary)));
        assert!(!config.is_due(
            boundary + Duration::seconds(30),
            Some(boundary)
        ));
        // Next day, same wall-clock minute: fires again.
        assert!(config.is_due(boundary + Duration::days(1), Some(boundary)));
        // Wrong minute: never due.
        assert!(!config.is_due(boundary + Duration::minutes(1), None));
    }

    #[test]
    fn days_until_timer_defaults_to_daily() {
        let config = TimerActionConfig {
            timer_type: "days_until".to_string(),
            interval_minutes: None,
            at: None,
            days_count: Some(3),
        };
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();

        assert!(config.is_due(now, None));
        assert!(!config.is_due(now + Duration::hours(23), Some(now)));
        assert!(config.is_due(now + Duration::hours(24), Some(now)));
    }

    #[test]
    fn workflow_data_round_trips_through_json() {
        let json = serde_json::json!({
            "trigger": {
                "service": "github",
                "type": "issue_created",
                "config": { "repository": "octo/widgets" },
                "connectionId": 7
            },
            "reaction": {
                "service": "discord",
                "type": "send_webhook",
                "config": { "message": "New issue: {{issue_title}}" }
            }
        });
        let data: WorkflowData = serde_json::from_value(json).unwrap();
        assert_eq!(
            data.trigger.full_type().as_deref(),
            Some("github.issue_created")
        );
        assert_eq!(data.trigger.connection_id, Some(7));
        assert_eq!(
            data.reaction.full_type().as_deref(),
            Some("discord.send_webhook")
        );
    }
}
