/// Workflow config resolution
///
/// Turns the free-form trigger/reaction halves of a stored Area into the
/// typed per-service configs the integrations consume. Resolution happens
/// fresh on every evaluation so config edits take effect on the next tick
/// without any cache invalidation.

use crate::area::config::{
    ActionKind, DiscordReactionConfig, GenericConfig, GitHubActionConfig, GitHubReactionConfig,
    GmailActionConfig, ReactionKind,
};
use crate::area::types::{Area, TimerActionConfig};
use crate::error::EngineError;

/// Resolve the trigger half of an Area into a typed action config.
pub fn resolve_action(area: &Area) -> Result<ActionKind, EngineError> {
    let trigger = &area.workflow_data.trigger;
    let full_type = trigger.full_type().unwrap_or_else(|| area.action_type.clone());
    let (service, kind) = split_full_type(&full_type);

    match service {
        "timer" => {
            // Prefer the dedicated timer_config column; reconstruct from
            // the config map only for rows predating it.
            if let Some(config) = &area.timer_config {
                return Ok(ActionKind::Timer(config.clone()));
            }
            Ok(ActionKind::Timer(timer_config_from_fields(
                kind,
                &trigger.config,
            )))
        }
        "github" => GitHubActionConfig::from_fields(kind, &trigger.config)
            .map(ActionKind::GitHub)
            .ok_or_else(|| {
                resolution_error(area.id, "GitHub trigger has no usable repository field")
            }),
        "gmail" => Ok(ActionKind::Gmail(GmailActionConfig::from_fields(
            &trigger.config,
        ))),
        _ => Ok(ActionKind::Generic(GenericConfig::from_fields(
            service,
            &full_type,
            &trigger.config,
        ))),
    }
}

/// Resolve the reaction half of an Area into a typed reaction config.
pub fn resolve_reaction(area: &Area) -> Result<ReactionKind, EngineError> {
    let reaction = &area.workflow_data.reaction;
    let full_type = reaction
        .full_type()
        .unwrap_or_else(|| area.reaction_type.clone());
    let (service, kind) = split_full_type(&full_type);

    match service {
        "discord" => Ok(ReactionKind::Discord(DiscordReactionConfig::from_fields(
            &reaction.config,
        ))),
        "github" => GitHubReactionConfig::from_fields(kind, &reaction.config)
            .map(ReactionKind::GitHub)
            .ok_or_else(|| {
                resolution_error(area.id, "GitHub reaction has no usable repository field")
            }),
        _ => Ok(ReactionKind::Generic(GenericConfig::from_fields(
            service,
            &full_type,
            &reaction.config,
        ))),
    }
}

/// Build a timer config from the free-form field map.
///
/// Also used at Area creation time to populate the dedicated
/// `timer_config` column.
pub fn timer_config_from_fields(
    timer_type: &str,
    config: &std::collections::HashMap<String, serde_json::Value>,
) -> TimerActionConfig {
    TimerActionConfig {
        timer_type: timer_type.to_string(),
        interval_minutes: config.get("intervalMinutes").and_then(|v| v.as_i64()),
        at: config
            .get("at")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        days_count: config.get("daysCount").and_then(|v| v.as_i64()),
    }
}

fn split_full_type(full_type: &str) -> (&str, &str) {
    full_type
        .split_once('.')
        .unwrap_or((full_type, ""))
}

fn resolution_error(area_id: i64, reason: impl Into<String>) -> EngineError {
    EngineError::ConfigResolution {
        area_id,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::types::{TriggerConfig, WorkflowData};
    use serde_json::json;
    use std::collections::HashMap;

    fn area_with(trigger: TriggerConfig, reaction: TriggerConfig) -> Area {
        Area {
            id: 1,
            name: "test".to_string(),
            action_type: trigger.full_type().unwrap_or_default(),
            action_connection_id: trigger.connection_id,
            reaction_type: reaction.full_type().unwrap_or_default(),
            reaction_connection_id: reaction.connection_id,
            workflow_data: WorkflowData { trigger, reaction },
            timer_config: None,
            active: true,
            last_checked_at: None,
            last_fired_at: None,
            consecutive_failures: 0,
        }
    }

    fn half(service: &str, kind: &str, config: &[(&str, &str)]) -> TriggerConfig {
        TriggerConfig {
            service: service.to_string(),
            kind: Some(kind.to_string()),
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect(),
            connection_id: None,
        }
    }

    #[test]
    fn github_trigger_resolves_to_typed_config() {
        let area = area_with(
            half("github", "issue_created", &[("repository", "octo/widgets")]),
            half("discord", "send_webhook", &[("message", "hi")]),
        );

        let ActionKind::GitHub(config) = resolve_action(&area).unwrap() else {
            panic!("expected GitHub action");
        };
        assert_eq!(config.action_type, "issue_created");
        assert_eq!(config.repository_owner, "octo");
        assert_eq!(config.repository_name, "widgets");
    }

    #[test]
    fn github_trigger_without_repository_is_a_resolution_error() {
        let area = area_with(
            half("github", "issue_created", &[]),
            half("discord", "send_webhook", &[]),
        );

        let err = resolve_action(&area).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ConfigResolution { area_id: 1, .. }
        ));
    }

    #[test]
    fn timer_trigger_prefers_dedicated_column() {
        let mut area = area_with(
            half("timer", "interval", &[]),
            half("discord", "send_webhook", &[]),
        );
        area.timer_config = Some(TimerActionConfig {
            timer_type: "interval".to_string(),
            interval_minutes: Some(15),
            at: None,
            days_count: None,
        });

        let ActionKind::Timer(config) = resolve_action(&area).unwrap() else {
            panic!("expected timer action");
        };
        assert_eq!(config.interval_minutes, Some(15));
    }

    #[test]
    fn timer_trigger_reconstructs_from_config_map() {
        let mut trigger = half("timer", "current_time", &[("at", "09:30")]);
        trigger
            .config
            .insert("intervalMinutes".to_string(), json!(45));
        let area = area_with(trigger, half("discord", "send_webhook", &[]));

        let ActionKind::Timer(config) = resolve_action(&area).unwrap() else {
            panic!("expected timer action");
        };
        assert_eq!(config.timer_type, "current_time");
        assert_eq!(config.at.as_deref(), Some("09:30"));
        assert_eq!(config.interval_minutes, Some(45));
    }

    #[test]
    fn unrecognized_service_resolves_to_generic() {
        let area = area_with(
            half("spotify", "track_played", &[("playlist", "focus")]),
            half("slack", "post_message", &[("channel", "#general")]),
        );

        let ActionKind::Generic(action) = resolve_action(&area).unwrap() else {
            panic!("expected generic action");
        };
        assert_eq!(action.service, "spotify");
        assert_eq!(action.full_type, "spotify.track_played");
        assert_eq!(action.fields.get("playlist").map(String::as_str), Some("focus"));

        let ReactionKind::Generic(reaction) = resolve_reaction(&area).unwrap() else {
            panic!("expected generic reaction");
        };
        assert_eq!(reaction.service, "slack");
    }

    #[test]
    fn discord_reaction_resolves_with_template_alias() {
        let area = area_with(
            half("timer", "interval", &[]),
            half(
                "discord",
                "send_webhook",
                &[
                    ("webhookUrl", "https://discord.com/api/webhooks/1/t"),
                    ("content", "It is {{time}}"),
                ],
            ),
        );

        let ReactionKind::Discord(config) = resolve_reaction(&area).unwrap() else {
            panic!("expected discord reaction");
        };
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/t")
        );
        assert_eq!(config.message_template.as_deref(), Some("It is {{time}}"));
    }

    #[test]
    fn resolution_uses_config_type_keys_when_type_field_is_missing() {
        let mut trigger = half("github", "", &[("repository", "octo/widgets")]);
        trigger.kind = None;
        trigger
            .config
            .insert("actionType".to_string(), json!("pr_created"));
        let area = area_with(trigger, half("discord", "send_webhook", &[]));

        let ActionKind::GitHub(config) = resolve_action(&area).unwrap() else {
            panic!("expected GitHub action");
        };
        assert_eq!(config.action_type, "pr_created");
    }
}
