/// Schema descriptors for service capabilities
///
/// Immutable value objects describing the configurable inputs of every
/// action and reaction an integration offers. Built once per integration at
/// process start, never mutated. Consumed by the catalog API and by config
/// validation at Area creation.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Recognized field value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Text,
    Boolean,
    Number,
    Select,
    Url,
}

/// One configurable input of an action or reaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Machine name, unique within one definition
    pub name: String,
    /// Human-readable label
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

impl FieldDefinition {
    /// Start building a field. Panics on an empty name: definitions are
    /// static program data and an empty name is a programming error.
    pub fn builder(name: &str, kind: FieldKind) -> FieldDefinitionBuilder {
        assert!(!name.is_empty(), "field name must be non-empty");
        FieldDefinitionBuilder {
            name: name.to_string(),
            label: name.to_string(),
            kind,
            required: false,
            description: String::new(),
        }
    }
}

/// Builder for FieldDefinition
pub struct FieldDefinitionBuilder {
    name: String,
    label: String,
    kind: FieldKind,
    required: bool,
    description: String,
}

impl FieldDefinitionBuilder {
    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn build(self) -> FieldDefinition {
        FieldDefinition {
            name: self.name,
            label: self.label,
            kind: self.kind,
            required: self.required,
            description: self.description,
        }
    }
}

/// An action (trigger) a service integration can watch for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Canonical full type, e.g. "github.issue_created"
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub fields: Vec<FieldDefinition>,
}

impl ActionDefinition {
    pub fn builder(id: &str, display_name: &str) -> CapabilityBuilder<ActionDefinition> {
        CapabilityBuilder::new(id, display_name)
    }
}

/// A reaction a service integration can execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDefinition {
    /// Canonical full type, e.g. "discord.send_webhook"
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub fields: Vec<FieldDefinition>,
}

impl ReactionDefinition {
    pub fn builder(id: &str, display_name: &str) -> CapabilityBuilder<ReactionDefinition> {
        CapabilityBuilder::new(id, display_name)
    }
}

/// Shared builder for action and reaction definitions
///
/// Field names must be unique within one definition; duplicates are a
/// startup-time programming error and panic with a clear message.
pub struct CapabilityBuilder<T> {
    id: String,
    display_name: String,
    description: String,
    fields: Vec<FieldDefinition>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> CapabilityBuilder<T> {
    fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            fields: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        assert!(
            !self.fields.iter().any(|f| f.name == field.name),
            "duplicate field '{}' in definition '{}'",
            field.name,
            self.id
        );
        self.fields.push(field);
        self
    }
}

impl CapabilityBuilder<ActionDefinition> {
    pub fn build(self) -> ActionDefinition {
        ActionDefinition {
            id: self.id,
            display_name: self.display_name,
            description: self.description,
            fields: self.fields,
        }
    }
}

impl CapabilityBuilder<ReactionDefinition> {
    pub fn build(self) -> ReactionDefinition {
        ReactionDefinition {
            id: self.id,
            display_name: self.display_name,
            description: self.description,
            fields: self.fields,
        }
    }
}

/// Check a stored config's keys against the declared field names.
///
/// Unknown keys are warned about and returned; they are ignored, not
/// fatal - stored configs from older clients may carry stale keys.
pub fn unknown_config_keys(
    service: &str,
    declared: &[FieldDefinition],
    config: &HashMap<String, Value>,
) -> Vec<String> {
    let unknown: Vec<String> = config
        .keys()
        .filter(|key| !declared.iter().any(|f| &f.name == *key))
        .cloned()
        .collect();
    for key in &unknown {
        let err = EngineError::UnknownField {
            service: service.to_string(),
            field: key.clone(),
        };
        tracing::warn!("{}; ignoring it", err);
    }
    unknown
}
