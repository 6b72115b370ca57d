use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::classify::{ResolvedRoles, Role, EMAIL_TAG};
use crate::query::{FieldDescriptor, Row};

/// The kind of call an action produces, fixed when the action is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Identify,
    Track,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Identify => "identify",
            CallType::Track => "track",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventContext {
    pub app: AppContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppContext {
    pub name: String,
    pub version: String,
}

impl EventContext {
    pub fn new(name: &str, version: &str) -> Self {
        EventContext {
            app: AppContext {
                name: name.to_owned(),
                version: version.to_owned(),
            },
        }
    }
}

/// One row, shaped as an identify or track message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    pub anonymous_id: Value,
    pub user_id: Value,
    pub context: EventContext,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Identify {
        traits: Map<String, Value>,
    },
    Track {
        event: String,
        properties: Map<String, Value>,
    },
}

impl EventPayload {
    /// Traits for identify calls, properties for track calls.
    pub fn traits(&self) -> &Map<String, Value> {
        match self {
            EventPayload::Identify { traits } => traits,
            EventPayload::Track { properties, .. } => properties,
        }
    }
}

/// Turns rows into events. Everything it holds is shared by all rows of one invocation.
pub struct RowTransformer<'a> {
    call_type: CallType,
    fields: &'a [FieldDescriptor],
    roles: &'a ResolvedRoles,
    hidden_fields: &'a HashSet<String>,
    context: &'a EventContext,
    timestamp: Option<OffsetDateTime>,
    /// Used by every row when neither an id nor an anonymous id field resolved.
    fallback_anonymous_id: Uuid,
}

impl<'a> RowTransformer<'a> {
    pub fn new(
        call_type: CallType,
        fields: &'a [FieldDescriptor],
        roles: &'a ResolvedRoles,
        hidden_fields: &'a HashSet<String>,
        context: &'a EventContext,
        timestamp: Option<OffsetDateTime>,
        fallback_anonymous_id: Uuid,
    ) -> Self {
        Self {
            call_type,
            fields,
            roles,
            hidden_fields,
            context,
            timestamp,
            fallback_anonymous_id,
        }
    }

    pub fn transform(&self, row: &Row) -> OutboundEvent {
        let mut traits = Map::new();

        for field in self.fields {
            let Some(value) = row.value(&field.name) else {
                tracing::debug!(field = %field.name, "row holds no cell for field, skipping");
                metrics::counter!("segment_action_missing_cells_total").increment(1);
                continue;
            };

            if !self.roles.is(Role::Id, field) && !self.hidden_fields.contains(&field.name) {
                traits.insert(field.name.clone(), value.clone());
            }
            // email is surfaced under its canonical key even when hidden
            if self.roles.is(Role::Email, field) {
                traits.insert(EMAIL_TAG.to_owned(), value.clone());
            }
        }

        let user_id = self.role_value(Role::Id, row);
        let anonymous_id = if self.roles.field(Role::AnonymousId).is_some() {
            self.role_value(Role::AnonymousId, row)
        } else if self.roles.field(Role::Id).is_some() {
            Value::Null
        } else {
            Value::String(self.fallback_anonymous_id.to_string())
        };

        let payload = match self.call_type {
            CallType::Identify => EventPayload::Identify { traits },
            CallType::Track => EventPayload::Track {
                event: String::new(),
                properties: traits,
            },
        };

        OutboundEvent {
            anonymous_id,
            user_id,
            context: self.context.clone(),
            timestamp: self.timestamp,
            payload,
        }
    }

    fn role_value(&self, role: Role, row: &Row) -> Value {
        self.roles
            .field(role)
            .and_then(|field| row.value(&field.name))
            .cloned()
            .unwrap_or(Value::Null)
    }
}
