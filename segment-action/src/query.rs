//! Payload types handed to an action by the calling platform.
//!
//! Only the parts of the request the action reads are modelled; unknown keys are ignored.
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::OffsetDateTime;

use crate::api::ActionError;

pub const WRITE_KEY_PARAM: &str = "segment_write_key";

#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    pub attachment: Option<Attachment>,
    pub scheduled_plan: Option<ScheduledPlan>,
    /// Form params set by the user. Only `segment_write_key` is read, so other
    /// params may hold any JSON value.
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Attachment {
    /// Structured JSON-detail result.
    #[serde(alias = "dataJSON")]
    pub data_json: Option<Value>,
    /// The same result as a serialized JSON string.
    pub data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduledPlan {
    pub query: Option<PlanQuery>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    pub vis_config: Option<VisConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisConfig {
    pub hidden_fields: Option<Vec<String>>,
}

impl ActionRequest {
    /// Decode a request body. A body that does not fit the request envelope is an
    /// invalid payload rather than a transport error.
    pub fn from_bytes(body: &[u8]) -> Result<ActionRequest, ActionError> {
        serde_json::from_slice(body).map_err(|e| {
            tracing::debug!("failed to decode action request: {}", e);
            ActionError::InvalidPayload
        })
    }

    /// Extract and validate the attached query result.
    pub fn query_result(&self) -> Result<QueryResult, ActionError> {
        let attachment = self.attachment.as_ref().ok_or(ActionError::NoAttachedJson)?;

        match (&attachment.data_json, &attachment.data) {
            (Some(json), _) if !json.is_null() => QueryResult::from_value(json),
            (_, Some(data)) => {
                let json: Value = serde_json::from_str(data).map_err(|e| {
                    tracing::debug!("attachment data is not json: {}", e);
                    ActionError::InvalidPayload
                })?;
                QueryResult::from_value(&json)
            }
            _ => Err(ActionError::NoAttachedJson),
        }
    }

    /// Field names the visualization hides, empty when not configured.
    pub fn hidden_fields(&self) -> HashSet<String> {
        self.scheduled_plan
            .as_ref()
            .and_then(|plan| plan.query.as_ref())
            .and_then(|query| query.vis_config.as_ref())
            .and_then(|vis| vis.hidden_fields.as_ref())
            .map(|hidden| hidden.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn write_key(&self) -> Option<&str> {
        self.params
            .get(WRITE_KEY_PARAM)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryResult {
    #[serde(deserialize_with = "deserialize_field_groups")]
    pub fields: Vec<FieldGroup>,
    pub data: Vec<Row>,
    #[serde(default)]
    pub ran_at: Option<String>,
}

/// A named group of fields (dimensions, measures, table calculations...).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroup {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
}

impl FieldDescriptor {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Row(HashMap<String, Cell>);

impl Row {
    /// The cell value for a field, `None` when the row carries no cell for it.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.0.get(field).map(|cell| &cell.value)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row(iter
            .into_iter()
            .map(|(name, value)| (name, Cell { value }))
            .collect())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: Value,
}

impl QueryResult {
    /// Both `fields` and `data` must be present before the typed parse is attempted.
    pub fn from_value(json: &Value) -> Result<QueryResult, ActionError> {
        let present = |key: &str| json.get(key).is_some_and(|value| !value.is_null());
        if !(present("fields") && present("data")) {
            return Err(ActionError::InvalidPayload);
        }

        QueryResult::deserialize(json).map_err(|e| {
            tracing::debug!("failed to parse query result: {}", e);
            ActionError::InvalidPayload
        })
    }

    /// All fields, group by group, in payload order.
    pub fn flattened_fields(&self) -> Vec<FieldDescriptor> {
        self.fields
            .iter()
            .flat_map(|group| group.fields.iter().cloned())
            .collect()
    }

    /// The time the query ran, `None` when absent or unparseable.
    pub fn ran_at(&self) -> Option<OffsetDateTime> {
        let raw = self.ran_at.as_deref()?;

        match OffsetDateTime::parse(raw, &Rfc3339)
            .or_else(|_| OffsetDateTime::parse(raw, &Iso8601::DEFAULT))
        {
            Ok(ran_at) => Some(ran_at),
            Err(e) => {
                tracing::warn!(ran_at = raw, "ignoring unparseable ran_at: {}", e);
                None
            }
        }
    }
}

fn deserialize_field_groups<'de, D>(deserializer: D) -> Result<Vec<FieldGroup>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FieldGroupsVisitor;

    impl<'de> Visitor<'de> for FieldGroupsVisitor {
        type Value = Vec<FieldGroup>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of field group names to field lists")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut groups = Vec::with_capacity(map.size_hint().unwrap_or(4));
            while let Some((name, fields)) = map.next_entry::<String, Vec<FieldDescriptor>>()? {
                groups.push(FieldGroup { name, fields });
            }
            Ok(groups)
        }
    }

    deserializer.deserialize_map(FieldGroupsVisitor)
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
