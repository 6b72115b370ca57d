use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::api::ActionError;
use crate::classify::{classify, ALLOWED_TAGS};
use crate::dispatch::BatchDispatcher;
use crate::query::{ActionRequest, WRITE_KEY_PARAM};
use crate::sink::SinkFactory;
use crate::transform::{CallType, EventContext, RowTransformer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionParam {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredField {
    pub any_tag: Vec<&'static str>,
}

/// An action turning every row of a query result into one identify or track call.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentAction {
    #[serde(skip)]
    call_type: CallType,
    pub name: String,
    pub label: String,
    pub description: String,
    pub icon_name: &'static str,
    pub params: Vec<ActionParam>,
    pub supported_action_types: Vec<&'static str>,
    pub supported_formats: Vec<&'static str>,
    pub supported_formattings: Vec<&'static str>,
    pub supported_visualization_formattings: Vec<&'static str>,
    pub required_fields: Vec<RequiredField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_supported_version: Option<String>,
}

impl SegmentAction {
    pub fn new(call_type: CallType, minimum_supported_version: Option<&str>) -> Self {
        let name = match call_type {
            CallType::Identify => "segment".to_owned(),
            CallType::Track => format!("segment_{}", call_type),
        };

        Self {
            call_type,
            name,
            label: format!("Segment {}", capitalize(call_type.as_str())),
            description: format!("Add traits via {} to your Segment users.", call_type),
            icon_name: "segment/segment.png",
            params: vec![ActionParam {
                name: WRITE_KEY_PARAM,
                label: "Segment Write Key",
                description: "A write key for Segment.",
                required: true,
                sensitive: true,
            }],
            supported_action_types: vec!["query"],
            supported_formats: vec!["json_detail"],
            supported_formattings: vec!["unformatted"],
            supported_visualization_formattings: vec!["noapply"],
            required_fields: vec![RequiredField {
                any_tag: ALLOWED_TAGS.to_vec(),
            }],
            minimum_supported_version: minimum_supported_version.map(String::from),
        }
    }

    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    /// Run one invocation: validate the payload, resolve identity roles, transform
    /// every row and deliver the batch. Nothing is sent unless validation and
    /// classification both pass.
    #[instrument(skip_all, fields(action = %self.name, rows = tracing::field::Empty))]
    pub async fn execute(
        &self,
        request: &ActionRequest,
        sinks: &dyn SinkFactory,
        context: &EventContext,
    ) -> Result<usize, ActionError> {
        metrics::counter!("segment_action_invocations_total", "action" => self.name.clone())
            .increment(1);

        let result = self.run(request, sinks, context).await;

        if let Err(err) = &result {
            metrics::counter!(
                "segment_action_rejections_total",
                "action" => self.name.clone(),
                "phase" => err.phase()
            )
            .increment(1);
            tracing::warn!("rejected invocation: {}", err);
        }

        result
    }

    async fn run(
        &self,
        request: &ActionRequest,
        sinks: &dyn SinkFactory,
        context: &EventContext,
    ) -> Result<usize, ActionError> {
        let query = request.query_result()?;
        let fields = query.flattened_fields();
        let hidden_fields = request.hidden_fields();

        let roles = classify(&fields)?;
        let write_key = request.write_key().ok_or(ActionError::MissingWriteKey)?;

        tracing::Span::current().record("rows", query.data.len());
        tracing::debug!(fields = fields.len(), "transforming rows");

        // Shared by every row that has neither an id nor an anonymous id.
        let fallback_anonymous_id = Uuid::new_v4();
        let transformer = RowTransformer::new(
            self.call_type,
            &fields,
            &roles,
            &hidden_fields,
            context,
            query.ran_at(),
            fallback_anonymous_id,
        );

        let mut dispatcher = BatchDispatcher::new(self.call_type, sinks.sink(write_key));
        for row in &query.data {
            dispatcher.enqueue(transformer.transform(row));
        }

        tracing::debug!(events = dispatcher.enqueued(), "flushing batch");
        Ok(dispatcher.flush().await?)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The actions this service exposes, looked up by name.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: Vec<SegmentAction>,
}

impl ActionRegistry {
    pub fn new(actions: Vec<SegmentAction>) -> Self {
        Self { actions }
    }

    pub fn get(&self, name: &str) -> Option<&SegmentAction> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn actions(&self) -> &[SegmentAction] {
        &self.actions
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new(vec![
            SegmentAction::new(CallType::Identify, Some("4.20.0")),
            SegmentAction::new(CallType::Track, Some("5.5.0")),
        ])
    }
}
