use std::future::ready;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::{
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::action::{ActionRegistry, SegmentAction};
use crate::api::{ActionError, ActionResponse};
use crate::metrics::track_metrics;
use crate::query::ActionRequest;
use crate::sink::SinkFactory;
use crate::transform::EventContext;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ActionRegistry>,
    pub sinks: Arc<dyn SinkFactory>,
    pub context: Arc<EventContext>,
}

#[derive(Serialize)]
pub struct ActionList {
    pub integrations: Vec<SegmentAction>,
}

async fn index() -> &'static str {
    "segment-action"
}

async fn list_actions(State(state): State<AppState>) -> Json<ActionList> {
    Json(ActionList {
        integrations: state.registry.actions().to_vec(),
    })
}

async fn execute_action(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ActionResponse>, ActionError> {
    let action = state
        .registry
        .get(&name)
        .ok_or_else(|| ActionError::UnknownAction(name.clone()))?;
    let request = ActionRequest::from_bytes(&body)?;

    let sent = action
        .execute(&request, state.sinks.as_ref(), &state.context)
        .await?;
    tracing::info!(action = %name, events = sent, "batch delivered");

    Ok(Json(ActionResponse::default()))
}

pub fn router<S: SinkFactory + 'static>(
    registry: ActionRegistry,
    sinks: S,
    context: EventContext,
    max_body_size: usize,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let state = AppState {
        registry: Arc::new(registry),
        sinks: Arc::new(sinks),
        context: Arc::new(context),
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/actions", get(list_actions))
        .route("/actions/:name/execute", post(execute_action))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Installing a global recorder when used as a library (during tests etc)
    // does not work well, so the handle is optional.
    match metrics {
        Some(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        None => router,
    }
}
