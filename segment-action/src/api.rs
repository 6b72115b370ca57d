use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::ALLOWED_TAGS;
use crate::sink::SinkError;

/// Body returned by the execute endpoint: empty on success, a reason on rejection.
#[derive(Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("No attached json")]
    NoAttachedJson,
    #[error("Request payload is an invalid format.")]
    InvalidPayload,

    #[error("Query requires a field tagged {}.", ALLOWED_TAGS.join(" or "))]
    MissingIdentifier,

    #[error("Missing required parameter segment_write_key.")]
    MissingWriteKey,
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ActionError {
    /// The invocation phase that produced this rejection, used as a metrics label.
    pub fn phase(&self) -> &'static str {
        match self {
            ActionError::NoAttachedJson | ActionError::InvalidPayload => "validate",
            ActionError::MissingIdentifier => "classify",
            ActionError::MissingWriteKey => "configure",
            ActionError::UnknownAction(_) => "route",
            ActionError::Sink(_) => "flush",
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let status = match self {
            ActionError::NoAttachedJson
            | ActionError::InvalidPayload
            | ActionError::MissingIdentifier
            | ActionError::MissingWriteKey => StatusCode::BAD_REQUEST,

            ActionError::UnknownAction(_) => StatusCode::NOT_FOUND,

            ActionError::Sink(_) => StatusCode::BAD_GATEWAY,
        };

        (
            status,
            Json(ActionResponse {
                error: Some(self.to_string()),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_messages() {
        assert_eq!(ActionError::NoAttachedJson.to_string(), "No attached json");
        assert_eq!(
            ActionError::InvalidPayload.to_string(),
            "Request payload is an invalid format."
        );
        assert_eq!(
            ActionError::MissingIdentifier.to_string(),
            "Query requires a field tagged email or user_id or segment_anonymous_id."
        );
    }

    #[test]
    fn sink_errors_are_surfaced_verbatim() {
        let sink_error = SinkError::Status {
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: "invalid write key".to_owned(),
        };
        let expected = sink_error.to_string();

        assert_eq!(ActionError::from(sink_error).to_string(), expected);
    }

    #[test]
    fn empty_response_serializes_to_empty_object() {
        let body = serde_json::to_string(&ActionResponse::default()).unwrap();
        assert_eq!(body, "{}");
    }
}
