//! Error taxonomy for a single relay request.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that end the handling of one webhook delivery.
///
/// Every variant is terminal: nothing is retried and destinations that were
/// already contacted are not rolled back.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The inbound body could not be read in full.
    #[error("failed to read request body: {0}")]
    UnreadableBody(String),

    /// The event-type header is missing or not valid UTF-8.
    #[error("missing or unreadable {header} header")]
    MissingEventType { header: &'static str },

    /// The body does not decode as the announced event kind.
    #[error("failed to decode {event_type} payload: {source}")]
    UndecodablePayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// A destination cannot be turned into an outbound request.
    #[error("invalid destination {destination}: {source}")]
    InvalidDestination {
        destination: String,
        #[source]
        source: reqwest::Error,
    },

    /// A destination could not be reached at the transport level.
    #[error("destination {destination} unreachable: {source}")]
    Unreachable {
        destination: String,
        #[source]
        source: reqwest::Error,
    },

    /// A destination answered with a status of 300 or above.
    ///
    /// `reason` is the destination's own reason phrase, or the canonical one
    /// when the destination sent none.
    #[error("destination {destination} responded {status}")]
    Rejected {
        destination: String,
        status: StatusCode,
        reason: Option<String>,
    },
}

impl RelayError {
    /// The status code reported back to the webhook caller.
    ///
    /// - Unreadable body, undecodable envelope, malformed destination: 500
    /// - Unreachable destination: 502
    /// - Rejecting destination: the destination's own status
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnreadableBody(_)
            | Self::MissingEventType { .. }
            | Self::UndecodablePayload { .. }
            | Self::InvalidDestination { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unreachable { .. } => StatusCode::BAD_GATEWAY,
            Self::Rejected { status, .. } => *status,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            // Decode failures answer with a bare status.
            Self::MissingEventType { .. } | Self::UndecodablePayload { .. } => {
                status.into_response()
            }
            Self::Rejected { status, reason, .. } => {
                let text = match reason {
                    Some(reason) if !reason.is_empty() => format!("{} {reason}", status.as_u16()),
                    _ => status.as_u16().to_string(),
                };
                (status, text).into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}
