//! Correlation ID generation for request tracing.

use uuid::Uuid;

/// Response header carrying the relay's id for an inbound delivery.
///
/// Only set on the response to the caller, never on relayed requests.
pub const CORRELATION_HEADER: &str = "x-hook-relay-id";

/// Generate a new correlation ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
