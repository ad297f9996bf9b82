//! Span builder helpers for hook-relay instrumentation.

/// Create a tracing span for one inbound webhook delivery.
///
/// Usage: `let span = relay_request_span!(correlation_id, event_type);`
///
/// Fields recorded later by the handler:
/// - `route`: how destinations were chosen (matched selector or broadcast)
/// - `destinations`: number of destinations selected
/// - `status`: status code returned to the caller
#[macro_export]
macro_rules! relay_request_span {
    ($correlation_id:expr, $event_type:expr) => {
        tracing::info_span!(
            "relay_request",
            correlation_id = %$correlation_id,
            event_type = %$event_type,
            route = tracing::field::Empty,
            destinations = tracing::field::Empty,
            status = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for a single outbound relay to one destination.
#[macro_export]
macro_rules! relay_forward_span {
    ($correlation_id:expr, $destination:expr) => {
        tracing::info_span!(
            "relay_forward",
            correlation_id = %$correlation_id,
            destination = %$destination,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
