//! Byte-for-byte relay of an inbound delivery to its destinations.
//!
//! The body is buffered once and replayed for every destination. Destinations
//! are contacted strictly in order and the first failure of any kind halts
//! the fan-out: later destinations are never attempted.

use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use hyper::ext::ReasonPhrase;
use tracing::Instrument;

use crate::error::RelayError;

/// Headers that describe the inbound connection rather than the delivery.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// The parts of an inbound request that get relayed.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Client builder for relaying.
///
/// Redirects are not followed: a 3xx answer is reported as a rejection.
pub fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().redirect(reqwest::redirect::Policy::none())
}

/// Relays deliveries over a shared HTTP client.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Relay `request` to each destination in order.
    ///
    /// Succeeds only when every destination answers below 300. An empty
    /// destination list succeeds without contacting anyone.
    pub async fn relay(
        &self,
        request: &InboundRequest,
        destinations: &[String],
        correlation_id: &str,
    ) -> Result<(), RelayError> {
        for destination in destinations {
            let span = hook_tracing::relay_forward_span!(correlation_id, destination);
            self.relay_one(request, destination).instrument(span).await?;
        }
        Ok(())
    }

    async fn relay_one(&self, request: &InboundRequest, destination: &str) -> Result<(), RelayError> {
        let outbound = self
            .client
            .request(request.method.clone(), destination)
            .headers(relayed_headers(&request.headers))
            .body(request.body.clone())
            .build()
            .map_err(|source| RelayError::InvalidDestination {
                destination: destination.to_string(),
                source,
            })?;

        let start = Instant::now();
        let result = self.client.execute(outbound).await;
        let latency = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("latency_ms", latency);

        let response = match result {
            Ok(response) => response,
            // Scheme and similar checks happen at send time but are still
            // local construction failures.
            Err(source) if source.is_builder() => {
                tracing::error!(error = %source, "Invalid destination");
                return Err(RelayError::InvalidDestination {
                    destination: destination.to_string(),
                    source,
                });
            }
            Err(source) => {
                tracing::error!(error = %source, latency_ms = latency, "Destination unreachable");
                return Err(RelayError::Unreachable {
                    destination: destination.to_string(),
                    source,
                });
            }
        };

        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());

        if status.as_u16() >= StatusCode::MULTIPLE_CHOICES.as_u16() {
            let reason = response
                .extensions()
                .get::<ReasonPhrase>()
                .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned())
                .or_else(|| status.canonical_reason().map(str::to_string));
            tracing::warn!(
                status = status.as_u16(),
                reason = ?reason,
                latency_ms = latency,
                "Destination rejected delivery"
            );
            return Err(RelayError::Rejected {
                destination: destination.to_string(),
                status,
                reason,
            });
        }

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency,
            "Relay complete"
        );
        Ok(())
    }
}

/// Inbound headers minus hop-by-hop headers and `content-length`, which the
/// client recomputes from the identical body.
fn relayed_headers(headers: &HeaderMap) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let name_str = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&name_str) || name_str == "content-length" {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::IntoFuture;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use http::HeaderValue;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Captured {
        method: Method,
        headers: HeaderMap,
        body: Bytes,
    }

    type Log = Arc<Mutex<Vec<Captured>>>;

    /// Spawn a mock destination that records each request and answers `status`.
    async fn mock_destination(status: StatusCode) -> (SocketAddr, Log) {
        mock_redirect(status, None).await
    }

    /// Like [`mock_destination`], optionally answering with a `Location` header.
    async fn mock_redirect(status: StatusCode, location: Option<String>) -> (SocketAddr, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();

        let app = axum::Router::new().fallback(move |request: axum::extract::Request| {
            let log = log_clone.clone();
            let location = location.clone();
            async move {
                let (parts, body) = request.into_parts();
                let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
                log.lock().await.push(Captured {
                    method: parts.method,
                    headers: parts.headers,
                    body,
                });
                let mut headers = HeaderMap::new();
                if let Some(location) = location {
                    headers.insert("location", HeaderValue::from_str(&location).unwrap());
                }
                (status, headers)
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, app).into_future());
        (addr, log)
    }

    /// Spawn a raw HTTP/1.1 destination that answers every request with
    /// `status_line` verbatim, so the reason phrase is under test control.
    async fn raw_destination(status_line: &'static str) -> SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut chunk = [0u8; 4096];
                // Read the head, then as much body as content-length announces.
                loop {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&request).to_lowercase();
                    if let Some(head_end) = text.find("\r\n\r\n") {
                        let content_length = text[..head_end]
                            .lines()
                            .find_map(|line| line.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if request.len() >= head_end + 4 + content_length {
                            break;
                        }
                    }
                }
                let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        addr
    }

    fn inbound() -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-github-event", HeaderValue::from_static("push"));
        headers.insert("x-github-delivery", HeaderValue::from_static("72d3162e"));
        headers.insert("x-hub-signature-256", HeaderValue::from_static("sha256=abc"));
        headers.insert("host", HeaderValue::from_static("relay.example.com"));
        InboundRequest {
            method: Method::POST,
            headers,
            body: Bytes::from_static(br#"{"ref":"refs/heads/master","zen":"  keep   spacing "}"#),
        }
    }

    fn forwarder() -> Forwarder {
        Forwarder::new(client_builder().build().unwrap())
    }

    #[tokio::test]
    async fn test_relays_body_and_headers_verbatim() {
        let (addr, log) = mock_destination(StatusCode::OK).await;
        let request = inbound();

        forwarder()
            .relay(&request, &[format!("http://{addr}/hook")], "test-id")
            .await
            .expect("relay should succeed");

        let captured = log.lock().await;
        assert_eq!(captured.len(), 1);
        let got = &captured[0];
        assert_eq!(got.method, Method::POST);
        assert_eq!(got.body, request.body);
        for name in ["content-type", "x-github-event", "x-github-delivery", "x-hub-signature-256"] {
            assert_eq!(got.headers.get(name), request.headers.get(name), "header {name}");
        }
        // Host is the destination's, not the caller's.
        assert_ne!(
            got.headers.get("host").and_then(|h| h.to_str().ok()),
            Some("relay.example.com")
        );
        assert!(got.headers.get("x-hook-relay-id").is_none());
    }

    #[tokio::test]
    async fn test_every_destination_receives_same_body() {
        let (first, first_log) = mock_destination(StatusCode::OK).await;
        let (second, second_log) = mock_destination(StatusCode::ACCEPTED).await;
        let request = inbound();

        forwarder()
            .relay(
                &request,
                &[format!("http://{first}/a"), format!("http://{second}/b")],
                "test-id",
            )
            .await
            .expect("relay should succeed");

        assert_eq!(first_log.lock().await[0].body, request.body);
        assert_eq!(second_log.lock().await[0].body, request.body);
    }

    #[tokio::test]
    async fn test_rejection_halts_fan_out() {
        let (failing, failing_log) = mock_destination(StatusCode::SERVICE_UNAVAILABLE).await;
        let (never, never_log) = mock_destination(StatusCode::OK).await;

        let err = forwarder()
            .relay(
                &inbound(),
                &[format!("http://{failing}/"), format!("http://{never}/")],
                "test-id",
            )
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(failing_log.lock().await.len(), 1);
        assert!(never_log.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_status_counts_as_failure() {
        let (addr, _log) = mock_destination(StatusCode::NOT_MODIFIED).await;

        let err = forwarder()
            .relay(&inbound(), &[format!("http://{addr}/")], "test-id")
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_redirects_are_reported_not_followed() {
        for status in [StatusCode::MOVED_PERMANENTLY, StatusCode::TEMPORARY_REDIRECT] {
            let (target, target_log) = mock_destination(StatusCode::OK).await;
            let (moved, moved_log) =
                mock_redirect(status, Some(format!("http://{target}/moved"))).await;
            let request = inbound();

            let err = forwarder()
                .relay(&request, &[format!("http://{moved}/")], "test-id")
                .await
                .unwrap_err();

            assert_eq!(err.status_code(), status);
            assert!(target_log.lock().await.is_empty(), "{status} was followed");
            let moved_log = moved_log.lock().await;
            assert_eq!(moved_log.len(), 1);
            assert_eq!(moved_log[0].method, Method::POST);
            assert_eq!(moved_log[0].body, request.body);
        }
    }

    #[tokio::test]
    async fn test_rejection_keeps_destination_reason_phrase() {
        let addr = raw_destination("HTTP/1.1 503 Down for maintenance").await;

        let err = forwarder()
            .relay(&inbound(), &[format!("http://{addr}/")], "test-id")
            .await
            .unwrap_err();

        match err {
            RelayError::Rejected { status, reason, .. } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(reason.as_deref(), Some("Down for maintenance"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejection_without_custom_phrase_uses_canonical_reason() {
        let (addr, _log) = mock_destination(StatusCode::NOT_FOUND).await;

        let err = forwarder()
            .relay(&inbound(), &[format!("http://{addr}/")], "test-id")
            .await
            .unwrap_err();

        match err {
            RelayError::Rejected { reason, .. } => assert_eq!(reason.as_deref(), Some("Not Found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_destination_is_internal_error() {
        let (never, never_log) = mock_destination(StatusCode::OK).await;

        let err = forwarder()
            .relay(
                &inbound(),
                &["not a url".to_string(), format!("http://{never}/")],
                "test-id",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::InvalidDestination { .. }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(never_log.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_bad_gateway() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = forwarder()
            .relay(&inbound(), &[format!("http://{addr}/")], "test-id")
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Unreachable { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_empty_destination_list_succeeds() {
        forwarder()
            .relay(&inbound(), &[], "test-id")
            .await
            .expect("nothing to relay is a success");
    }

    #[test]
    fn test_relayed_headers_drop_connection_headers() {
        let mut headers = inbound().headers;
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("content-length", HeaderValue::from_static("52"));
        headers.append("x-multi", HeaderValue::from_static("one"));
        headers.append("x-multi", HeaderValue::from_static("two"));

        let relayed = relayed_headers(&headers);
        assert!(relayed.get("host").is_none());
        assert!(relayed.get("connection").is_none());
        assert!(relayed.get("content-length").is_none());
        assert_eq!(relayed.get_all("x-multi").iter().count(), 2);
        assert_eq!(relayed.get("x-github-event"), headers.get("x-github-event"));
    }
}
