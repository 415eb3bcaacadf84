//! WebhookSink - HTTP delivery to statically configured endpoints.
//!
//! Destination names resolve through a `DestinationMap`; the payload is
//! posted verbatim with the logical name in `X-Ferry-Destination`.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::domain::DeliveryError;
use crate::ports::{Ack, DeliverySink};

pub const DESTINATION_HEADER: &str = "X-Ferry-Destination";

/// Logical destination name -> URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationMap {
    routes: HashMap<String, String>,
}

impl DestinationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.routes.insert(name.into(), url.into());
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid destination '{0}', expected name=url")]
pub struct ParseRouteError(pub String);

/// One `name=url` pair, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub url: String,
}

impl FromStr for Route {
    type Err = ParseRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => Ok(Route {
                name: name.trim().to_string(),
                url: url.trim().to_string(),
            }),
            _ => Err(ParseRouteError(s.to_string())),
        }
    }
}

impl FromIterator<Route> for DestinationMap {
    fn from_iter<I: IntoIterator<Item = Route>>(iter: I) -> Self {
        let mut map = DestinationMap::new();
        for route in iter {
            map.insert(route.name, route.url);
        }
        map
    }
}

/// Map an HTTP response status to the delivery outcome.
///
/// - 2xx: delivered
/// - 408, 425, 429, 5xx: transient
/// - any other status: permanent
pub fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }
    let retryable = matches!(status.as_u16(), 408 | 425 | 429) || status.is_server_error();

    let message = format!("HTTP {status}");
    if retryable {
        Err(DeliveryError::transient(message))
    } else {
        Err(DeliveryError::permanent(message))
    }
}

pub struct WebhookSink {
    client: Client,
    routes: DestinationMap,
}

impl WebhookSink {
    /// `timeout` bounds each request at the transport level. The Publisher
    /// Loop applies its own send timeout on top.
    pub fn new(routes: DestinationMap, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, routes })
    }

    pub fn with_client(client: Client, routes: DestinationMap) -> Self {
        Self { client, routes }
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn send(&self, destination: &str, payload: &[u8]) -> Result<Ack, DeliveryError> {
        let url = self.routes.resolve(destination).ok_or_else(|| {
            DeliveryError::permanent(format!("unknown destination '{destination}'"))
        })?;

        debug!(url = %url, destination = %destination, bytes = payload.len(), "posting payload");

        let response = self
            .client
            .post(url)
            .header(DESTINATION_HEADER, destination)
            .header("Content-Type", "application/octet-stream")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| DeliveryError::transient(format!("transport error: {e}")))?;

        classify_status(response.status())?;

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Ack { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeliveryErrorKind;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};

    #[rstest]
    #[case::ok(200, None)]
    #[case::accepted(202, None)]
    #[case::request_timeout(408, Some(DeliveryErrorKind::Transient))]
    #[case::too_early(425, Some(DeliveryErrorKind::Transient))]
    #[case::throttled(429, Some(DeliveryErrorKind::Transient))]
    #[case::unavailable(503, Some(DeliveryErrorKind::Transient))]
    #[case::bad_request(400, Some(DeliveryErrorKind::Permanent))]
    #[case::not_found(404, Some(DeliveryErrorKind::Permanent))]
    #[case::too_large(413, Some(DeliveryErrorKind::Permanent))]
    fn classifies_status(#[case] code: u16, #[case] expected: Option<DeliveryErrorKind>) {
        let status = StatusCode::from_u16(code).unwrap();
        assert_eq!(classify_status(status).err().map(|e| e.kind), expected);
    }

    #[test]
    fn parses_routes() {
        let route: Route = "orders=http://localhost:9000/orders".parse().unwrap();
        assert_eq!(route.name, "orders");
        assert_eq!(route.url, "http://localhost:9000/orders");

        assert!("orders".parse::<Route>().is_err());
        assert!("=http://x".parse::<Route>().is_err());

        let map: DestinationMap = vec![route].into_iter().collect();
        assert_eq!(map.resolve("orders"), Some("http://localhost:9000/orders"));
        assert_eq!(map.resolve("billing"), None);
    }

    #[tokio::test]
    async fn unknown_destination_fails_permanently() {
        let sink = WebhookSink::new(DestinationMap::new(), Duration::from_secs(1)).unwrap();
        let err = sink.send("orders", b"{}").await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Permanent);
    }

    #[tokio::test]
    async fn posts_payload_to_resolved_url() {
        use axum::{Router, body::Bytes, http::HeaderMap, routing::post};

        let seen: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::default();
        let app = Router::new()
            .route(
                "/orders",
                post({
                    let seen = seen.clone();
                    move |headers: HeaderMap, body: Bytes| {
                        let seen = seen.clone();
                        async move {
                            let dest = headers
                                .get(DESTINATION_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string();
                            seen.lock().unwrap().push((dest, body.to_vec()));
                            StatusCode::ACCEPTED
                        }
                    }
                }),
            )
            .route("/throttled", post(|| async { StatusCode::TOO_MANY_REQUESTS }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut routes = DestinationMap::new();
        routes.insert("orders", format!("http://{addr}/orders"));
        routes.insert("slow", format!("http://{addr}/throttled"));
        let sink = WebhookSink::new(routes, Duration::from_secs(5)).unwrap();

        sink.send("orders", br#"{"a":1}"#).await.unwrap();
        let err = sink.send("slow", b"x").await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Transient);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("orders".to_string(), br#"{"a":1}"#.to_vec())]);
    }
}
