//! Outbound calls to upstreams.
//!
//! # Responsibilities
//! - Represent a resolved upstream target
//! - Bound concurrent connections per upstream
//! - Forward a request over the shared keep-alive pool and buffer the body

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header::HeaderName, HeaderValue, Method, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::Semaphore;
use tokio::time;
use url::Url;

use crate::config::validation::parse_upstream_url;
use crate::config::UpstreamConfig;
use crate::error::ProxyError;
use crate::observability::metrics;

/// Upper bound on a buffered upstream body.
pub const MAX_UPSTREAM_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Request headers that describe the inbound hop and must not be replayed.
const HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "accept-encoding",
];

/// A resolved upstream.
#[derive(Debug)]
pub struct UpstreamTarget {
    pub id: String,
    pub base_url: Url,
    /// Connection slots; one permit per in-flight request.
    permits: Semaphore,
}

impl UpstreamTarget {
    pub fn new(config: &UpstreamConfig, max_connections: usize) -> Result<Self, ProxyError> {
        let base_url = parse_upstream_url(&config.url)
            .map_err(|reason| ProxyError::UpstreamUnresolved(format!("{}: {reason}", config.id)))?;
        Ok(Self {
            id: config.id.clone(),
            base_url,
            permits: Semaphore::new(max_connections),
        })
    }

    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Pooled, keep-alive HTTP client shared by all in-flight requests of a worker.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, max_idle_per_host: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_keepalive(Some(Duration::from_secs(60)));
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(timeout));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(max_idle_per_host)
            .build(connector);

        Self { client, timeout }
    }

    /// `GET` the request target from the upstream and return the whole body.
    pub async fn forward(
        &self,
        target: &UpstreamTarget,
        path_and_query: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes, ProxyError> {
        let url = target
            .base_url
            .join(path_and_query)
            .map_err(|e| ProxyError::UpstreamFailed(format!("bad target {path_and_query}: {e}")))?;

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .body(Body::empty())
            .map_err(|e| ProxyError::UpstreamFailed(e.to_string()))?;
        copy_forwardable_headers(headers, &mut request);

        let start = Instant::now();
        // Waiting for a connection slot counts against the deadline too.
        let exchange = async {
            let _permit = target
                .permits
                .acquire()
                .await
                .map_err(|_| ProxyError::UpstreamFailed("connection limiter closed".into()))?;
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ProxyError::UpstreamFailed(e.to_string()))?;
            let status = response.status();
            let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_UPSTREAM_BODY_BYTES)
                .await
                .map_err(|e| ProxyError::UpstreamFailed(e.to_string()))?;
            Ok::<_, ProxyError>((status, body))
        };

        match time::timeout(self.timeout, exchange).await {
            Ok(Ok((status, body))) => {
                tracing::debug!(upstream = %target.id, url = %url, status = %status, bytes = body.len(), "Upstream responded");
                metrics::record_upstream(&target.id, "ok", start);
                Ok(body)
            }
            Ok(Err(e)) => {
                tracing::warn!(upstream = %target.id, url = %url, error = %e, "Upstream error");
                metrics::record_upstream(&target.id, "error", start);
                Err(e)
            }
            Err(_) => {
                tracing::warn!(upstream = %target.id, url = %url, timeout = ?self.timeout, "Upstream timed out");
                metrics::record_upstream(&target.id, "timeout", start);
                Err(ProxyError::UpstreamFailed(format!("timed out after {:?}", self.timeout)))
            }
        }
    }
}

fn copy_forwardable_headers(headers: &HashMap<String, String>, request: &mut Request<Body>) {
    let out = request.headers_mut();
    for (name, value) in headers {
        if HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                out.append(name, value);
            }
            _ => tracing::debug!(header = %name, "Dropping header that is not valid on the wire"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_headers_are_not_forwarded() {
        let mut headers = HashMap::new();
        headers.insert("Host".to_string(), "proxy.local".to_string());
        headers.insert("accept".to_string(), "application/json".to_string());
        headers.insert("Accept-Encoding".to_string(), "gzip".to_string());
        headers.insert("x-bad".to_string(), "line\nbreak".to_string());

        let mut request = Request::new(Body::empty());
        copy_forwardable_headers(&headers, &mut request);

        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.headers()["accept"], "application/json");
    }

    #[test]
    fn target_parses_bare_host() {
        let config = UpstreamConfig { id: "node1".into(), url: "127.0.0.1:9".into() };
        let target = UpstreamTarget::new(&config, 4).unwrap();
        assert_eq!(target.base_url.join("/todos?id=1").unwrap().as_str(), "http://127.0.0.1:9/todos?id=1");
        assert_eq!(target.available_connections(), 4);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_upstream_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = UpstreamConfig { id: "gone".into(), url: format!("http://{addr}") };
        let target = UpstreamTarget::new(&config, 1).unwrap();
        let client = UpstreamClient::new(Duration::from_secs(2), 1);

        let err = client.forward(&target, "/", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamFailed(_)));
        assert_eq!(target.available_connections(), 1, "permit released after failure");
    }

    #[tokio::test]
    async fn saturated_upstream_times_out_waiting_for_a_slot() {
        let config = UpstreamConfig { id: "busy".into(), url: "http://127.0.0.1:9".into() };
        let target = UpstreamTarget::new(&config, 1).unwrap();
        let held = target.permits.acquire().await.unwrap();
        let client = UpstreamClient::new(Duration::from_millis(100), 1);

        let err = time::timeout(Duration::from_secs(2), client.forward(&target, "/", &HashMap::new()))
            .await
            .expect("forward gives up at its own deadline")
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamFailed(reason) if reason.starts_with("timed out")));

        drop(held);
        assert_eq!(target.available_connections(), 1);
    }
}
