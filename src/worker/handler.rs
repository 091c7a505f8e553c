//! Per-request resolution inside a worker.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::error::ProxyError;
use crate::protocol::{codec, ReplyDescriptor, RequestDescriptor};
use crate::routing::{path_of, RuleTable};
use crate::worker::upstream::{UpstreamClient, UpstreamTarget};

/// Routing state and outbound pool of one worker, fixed at startup.
pub struct Worker {
    id: usize,
    rules: RuleTable,
    upstreams: HashMap<String, Arc<UpstreamTarget>>,
    client: UpstreamClient,
}

impl Worker {
    /// Validate the configuration independently and build the routing state.
    pub fn from_config(id: usize, config: &ProxyConfig) -> Result<Self, ProxyError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let max_connections = config.server.max_connections_per_upstream;
        let upstreams = config
            .server
            .upstreams
            .iter()
            .map(|u| -> Result<_, ProxyError> {
                Ok((u.id.clone(), Arc::new(UpstreamTarget::new(u, max_connections)?)))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            id,
            rules: RuleTable::new(config.server.rules.clone()),
            upstreams,
            client: UpstreamClient::new(config.server.upstream_timeout(), max_connections),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Handle one raw line. `None` when the line is too broken to answer.
    pub async fn handle_line(&self, line: &str) -> Option<ReplyDescriptor> {
        match codec::decode_request(line) {
            Ok(request) => Some(self.handle(request).await),
            Err(malformed) => {
                tracing::warn!(worker = self.id, error = %malformed.error, "Malformed request descriptor");
                malformed
                    .correlation_id
                    .map(|id| ReplyDescriptor::failure(id, &malformed.error))
            }
        }
    }

    pub async fn handle(&self, request: RequestDescriptor) -> ReplyDescriptor {
        if let Err(e) = request.validate() {
            return ReplyDescriptor::failure(request.correlation_id, &e);
        }

        match self.forward(&request).await {
            Ok(data) => ReplyDescriptor::success(request.correlation_id, data),
            Err(e) => {
                tracing::debug!(
                    worker = self.id,
                    correlation_id = %request.correlation_id,
                    url = %request.url,
                    error = %e,
                    "Request failed in worker"
                );
                ReplyDescriptor::failure(request.correlation_id, &e)
            }
        }
    }

    async fn forward(&self, request: &RequestDescriptor) -> Result<String, ProxyError> {
        let target = self.resolve(&request.url)?;
        tracing::debug!(
            worker = self.id,
            correlation_id = %request.correlation_id,
            upstream = %target.id,
            url = %request.url,
            "Forwarding request"
        );
        let body = self.client.forward(target, &request.url, &request.headers).await?;
        Ok(match String::from_utf8(body.to_vec()) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Rule by exact path, then its first upstream id, then the upstream itself.
    pub fn resolve(&self, target: &str) -> Result<&UpstreamTarget, ProxyError> {
        let path = path_of(target);
        let rule = self
            .rules
            .find(path)
            .ok_or_else(|| ProxyError::RuleNotFound(path.to_string()))?;
        let upstream_id = rule
            .upstreams
            .first()
            .ok_or_else(|| ProxyError::UpstreamUnresolved(format!("rule {path} lists no upstream")))?;
        self.upstreams
            .get(upstream_id)
            .map(Arc::as_ref)
            .ok_or_else(|| ProxyError::UpstreamUnresolved(format!("upstream {upstream_id} is not declared")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleConfig, UpstreamConfig};
    use crate::protocol::ErrorCode;
    use axum::{extract::OriginalUri, Router};
    use std::net::SocketAddr;

    async fn start_backend(name: &'static str) -> SocketAddr {
        let app = Router::new().fallback(move |OriginalUri(uri): OriginalUri| async move {
            format!("{name}:{uri}")
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn config_with(upstreams: Vec<UpstreamConfig>, rules: Vec<(&str, Vec<&str>)>) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.server.upstreams = upstreams;
        config.server.rules = rules
            .into_iter()
            .map(|(path, ids)| RuleConfig {
                path: path.into(),
                upstreams: ids.into_iter().map(String::from).collect(),
                rate_limit: None,
                cache: None,
            })
            .collect();
        config
    }

    fn upstream(id: &str, addr: SocketAddr) -> UpstreamConfig {
        UpstreamConfig { id: id.into(), url: format!("http://{addr}") }
    }

    #[tokio::test]
    async fn forwards_to_first_listed_upstream() {
        let a = start_backend("a").await;
        let b = start_backend("b").await;
        let config = config_with(
            vec![upstream("a", a), upstream("b", b)],
            vec![("/todos", vec!["b", "a"])],
        );
        let worker = Worker::from_config(0, &config).unwrap();

        let reply = worker
            .handle(RequestDescriptor::http("c1", "/todos?page=2", HashMap::new()))
            .await;
        assert_eq!(reply.correlation_id, "c1");
        assert_eq!(reply.data.as_deref(), Some("b:/todos?page=2"));
        assert!(reply.validate().is_ok());
    }

    #[tokio::test]
    async fn unknown_path_is_rule_not_found() {
        let config = config_with(vec![], vec![("/todos", vec!["a"])]);
        let worker = Worker::from_config(0, &config).unwrap();

        let reply = worker.handle(RequestDescriptor::http("c2", "/missing", HashMap::new())).await;
        assert_eq!(reply.error_code, Some(ErrorCode::NotFound));
        assert_eq!(reply.error.as_deref(), Some("Rule Not Found"));
    }

    #[tokio::test]
    async fn unresolved_upstreams_are_internal_errors() {
        let config = config_with(vec![], vec![("/empty", vec![]), ("/dangling", vec!["ghost"])]);
        let worker = Worker::from_config(0, &config).unwrap();

        for path in ["/empty", "/dangling"] {
            let reply = worker.handle(RequestDescriptor::http("c", path, HashMap::new())).await;
            assert_eq!(reply.error_code, Some(ErrorCode::Internal), "{path}");
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_answered_when_possible() {
        let worker = Worker::from_config(0, &ProxyConfig::default()).unwrap();

        let reply = worker
            .handle_line(r#"{"correlationId":"c3","requestType":"ftp","url":"/a"}"#)
            .await
            .unwrap();
        assert_eq!(reply.error_code, Some(ErrorCode::BadRequest));

        assert!(worker.handle_line("{broken").await.is_none());
    }

    #[test]
    fn invalid_config_is_fatal() {
        let mut config = ProxyConfig::default();
        config.server.workers = 0;
        assert!(matches!(
            Worker::from_config(0, &config),
            Err(ProxyError::ConfigInvalid(ConfigError::Validation(_)))
        ));
    }
}
