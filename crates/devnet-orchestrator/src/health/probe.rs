//! Readiness probes.
//!
//! Each probe performs exactly one attempt per call; retrying and timing are
//! left to [`poll_until`](super::poll_until).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpStream;

use crate::container::{ContainerHandle, EngineHealth};
use crate::engine::ContainerEngine;
use crate::health::poll::ProbeFailure;

/// Per-attempt timeout of network probes.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness query understood by any GraphQL server.
pub const TYPENAME_QUERY: &str = "{ __typename }";

/// Query returning the indexed chain tip.
pub const TIP_HEIGHT_QUERY: &str = "{ state { tip { height } } }";

/// A single readiness check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Describes what is probed (URL, address or container).
    fn target(&self) -> String;

    /// Makes one attempt.
    async fn attempt(&self) -> Result<(), ProbeFailure>;
}

fn http_client() -> Result<reqwest::Client, ProbeFailure> {
    reqwest::Client::builder()
        .timeout(ATTEMPT_TIMEOUT)
        .build()
        .map_err(ProbeFailure::new)
}

/// Succeeds when a GET returns a 2xx status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Creates an HTTP probe.
    pub fn new(url: impl Into<String>) -> Result<Self, ProbeFailure> {
        Ok(Self {
            url: url.into(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn target(&self) -> String {
        self.url.clone()
    }

    async fn attempt(&self) -> Result<(), ProbeFailure> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(ProbeFailure::new)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeFailure(format!("HTTP {}", status)))
        }
    }
}

/// Succeeds when a WebSocket handshake completes.
#[derive(Debug, Clone)]
pub struct WebSocketProbe {
    url: String,
    timeout: Duration,
}

impl WebSocketProbe {
    /// Creates a WebSocket probe.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: ATTEMPT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Probe for WebSocketProbe {
    fn target(&self) -> String {
        self.url.clone()
    }

    async fn attempt(&self) -> Result<(), ProbeFailure> {
        let handshake = tokio_tungstenite::connect_async(self.url.as_str());
        match tokio::time::timeout(self.timeout, handshake).await {
            Ok(Ok((mut stream, _response))) => {
                let _ = stream.close(None).await;
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeFailure::new(e)),
            Err(_) => Err(ProbeFailure(format!(
                "handshake did not complete within {:?}",
                self.timeout
            ))),
        }
    }
}

/// What a [`GraphqlProbe`] checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphqlCheck {
    /// The endpoint answers `{ __typename }` without errors.
    Liveness,

    /// The indexed tip is at least this high.
    TipHeight(u64),
}

/// POSTs a fixed GraphQL query and inspects the answer.
#[derive(Debug, Clone)]
pub struct GraphqlProbe {
    url: String,
    check: GraphqlCheck,
    client: reqwest::Client,
}

impl GraphqlProbe {
    /// Creates a GraphQL probe.
    pub fn new(url: impl Into<String>, check: GraphqlCheck) -> Result<Self, ProbeFailure> {
        Ok(Self {
            url: url.into(),
            check,
            client: http_client()?,
        })
    }

    /// Probe that the endpoint is up.
    pub fn liveness(url: impl Into<String>) -> Result<Self, ProbeFailure> {
        Self::new(url, GraphqlCheck::Liveness)
    }

    /// Probe that the indexer has indexed at least `min_height` blocks.
    pub fn synced(url: impl Into<String>, min_height: u64) -> Result<Self, ProbeFailure> {
        Self::new(url, GraphqlCheck::TipHeight(min_height))
    }

    /// Returns the query this probe sends.
    pub fn query(&self) -> &'static str {
        match self.check {
            GraphqlCheck::Liveness => TYPENAME_QUERY,
            GraphqlCheck::TipHeight(_) => TIP_HEIGHT_QUERY,
        }
    }
}

/// Returns the first GraphQL error message of a response body, if any.
pub(crate) fn first_error(body: &Value) -> Option<String> {
    let errors = body.get("errors")?.as_array()?;
    let first = errors.first()?;
    Some(
        first
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| first.to_string()),
    )
}

/// Extracts `data.state.tip.height` from a response body.
pub(crate) fn tip_height(body: &Value) -> Option<u64> {
    body.pointer("/data/state/tip/height")?.as_u64()
}

/// Judges a GraphQL response body against a check.
pub(crate) fn evaluate(check: GraphqlCheck, body: &Value) -> Result<(), ProbeFailure> {
    if let Some(message) = first_error(body) {
        return Err(ProbeFailure(format!("GraphQL error: {}", message)));
    }

    match check {
        GraphqlCheck::Liveness => Ok(()),
        GraphqlCheck::TipHeight(min) => match tip_height(body) {
            Some(height) if height >= min => Ok(()),
            Some(height) => Err(ProbeFailure(format!(
                "tip height {} below {}",
                height, min
            ))),
            None => Err(ProbeFailure::new("no chain tip indexed yet")),
        },
    }
}

#[async_trait]
impl Probe for GraphqlProbe {
    fn target(&self) -> String {
        self.url.clone()
    }

    async fn attempt(&self) -> Result<(), ProbeFailure> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": self.query() }))
            .send()
            .await
            .map_err(ProbeFailure::new)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeFailure(format!("HTTP {}", status)));
        }

        let body: Value = response.json().await.map_err(ProbeFailure::new)?;
        evaluate(self.check, &body)
    }
}

/// Succeeds when a TCP connection can be opened.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    /// Creates a TCP probe for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            address: format!("{}:{}", host, port),
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn target(&self) -> String {
        self.address.clone()
    }

    async fn attempt(&self) -> Result<(), ProbeFailure> {
        match tokio::time::timeout(ATTEMPT_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeFailure::new(e)),
            Err(_) => Err(ProbeFailure::new("connect timed out")),
        }
    }
}

/// Reads the engine's view of a container's health.
///
/// Uses the configured health check when there is one, otherwise whether
/// the container is running.
#[derive(Clone)]
pub struct EngineHealthProbe {
    engine: Arc<dyn ContainerEngine>,
    handle: ContainerHandle,
}

impl EngineHealthProbe {
    /// Creates an engine health probe.
    pub fn new(engine: Arc<dyn ContainerEngine>, handle: ContainerHandle) -> Self {
        Self { engine, handle }
    }
}

#[async_trait]
impl Probe for EngineHealthProbe {
    fn target(&self) -> String {
        format!("container {}", self.handle.name)
    }

    async fn attempt(&self) -> Result<(), ProbeFailure> {
        let status = self
            .engine
            .inspect_container(&self.handle.id)
            .await
            .map_err(ProbeFailure::new)?;

        match status.health {
            Some(EngineHealth::Healthy) => Ok(()),
            Some(EngineHealth::Starting) => Err(ProbeFailure::new("health check starting")),
            Some(EngineHealth::Unhealthy) => Err(ProbeFailure::new("container is unhealthy")),
            None if status.is_running() => Ok(()),
            None => Err(ProbeFailure(format!(
                "container is not running ({:?})",
                status.state
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::InMemoryEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves every connection with the same HTTP response.
    async fn serve(status: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        port
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_evaluate_liveness() {
        let ok = json!({ "data": { "__typename": "Query" } });
        assert!(evaluate(GraphqlCheck::Liveness, &ok).is_ok());

        let failed = json!({ "data": null, "errors": [{ "message": "starting up" }] });
        let err = evaluate(GraphqlCheck::Liveness, &failed).unwrap_err();
        assert_eq!(err.0, "GraphQL error: starting up");

        let empty_errors = json!({ "data": { "__typename": "Query" }, "errors": [] });
        assert!(evaluate(GraphqlCheck::Liveness, &empty_errors).is_ok());
    }

    #[test]
    fn test_evaluate_tip_height() {
        let genesis = json!({ "data": { "state": { "tip": { "height": 0 } } } });
        assert!(evaluate(GraphqlCheck::TipHeight(1), &genesis).is_err());

        let synced = json!({ "data": { "state": { "tip": { "height": 3 } } } });
        assert!(evaluate(GraphqlCheck::TipHeight(1), &synced).is_ok());

        let no_tip = json!({ "data": { "state": { "tip": null } } });
        assert_eq!(
            evaluate(GraphqlCheck::TipHeight(1), &no_tip).unwrap_err().0,
            "no chain tip indexed yet"
        );
    }

    #[test]
    fn test_graphql_queries_are_fixed() {
        let live = GraphqlProbe::liveness("http://localhost:8088/api/v3/graphql").unwrap();
        assert_eq!(live.query(), "{ __typename }");
        let synced = GraphqlProbe::synced("http://localhost:8088/api/v3/graphql", 1).unwrap();
        assert_eq!(synced.query(), "{ state { tip { height } } }");
    }

    #[tokio::test]
    async fn test_http_probe_status() {
        let ok = serve("200 OK", "{}").await;
        let probe = HttpProbe::new(format!("http://127.0.0.1:{}/health", ok)).unwrap();
        probe.attempt().await.unwrap();

        let unavailable = serve("503 Service Unavailable", "{}").await;
        let probe = HttpProbe::new(format!("http://127.0.0.1:{}/health", unavailable)).unwrap();
        assert_eq!(probe.attempt().await.unwrap_err().0, "HTTP 503 Service Unavailable");
    }

    #[tokio::test]
    async fn test_graphql_probe_against_server() {
        let port = serve("200 OK", r#"{"data":{"state":{"tip":{"height":7}}}}"#).await;
        let url = format!("http://127.0.0.1:{}/api/v3/graphql", port);

        GraphqlProbe::liveness(&url).unwrap().attempt().await.unwrap();
        GraphqlProbe::synced(&url, 1).unwrap().attempt().await.unwrap();
        assert!(GraphqlProbe::synced(&url, 8).unwrap().attempt().await.is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        TcpProbe::new("127.0.0.1", port).attempt().await.unwrap();
        drop(listener);

        let port = closed_port().await;
        let probe = TcpProbe::new("127.0.0.1", port);
        assert_eq!(probe.target(), format!("127.0.0.1:{}", port));
        assert!(probe.attempt().await.is_err());
    }

    #[tokio::test]
    async fn test_websocket_probe_completes_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = tokio_tungstenite::accept_async(socket).await;
                });
            }
        });

        let probe = WebSocketProbe::new(format!("ws://127.0.0.1:{}", port));
        probe.attempt().await.unwrap();
        probe.attempt().await.unwrap();
    }

    #[tokio::test]
    async fn test_websocket_probe_rejects_plain_tcp() {
        let port = serve("200 OK", "{}").await;
        let probe = WebSocketProbe::new(format!("ws://127.0.0.1:{}", port));
        assert!(probe.attempt().await.is_err());
    }

    #[tokio::test]
    async fn test_engine_health_probe() {
        let engine = Arc::new(InMemoryEngine::new());
        let config = crate::config::ClusterConfig::default();
        let indexer = crate::container::create_indexer(engine.as_ref(), &config)
            .await
            .unwrap();
        let node = crate::container::create_node(engine.as_ref(), &config)
            .await
            .unwrap();

        let indexer_probe = EngineHealthProbe::new(engine.clone(), indexer.clone());
        assert!(indexer_probe.attempt().await.is_err());
        engine.set_health(&indexer.name, EngineHealth::Healthy).await;
        indexer_probe.attempt().await.unwrap();

        // No health check configured: falls back to the run state.
        let node_probe = EngineHealthProbe::new(engine.clone(), node.clone());
        assert!(node_probe.attempt().await.is_err());
        crate::container::start(engine.as_ref(), &node).await.unwrap();
        node_probe.attempt().await.unwrap();
    }
}
