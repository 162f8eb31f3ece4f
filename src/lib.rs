use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod host;
pub mod http;
pub mod logging;
pub mod mcp;

use dispatch::{DispatchQueue, DispatchSettings};
use domain::{
    resources::{ResourceProvider, SceneResources},
    scene::SceneHandle,
    tools::{HostInfoTools, SceneTools},
};
use http::sse::NotificationHub;
use mcp::{registry::ToolRegistry, server::McpRouter};

pub const DEFAULT_SSE_KEEPALIVE: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub router: McpRouter,
    pub dispatcher: Arc<DispatchQueue>,
    pub notifications: Arc<NotificationHub>,
    pub sse_keepalive: Duration,
}

impl AppState {
    pub fn new(
        tools: ToolRegistry,
        resources: Arc<dyn ResourceProvider>,
        notifications: Arc<NotificationHub>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            router: McpRouter::new(Arc::new(tools), resources),
            dispatcher: Arc::new(DispatchQueue::new(settings)),
            notifications,
            sse_keepalive: DEFAULT_SSE_KEEPALIVE,
        }
    }

    /// State for the bundled scene host: scene tools, host info and scene
    /// resources, all sharing one notification hub.
    pub fn for_scene(scene: SceneHandle, settings: DispatchSettings) -> Self {
        let notifications = Arc::new(NotificationHub::new());
        let tools = ToolRegistry::new()
            .with_provider(Arc::new(SceneTools::new(
                Arc::clone(&scene),
                Arc::clone(&notifications),
            )))
            .with_provider(Arc::new(HostInfoTools));

        Self::new(
            tools,
            Arc::new(SceneResources::new(scene)),
            notifications,
            settings,
        )
    }

    pub fn with_sse_keepalive(mut self, interval: Duration) -> Self {
        self.sse_keepalive = interval;
        self
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route("/", post(http::handlers::message_endpoint))
        .route("/message", post(http::handlers::message_endpoint))
        .route("/sse", get(http::sse::sse_endpoint))
        .layer(cors_layer())
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::dispatch::TimeoutPolicy;
    use crate::domain::scene::Scene;
    use crate::host::HostLoop;

    use super::*;

    struct Harness {
        app: Router,
        state: AppState,
        _host: HostLoop,
    }

    fn harness_with(state: AppState) -> Harness {
        let host = HostLoop::spawn(
            Arc::clone(&state.dispatcher),
            Duration::from_millis(1),
            || {},
        )
        .expect("spawn host loop");

        Harness {
            app: build_app(state.clone()),
            state,
            _host: host,
        }
    }

    fn harness() -> Harness {
        harness_with(AppState::for_scene(
            Scene::shared(),
            DispatchSettings::default(),
        ))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request build")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&body).expect("valid json response")
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = harness()
            .app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(body, "{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn discovery_lists_endpoints() {
        let response = harness()
            .app
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message_endpoint"], "/message");
        assert_eq!(body["sse_endpoint"], "/sse");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = harness()
            .app
            .oneshot(post_json("/mcp", r#"{"method":"ping"}"#))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_verb_is_rejected() {
        let response = harness()
            .app
            .oneshot(
                Request::builder()
                    .uri("/message")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn ping_over_message_and_root() {
        let harness = harness();
        for uri in ["/message", "/"] {
            let response = harness
                .app
                .clone()
                .oneshot(post_json(uri, r#"{"jsonrpc":"2.0","id":"p1","method":"ping"}"#))
                .await
                .expect("request execution");

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
            let body = response
                .into_body()
                .collect()
                .await
                .expect("collect body")
                .to_bytes();
            assert_eq!(
                body,
                r#"{"jsonrpc":"2.0","id":"p1","result":{"pong":true}}"#
            );
        }
    }

    #[tokio::test]
    async fn protocol_errors_are_http_200() {
        let harness = harness();

        let malformed = harness
            .app
            .clone()
            .oneshot(post_json("/message", r#"{"method":"ping","params":{"#))
            .await
            .expect("request execution");
        assert_eq!(malformed.status(), StatusCode::OK);
        assert_eq!(body_json(malformed).await["error"]["code"], -32700);

        let unknown = harness
            .app
            .clone()
            .oneshot(post_json("/message", r#"{"id":1,"method":"nope"}"#))
            .await
            .expect("request execution");
        assert_eq!(unknown.status(), StatusCode::OK);
        assert_eq!(body_json(unknown).await["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn unknown_tool_reports_tool_name() {
        let response = harness()
            .app
            .oneshot(post_json(
                "/message",
                r#"{"method":"tools/call","params":{"name":"no_such_tool","arguments":{}}}"#,
            ))
            .await
            .expect("request execution");

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32603);
        assert!(body["error"]["message"]
            .as_str()
            .expect("message")
            .contains("no_such_tool"));
    }

    #[tokio::test]
    async fn empty_registry_lists_no_tools() {
        let state = AppState::new(
            ToolRegistry::new(),
            Arc::new(SceneResources::new(Scene::shared())),
            Arc::new(NotificationHub::new()),
            DispatchSettings::default(),
        );
        let response = harness_with(state)
            .app
            .oneshot(post_json("/message", r#"{"method":"tools/list"}"#))
            .await
            .expect("request execution");

        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(
            body,
            r#"{"jsonrpc":"2.0","id":null,"result":{"tools":[]}}"#
        );
    }

    #[tokio::test]
    async fn scene_tool_round_trip() {
        let harness = harness();
        let response = harness
            .app
            .clone()
            .oneshot(post_json(
                "/message",
                r#"{"id":5,"method":"tools/call","params":{"name":"create_object","arguments":{"name":"Cube","kind":"cube"}}}"#,
            ))
            .await
            .expect("request execution");

        let body = body_json(response).await;
        assert_eq!(body["id"], 5);
        let text = body["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        let created: Value = serde_json::from_str(text).expect("tool result json");
        assert_eq!(created["name"], "Cube");

        let stats = harness
            .app
            .clone()
            .oneshot(post_json(
                "/message",
                r#"{"id":6,"method":"resources/read","params":{"uri":"scene://stats"}}"#,
            ))
            .await
            .expect("request execution");
        let stats = body_json(stats).await;
        let text = stats["result"]["contents"][0]["text"]
            .as_str()
            .expect("resource text");
        let stats: Value = serde_json::from_str(text).expect("stats json");
        assert_eq!(stats["objects"], 1);
    }

    #[tokio::test]
    async fn concurrent_requests_keep_their_ids() {
        let harness = harness();
        let first = harness
            .app
            .clone()
            .oneshot(post_json("/message", r#"{"id":"first","method":"tools/list"}"#));
        let second = harness
            .app
            .clone()
            .oneshot(post_json("/message", r#"{"id":"second","method":"ping"}"#));

        let (first, second) = tokio::join!(first, second);
        let first = body_json(first.expect("first")).await;
        let second = body_json(second.expect("second")).await;

        assert_eq!(first["id"], "first");
        assert!(first["result"]["tools"].is_array());
        assert_eq!(second["id"], "second");
        assert_eq!(second["result"]["pong"], true);
    }

    #[tokio::test]
    async fn dispatch_timeout_returns_internal_error() {
        let state = AppState::for_scene(
            Scene::shared(),
            DispatchSettings {
                timeout: Duration::from_millis(50),
                policy: TimeoutPolicy::Abandon,
            },
        );
        // No host loop: nothing drains the queue.
        let response = build_app(state.clone())
            .oneshot(post_json("/message", r#"{"id":77,"method":"ping"}"#))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], 77);
        assert_eq!(body["error"]["code"], -32603);

        assert_eq!(state.dispatcher.drain(), 1);
    }

    #[tokio::test]
    async fn closed_queue_is_transport_error() {
        let harness = harness();
        harness.state.dispatcher.close();

        let response = harness
            .app
            .oneshot(post_json("/message", r#"{"method":"ping"}"#))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn preflight_gets_allow_list() {
        let response = harness()
            .app
            .oneshot(
                Request::builder()
                    .uri("/message")
                    .method("OPTIONS")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .expect("methods header");
        assert!(methods.contains("POST") && methods.contains("GET") && methods.contains("OPTIONS"));

        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn responses_carry_allow_origin() {
        let mut request = post_json("/message", r#"{"method":"ping"}"#);
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://localhost:3000".parse().expect("origin"));

        let response = harness()
            .app
            .oneshot(request)
            .await
            .expect("request execution");

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn sse_client_receives_broadcast_frames() {
        let harness = harness();
        let response = harness
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/sse")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(harness.state.notifications.client_count(), 1);

        let mut body = response.into_body();
        let connected = body
            .frame()
            .await
            .expect("connected frame")
            .expect("frame")
            .into_data()
            .expect("data frame");
        assert_eq!(connected, ": connected\n\n");

        assert_eq!(harness.state.notifications.send_notification(r#"{"x":1}"#), 1);
        let frame = body
            .frame()
            .await
            .expect("broadcast frame")
            .expect("frame")
            .into_data()
            .expect("data frame");
        assert_eq!(frame, "data: {\"x\":1}\n\n");

        drop(body);
        assert_eq!(harness.state.notifications.client_count(), 0);
    }
}
