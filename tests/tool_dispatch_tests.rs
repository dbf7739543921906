use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxgate::config::{
    CircuitBreakerConfig, ResilienceConfig, RetryConfig, TimeoutConfig, ToolConfig, ToolKind,
};
use voxgate::error::Error;
use voxgate::tools::ToolDispatcher;

fn http_tool(name: &str, http_method: &str, url: String) -> ToolConfig {
    ToolConfig {
        name: name.to_string(),
        kind: ToolKind::Http,
        method: Some(http_method.to_string()),
        url: Some(url),
        ..ToolConfig::default()
    }
}

fn mcp_tool(name: &str, url: String) -> ToolConfig {
    ToolConfig {
        name: name.to_string(),
        kind: ToolKind::Mcp,
        url: Some(url),
        ..ToolConfig::default()
    }
}

// Millisecond backoff and no breaker, so the retry tests stay fast.
fn retry_only() -> ResilienceConfig {
    ResilienceConfig {
        timeout: TimeoutConfig {
            enabled: false,
            ..TimeoutConfig::default()
        },
        retry: RetryConfig {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        },
        circuit_breaker: CircuitBreakerConfig {
            enabled: false,
            ..CircuitBreakerConfig::default()
        },
    }
}

fn bare() -> ResilienceConfig {
    ResilienceConfig {
        timeout: TimeoutConfig {
            enabled: false,
            ..TimeoutConfig::default()
        },
        retry: RetryConfig {
            enabled: false,
            ..RetryConfig::default()
        },
        circuit_breaker: CircuitBreakerConfig {
            enabled: false,
            ..CircuitBreakerConfig::default()
        },
    }
}

fn dispatcher(tools: &[ToolConfig], resilience: &ResilienceConfig) -> ToolDispatcher {
    ToolDispatcher::from_config(tools, resilience, true).expect("Failed to build dispatcher")
}

#[tokio::test]
async fn test_get_substitutes_template_and_appends_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/Paris"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp": 21})))
        .mount(&server)
        .await;

    let tools = [http_tool(
        "weather",
        "GET",
        format!("{}/weather/{{city}}", server.uri()),
    )];
    let dispatcher = dispatcher(&tools, &bare());

    let result = dispatcher
        .execute("weather", r#"{"city":"Paris","units":"metric"}"#)
        .await
        .expect("GET call failed");
    assert_eq!(result, json!({"temp": 21}));

    // The templated key must not reappear as a query parameter.
    let requests = server.received_requests().await.expect("No requests recorded");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.query(), Some("units=metric"));
}

#[tokio::test]
async fn test_post_sends_arguments_as_json_body_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("x-api-key", "secret"))
        .and(body_partial_json(json!({"query": "rust", "limit": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": 2})))
        .mount(&server)
        .await;

    let mut tool = http_tool("search", "POST", format!("{}/search", server.uri()));
    tool.headers
        .insert("x-api-key".to_string(), "secret".to_string());
    let dispatcher = dispatcher(&[tool], &bare());

    let result = dispatcher
        .execute("search", r#"{"query":"rust","limit":5}"#)
        .await
        .expect("POST call failed");
    assert_eq!(result, json!({"hits": 2}));
}

#[tokio::test]
async fn test_non_json_body_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let tools = [http_tool("ping", "GET", format!("{}/ping", server.uri()))];
    let dispatcher = dispatcher(&tools, &bare());

    let result = dispatcher.execute("ping", "{}").await.expect("GET failed");
    assert_eq!(result, json!({"response": "pong"}));
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let tools = [http_tool("flaky", "GET", format!("{}/flaky", server.uri()))];
    let dispatcher = dispatcher(&tools, &retry_only());

    let result = dispatcher.execute("flaky", "{}").await.expect("retries failed");
    assert_eq!(result, json!({"ok": true}));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tools = [http_tool("missing", "GET", format!("{}/missing", server.uri()))];
    let dispatcher = dispatcher(&tools, &retry_only());

    let err = dispatcher.execute("missing", "{}").await.unwrap_err();
    match err {
        Error::Http(inner) => {
            assert_eq!(inner.status().map(|status| status.as_u16()), Some(404));
        }
        other => panic!("Wrong error: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut resilience = bare();
    resilience.timeout = TimeoutConfig {
        enabled: true,
        duration_ms: 50,
    };
    let tools = [http_tool("slow", "GET", format!("{}/slow", server.uri()))];
    let dispatcher = dispatcher(&tools, &resilience);

    let err = dispatcher.execute("slow", "{}").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test]
async fn test_circuit_breaker_opens_and_fast_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut resilience = bare();
    resilience.circuit_breaker = CircuitBreakerConfig {
        enabled: true,
        failure_ratio: 0.5,
        minimum_throughput: 4,
        sampling_duration_ms: 30_000,
        break_duration_ms: 60_000,
    };
    let tools = [http_tool("down", "GET", format!("{}/down", server.uri()))];
    let dispatcher = dispatcher(&tools, &resilience);

    for _ in 0..4 {
        let err = dispatcher.execute("down", "{}").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    let err = dispatcher.execute("down", "{}").await.unwrap_err();
    assert!(matches!(err, Error::CircuitOpen(_)));
    // The open breaker rejected the call before it reached the network.
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_unknown_tool_never_contacts_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let tools = [http_tool("known", "GET", format!("{}/known", server.uri()))];
    let dispatcher = dispatcher(&tools, &bare());

    let err = dispatcher.execute("unknown_tool", "{}").await.unwrap_err();
    assert!(matches!(err, Error::UnknownTool(name) if name == "unknown_tool"));
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_mcp_list_tools_sends_jsonrpc_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "jsonrpc": "2.0",
            "method": "tools/list",
            "params": {}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": []}
        })))
        .mount(&server)
        .await;

    let tools = [mcp_tool("mcp_list_tools", format!("{}/rpc", server.uri()))];
    let dispatcher = dispatcher(&tools, &bare());

    let result = dispatcher
        .execute("mcp_list_tools", "{}")
        .await
        .expect("MCP call failed");
    assert_eq!(result, json!({"tools": []}));
}

#[tokio::test]
async fn test_mcp_folds_remaining_args_into_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": {"name": "search", "arguments": {"q": "rust"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"content": "found"}
        })))
        .mount(&server)
        .await;

    let tools = [mcp_tool("backend", format!("{}/rpc", server.uri()))];
    let dispatcher = dispatcher(&tools, &bare());

    let args = r#"{"method":"tools/call","name":"search","arguments":{"q":"rust"}}"#;
    let result = dispatcher.execute("backend", args).await.expect("MCP call failed");
    assert_eq!(result, json!({"content": "found"}));
}

#[tokio::test]
async fn test_mcp_error_member_fails_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32601, "message": "Method not found"}
        })))
        .mount(&server)
        .await;

    let tools = [mcp_tool("backend", format!("{}/rpc", server.uri()))];
    let dispatcher = dispatcher(&tools, &bare());

    let err = dispatcher.execute("backend", "{}").await.unwrap_err();
    match err {
        Error::ToolExecution(message) => assert_eq!(message, "Method not found"),
        other => panic!("Wrong error: {other:?}"),
    }
}
