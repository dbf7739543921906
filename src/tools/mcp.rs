use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::resilience::ResiliencePipeline;
use super::{HttpEndpoint, http};

// Fresh id per outbound request, process-wide.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Calls an MCP server over plain HTTP. The body is always a JSON-RPC 2.0
/// envelope; the method comes from the arguments, the tool name, or falls
/// back to `resources/list`.
pub(super) async fn execute(
    client: &Client,
    pipeline: &ResiliencePipeline,
    endpoint: &HttpEndpoint,
    tool_name: &str,
    args: &Map<String, Value>,
) -> Result<Value> {
    let envelope = JsonRpcRequest {
        jsonrpc: "2.0",
        id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
        method: infer_method(tool_name, args),
        params: build_params(args),
    };
    let (url, _) = http::render_template(&endpoint.url, args)?;
    tracing::debug!("MCP request {} -> {url}", envelope.method);

    let request = client
        .post(url)
        .headers(endpoint.headers.clone())
        .json(&envelope)
        .build()?;

    let response: JsonRpcResponse = pipeline
        .run(|| {
            let request = request.try_clone();
            async move {
                let request = request.ok_or_else(|| {
                    Error::ToolExecution("Request cannot be cloned for retry".to_string())
                })?;
                let response = client.execute(request).await?.error_for_status()?;
                Ok(response.json::<JsonRpcResponse>().await?)
            }
        })
        .await?;

    if let Some(error) = response.error {
        tracing::warn!("MCP call failed with code {}: {}", error.code, error.message);
        return Err(Error::ToolExecution(error.message));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// An explicit `method` argument wins; otherwise well-known tool names map to
/// their fixed JSON-RPC methods.
fn infer_method(tool_name: &str, args: &Map<String, Value>) -> String {
    if let Some(method) = args.get("method").and_then(Value::as_str) {
        return method.to_string();
    }
    match tool_name {
        "mcp_read_resource" => "resources/read",
        "mcp_list_tools" => "tools/list",
        "mcp_call_tool" => "tools/call",
        _ => "resources/list",
    }
    .to_string()
}

// An explicit `params` argument is passed through untouched; otherwise the
// remaining arguments become the params object.
fn build_params(args: &Map<String, Value>) -> Value {
    if let Some(params) = args.get("params") {
        return params.clone();
    }
    let folded: Map<String, Value> = args
        .iter()
        .filter(|(key, _)| key.as_str() != "method" && key.as_str() != "params")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(folded)
}
