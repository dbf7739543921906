use std::collections::BTreeMap;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};

use crate::config::{ResilienceConfig, ToolConfig, ToolKind};
use crate::error::{Error, Result};
use crate::protocol::models::{JsonSchema, Tool};

pub mod builtin;
mod http;
mod mcp;
pub mod resilience;

pub use resilience::ResiliencePipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::Configuration(format!(
                "Unsupported HTTP method: {raw}"
            ))),
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Where a remote tool lives: method, URL template, and headers validated at
/// load time so a bad config entry never surfaces mid-call.
struct HttpEndpoint {
    method: HttpMethod,
    url: String,
    headers: HeaderMap,
}

enum ToolBackend {
    Http(HttpEndpoint),
    Mcp(HttpEndpoint),
    Builtin,
}

struct ToolSpec {
    // Original casing, used when advertising the tool upstream.
    name: String,
    description: Option<String>,
    parameters: JsonSchema,
    backend: ToolBackend,
}

impl ToolSpec {
    fn from_config(config: &ToolConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(Error::Configuration(
                "Tool name must not be empty".to_string(),
            ));
        }
        let backend = match config.kind {
            ToolKind::Builtin => {
                if !builtin::is_builtin(&config.name) {
                    return Err(Error::Configuration(format!(
                        "Unknown builtin tool: {}",
                        config.name
                    )));
                }
                ToolBackend::Builtin
            }
            ToolKind::Http => ToolBackend::Http(endpoint_from(config)?),
            ToolKind::Mcp => ToolBackend::Mcp(endpoint_from(config)?),
        };
        let description = config
            .description
            .clone()
            .or_else(|| builtin::default_description(&config.name).map(str::to_string));
        let parameters = schema_from(config)?
            .or_else(|| builtin::default_parameters(&config.name))
            .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));
        Ok(Self {
            name: config.name.clone(),
            description,
            parameters,
            backend,
        })
    }
}

/// A parameter schema may be written inline or as a JSON-encoded string.
fn schema_from(config: &ToolConfig) -> Result<Option<JsonSchema>> {
    let Some(raw) = &config.parameters else {
        return Ok(None);
    };
    let schema = match raw {
        Value::String(text) => serde_json::from_str(text).map_err(|err| {
            Error::Configuration(format!(
                "Tool {} has an unparseable parameter schema: {err}",
                config.name
            ))
        })?,
        other => other.clone(),
    };
    if !schema.is_object() {
        return Err(Error::Configuration(format!(
            "Tool {} parameter schema must be a JSON object",
            config.name
        )));
    }
    Ok(Some(schema))
}

fn endpoint_from(config: &ToolConfig) -> Result<HttpEndpoint> {
    let url = config
        .url
        .clone()
        .ok_or_else(|| Error::Configuration(format!("Tool {} needs a url", config.name)))?;
    let method = match &config.method {
        Some(raw) => HttpMethod::parse(raw)?,
        None => HttpMethod::Get,
    };
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| Error::Configuration(format!("Invalid header name {name}: {err}")))?;
        let value = HeaderValue::from_str(value).map_err(|err| {
            Error::Configuration(format!("Invalid value for header {name}: {err}"))
        })?;
        headers.insert(header, value);
    }
    Ok(HttpEndpoint {
        method,
        url,
        headers,
    })
}

/// Registry of callable tools plus the shared HTTP client and resilience
/// pipeline. Built once at startup and shared by every session, which makes
/// the circuit breaker state process-wide.
pub struct ToolDispatcher {
    client: Client,
    pipeline: ResiliencePipeline,
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolDispatcher {
    /// Builds the registry from config. In strict mode any invalid entry
    /// fails startup; otherwise bad entries are logged and skipped so one
    /// typo cannot take the whole relay down.
    ///
    /// # Errors
    /// Returns `Error::Configuration` for invalid or duplicate entries in
    /// strict mode, or `Error::Http` if the HTTP client cannot be built.
    pub fn from_config(
        tools: &[ToolConfig],
        resilience: &ResilienceConfig,
        strict: bool,
    ) -> Result<Self> {
        let client = Client::builder().build()?;
        let pipeline = ResiliencePipeline::from_config("tools", resilience);

        let mut registry: BTreeMap<String, ToolSpec> = BTreeMap::new();
        for config in tools {
            let spec = match ToolSpec::from_config(config) {
                Ok(spec) => spec,
                Err(err) => {
                    if strict {
                        return Err(err);
                    }
                    tracing::warn!("Skipping tool entry {:?}: {err}", config.name);
                    continue;
                }
            };
            // Names are matched case-insensitively end to end.
            let key = spec.name.to_lowercase();
            if registry.contains_key(&key) {
                let err = Error::Configuration(format!("Duplicate tool name: {}", spec.name));
                if strict {
                    return Err(err);
                }
                tracing::warn!("Skipping tool entry {:?}: {err}", spec.name);
                continue;
            }
            registry.insert(key, spec);
        }

        tracing::info!("Registered {} tool(s)", registry.len());
        Ok(Self {
            client,
            pipeline,
            tools: registry,
        })
    }

    /// Runs the named tool with the raw argument string supplied by the
    /// upstream model. Unknown names fail before the arguments are even
    /// parsed, and nothing here panics on model-supplied input.
    ///
    /// # Errors
    /// `Error::UnknownTool`, `Error::InvalidArgument`, or whatever the
    /// backend call produced (including `Error::Timeout` and
    /// `Error::CircuitOpen` from the resilience pipeline).
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<Value> {
        let spec = self
            .tools
            .get(&name.to_lowercase())
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        let args = parse_arguments(arguments)?;
        tracing::debug!("Dispatching tool {} with {} argument(s)", spec.name, args.len());

        match &spec.backend {
            ToolBackend::Builtin => builtin::execute(&spec.name, &Value::Object(args)),
            ToolBackend::Http(endpoint) => {
                http::execute(&self.client, &self.pipeline, endpoint, &args).await
            }
            ToolBackend::Mcp(endpoint) => {
                mcp::execute(&self.client, &self.pipeline, endpoint, &spec.name, &args).await
            }
        }
    }

    /// Tool definitions in the shape the upstream session expects.
    #[must_use]
    pub fn advertised(&self) -> Vec<Tool> {
        self.tools
            .values()
            .map(|spec| Tool::Function {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| Error::InvalidArgument(format!("Arguments are not valid JSON: {err}")))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::InvalidArgument(format!(
            "Arguments must be a JSON object, got: {other}"
        ))),
    }
}
