use std::collections::BTreeSet;

use reqwest::Client;
use serde_json::{Map, Value, json};
use url::Url;

use crate::error::{Error, Result};

use super::resilience::ResiliencePipeline;
use super::{HttpEndpoint, HttpMethod};

/// Calls a config-defined HTTP endpoint. `{key}` placeholders in the URL
/// template are filled from the arguments; for GET and DELETE the leftover
/// arguments become query parameters, for POST and PUT the full argument
/// object is sent as the JSON body.
pub(super) async fn execute(
    client: &Client,
    pipeline: &ResiliencePipeline,
    endpoint: &HttpEndpoint,
    args: &Map<String, Value>,
) -> Result<Value> {
    let (rendered, consumed) = render_template(&endpoint.url, args)?;
    let mut url = Url::parse(&rendered)?;

    if matches!(endpoint.method, HttpMethod::Get | HttpMethod::Delete) {
        let leftover: Vec<(&String, &Value)> = args
            .iter()
            .filter(|(key, _)| !consumed.contains(*key))
            .collect();
        if !leftover.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in leftover {
                pairs.append_pair(key, &scalar_string(value));
            }
        }
    }

    let mut builder = client
        .request(endpoint.method.as_reqwest(), url)
        .headers(endpoint.headers.clone());
    if matches!(endpoint.method, HttpMethod::Post | HttpMethod::Put) {
        builder = builder.json(args);
    }
    let request = builder.build()?;

    let body = pipeline
        .run(|| {
            let request = request.try_clone();
            async move {
                let request = request.ok_or_else(|| {
                    Error::ToolExecution("Request cannot be cloned for retry".to_string())
                })?;
                let response = client.execute(request).await?.error_for_status()?;
                Ok(response.text().await?)
            }
        })
        .await?;

    Ok(parse_body(&body))
}

/// Fills `{key}` placeholders and reports which argument keys were consumed.
/// A placeholder with no matching argument is an error before any network
/// traffic happens.
pub(super) fn render_template(
    template: &str,
    args: &Map<String, Value>,
) -> Result<(String, BTreeSet<String>)> {
    let mut rendered = template.to_string();
    let mut consumed = BTreeSet::new();
    for (key, value) in args {
        let placeholder = format!("{{{key}}}");
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &scalar_string(value));
            consumed.insert(key.clone());
        }
    }
    if let Some(missing) = leftover_placeholder(&rendered) {
        return Err(Error::InvalidArgument(format!(
            "Missing required parameter: {missing}"
        )));
    }
    Ok((rendered, consumed))
}

fn leftover_placeholder(rendered: &str) -> Option<&str> {
    let start = rendered.find('{')?;
    let rest = &rendered[start + 1..];
    let end = rest.find('}')?;
    Some(&rest[..end])
}

// Strings go in bare; everything else keeps its JSON rendering.
fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "response": body }))
}
