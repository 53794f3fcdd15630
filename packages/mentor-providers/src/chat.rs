use std::time::Duration;

use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use mentor_config::LlmProviderConfig;

use crate::{Error, Result};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
	/// `{ "role", "content" }` objects in prompt order.
	pub messages: Vec<Value>,
	pub temperature: f32,
	pub max_tokens: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
	pub prompt_tokens: u64,
	pub completion_tokens: u64,
	pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
	pub content: Option<String>,
	pub finish_reason: Option<String>,
	pub model: Option<String>,
	pub usage: Option<TokenUsage>,
}

pub async fn complete(
	cfg: &LlmProviderConfig,
	request: &ChatCompletionRequest,
) -> Result<ChatCompletion> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let url = crate::endpoint_url(&cfg.api_base, &cfg.path, cfg.api_version.as_deref());
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.auth_scheme, &cfg.api_key, &cfg.default_headers)?)
		.json(&request_body(cfg, request, false)?)
		.send()
		.await?;
	let json = crate::read_json(res).await?;

	parse_completion(json)
}

/// Streams content deltas into `tx` until the upstream signals completion.
///
/// Returns early without error when the receiver is dropped. `timeout_ms` bounds the connect and
/// the wait for each event, not the whole stream.
pub async fn stream(
	cfg: &LlmProviderConfig,
	request: &ChatCompletionRequest,
	tx: mpsc::Sender<String>,
) -> Result<()> {
	let timeout = Duration::from_millis(cfg.timeout_ms);
	let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
	let url = crate::endpoint_url(&cfg.api_base, &cfg.path, cfg.api_version.as_deref());
	let builder = client
		.post(url)
		.headers(crate::auth_headers(&cfg.auth_scheme, &cfg.api_key, &cfg.default_headers)?)
		.json(&request_body(cfg, request, true)?);
	let mut es = builder
		.eventsource()
		.map_err(|err| Error::EventSource { message: err.to_string() })?;

	loop {
		let Ok(next) = tokio::time::timeout(timeout, es.next()).await else {
			es.close();

			return Err(Error::EventSource {
				message: format!("No stream event within {} ms.", cfg.timeout_ms),
			});
		};
		let Some(event) = next else {
			break;
		};

		match event {
			Ok(Event::Open) => {
				tracing::debug!("Chat stream opened.");
			},
			Ok(Event::Message(msg)) => {
				if msg.data.trim() == DONE_SENTINEL {
					es.close();

					return Ok(());
				}

				let Some(delta) = parse_stream_delta(&msg.data) else {
					continue;
				};

				if tx.send(delta).await.is_err() {
					es.close();

					return Ok(());
				}
			},
			Err(reqwest_eventsource::Error::StreamEnded) => {
				es.close();

				return Ok(());
			},
			Err(reqwest_eventsource::Error::InvalidStatusCode(status, res)) => {
				es.close();

				let body = res.text().await.unwrap_or_default();

				return Err(Error::Status { status, body });
			},
			Err(err) => {
				es.close();

				return Err(Error::EventSource { message: err.to_string() });
			},
		}
	}

	Ok(())
}

pub(crate) fn request_body(
	cfg: &LlmProviderConfig,
	request: &ChatCompletionRequest,
	stream: bool,
) -> Result<Value> {
	let mut body = serde_json::to_value(request)?;

	if let Some(map) = body.as_object_mut() {
		map.insert("model".to_string(), Value::String(cfg.model.clone()));

		if stream {
			map.insert("stream".to_string(), Value::Bool(true));
		}
	}

	Ok(body)
}

fn parse_completion(json: Value) -> Result<ChatCompletion> {
	let choice = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Chat completion response has no choices.".to_string(),
		})?;
	let content = choice
		.get("message")
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(str::to_string);
	let finish_reason = choice.get("finish_reason").and_then(|v| v.as_str()).map(str::to_string);
	let model = json.get("model").and_then(|v| v.as_str()).map(str::to_string);
	let usage = match json.get("usage") {
		Some(raw) if !raw.is_null() => Some(serde_json::from_value(raw.clone())?),
		_ => None,
	};

	Ok(ChatCompletion { content, finish_reason, model, usage })
}

/// Extracts `choices[0].delta.content`; empty and non-content deltas yield `None`.
fn parse_stream_delta(data: &str) -> Option<String> {
	let json: Value = serde_json::from_str(data).ok()?;
	let content = json.get("choices")?.as_array()?.first()?.get("delta")?.get("content")?.as_str()?;

	if content.is_empty() { None } else { Some(content.to_string()) }
}
