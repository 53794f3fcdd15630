use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use mentor_config::ChatRetry;
use mentor_domain::{
	ValidationError,
	classify::{self, ResponseType},
	confidence,
	conversation::ConversationSummary,
	prompt::{self, PromptMessage},
};
use mentor_providers::chat::{ChatCompletion, ChatCompletionRequest, TokenUsage};

use crate::{Error, MentorService, Result, monitoring};

pub const MAX_MESSAGE_CHARS: usize = 4_000;
pub const MAX_REQUEST_TOKENS: u32 = 4_000;
pub const MAX_TEMPERATURE: f32 = 2.0;

const HEALTH_CHECK_MAX_TOKENS: u32 = 5;
const HEALTH_CHECK_TEMPERATURE: f32 = 0.1;
pub(crate) const STREAM_BUFFER: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
	pub message: String,
	#[serde(default)]
	pub conversation_id: Option<String>,
	pub user_id: String,
	#[serde(default)]
	pub stream: bool,
	/// Overrides `chat.default_temperature`.
	#[serde(default)]
	pub temperature: Option<f32>,
	/// Overrides `chat.max_tokens`.
	#[serde(default)]
	pub max_tokens: Option<u32>,
}
impl ChatRequest {
	pub fn new(message: impl Into<String>, user_id: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			conversation_id: None,
			user_id: user_id.into(),
			stream: false,
			temperature: None,
			max_tokens: None,
		}
	}

	/// Validates the request and returns it with the message trimmed.
	///
	/// A blank `conversation_id` is treated as absent.
	pub fn normalized(mut self) -> Result<Self, ValidationError> {
		let chars = self.message.chars().count();

		if chars > MAX_MESSAGE_CHARS {
			return Err(ValidationError::new(
				"message",
				format!("Must be at most {MAX_MESSAGE_CHARS} characters."),
			));
		}

		let trimmed = self.message.trim();

		if trimmed.is_empty() {
			return Err(ValidationError::new(
				"message",
				"Message cannot be empty or just whitespace.",
			));
		}

		self.message = trimmed.to_string();

		if self.user_id.trim().is_empty() {
			return Err(ValidationError::new("user_id", "Must be non-empty."));
		}
		if let Some(temperature) = self.temperature
			&& !(temperature.is_finite() && (0.0..=MAX_TEMPERATURE).contains(&temperature))
		{
			return Err(ValidationError::new("temperature", "Must be in the range 0.0-2.0."));
		}
		if let Some(max_tokens) = self.max_tokens
			&& !(1..=MAX_REQUEST_TOKENS).contains(&max_tokens)
		{
			return Err(ValidationError::new(
				"max_tokens",
				format!("Must be in the range 1-{MAX_REQUEST_TOKENS}."),
			));
		}

		self.conversation_id = self.conversation_id.filter(|id| !id.trim().is_empty());

		Ok(self)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
	pub id: String,
	pub message: String,
	pub conversation_id: String,
	pub ai_model: String,
	pub processing_time_ms: u64,
	pub token_usage: Option<TokenUsage>,
	pub confidence_score: Option<f32>,
	pub response_type: ResponseType,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingChatChunk {
	/// `chunk_001`, `chunk_002`, ..., then `chunk_final`, or `chunk_error` on failure.
	pub id: String,
	pub conversation_id: String,
	pub content: String,
	pub is_final: bool,
}

/// Delay before retry `attempt` (1-based): doubling from one second, clamped to the window.
pub fn backoff_delay(retry: &ChatRetry, attempt: u32) -> Duration {
	let exponent = attempt.saturating_sub(1).min(20);
	let raw_ms = 1_000_u64.saturating_mul(1_u64 << exponent);
	let clamped = raw_ms.max(retry.min_backoff_ms).min(retry.max_backoff_ms);

	Duration::from_millis(clamped)
}

impl MentorService {
	/// Plain career-mentor completion over the conversation history.
	pub async fn generate_response(&self, request: ChatRequest) -> Result<ChatResponse> {
		let started = Instant::now();
		let request = request.normalized()?;
		let conversation_id = crate::conversation_id_for(&request);
		let history = self.conversations.history(&conversation_id);
		let messages = prompt::build_chat_messages(
			prompt::CAREER_MENTOR_PROMPT,
			&history,
			&request.message,
			self.cfg.chat.context_messages as usize,
		);
		let completion_request = self.completion_request(&messages, &request, true)?;

		tracing::info!(
			conversation_id = %conversation_id,
			user_id_hash = %monitoring::user_hash(&request.user_id),
			message_length = request.message.chars().count(),
			context_messages = messages.len(),
			"Generating chat response."
		);

		let completion = match self.complete_with_retry(&completion_request).await {
			Ok(completion) => completion,
			Err(err) => {
				tracing::error!(
					error = %err,
					conversation_id = %conversation_id,
					processing_time_ms = crate::elapsed_ms(started),
					"Failed to generate chat response."
				);

				return Err(err);
			},
		};
		let Some(message) = completion.content.filter(|content| !content.is_empty()) else {
			return Err(Error::Provider {
				message: "Chat completion returned empty content.".to_string(),
			});
		};

		self.conversations.record_turn(
			&conversation_id,
			&request.message,
			&message,
			self.cfg.chat.max_conversation_history as usize,
		);

		if let Some(usage) = &completion.usage {
			self.monitoring.record_token_usage(usage);
		}

		let response_type = classify::classify_response(&message);
		let processing_time_ms = crate::elapsed_ms(started);

		tracing::info!(
			conversation_id = %conversation_id,
			processing_time_ms,
			response_length = message.chars().count(),
			response_type = response_type.as_str(),
			"Chat response generated."
		);

		Ok(ChatResponse {
			id: Uuid::new_v4().to_string(),
			message,
			conversation_id,
			ai_model: self.cfg.providers.llm.model.clone(),
			processing_time_ms,
			token_usage: completion.usage,
			confidence_score: Some(confidence::completion_confidence(
				completion.finish_reason.as_deref(),
			)),
			response_type,
			metadata: Map::new(),
		})
	}

	/// Streams the answer as chunks; failures surface as a final `chunk_error` chunk.
	pub fn generate_streaming_response(
		&self,
		request: ChatRequest,
	) -> Result<BoxStream<'static, StreamingChatChunk>> {
		let request = request.normalized()?;
		let conversation_id = crate::conversation_id_for(&request);
		let (tx, rx) = mpsc::channel(STREAM_BUFFER);
		let service = self.clone();

		tokio::spawn(async move { service.run_chat_stream(request, conversation_id, tx).await });

		Ok(crate::receiver_stream(rx))
	}

	/// Chat entry point that optionally routes through retrieval and serves cached answers.
	///
	/// The cache only applies to new conversations without temperature or token overrides.
	pub async fn chat(&self, request: ChatRequest, use_rag: bool) -> Result<ChatResponse> {
		let request = request.normalized()?;
		let cacheable = self.cfg.cache.enabled
			&& request.conversation_id.is_none()
			&& request.temperature.is_none()
			&& request.max_tokens.is_none();
		let conversation_id = crate::conversation_id_for(&request);

		if cacheable && let Some(mut cached) = self.cache.get(&request.message, use_rag) {
			cached.id = Uuid::new_v4().to_string();
			cached.conversation_id = conversation_id.clone();
			cached.metadata.insert("cached".to_string(), Value::Bool(true));

			self.conversations.record_turn(
				&conversation_id,
				&request.message,
				&cached.message,
				self.cfg.chat.max_conversation_history as usize,
			);

			tracing::info!(
				conversation_id = %conversation_id,
				use_rag,
				"Served chat response from cache."
			);

			return Ok(cached);
		}

		let message = request.message.clone();
		let request = ChatRequest { conversation_id: Some(conversation_id), ..request };
		let response = if use_rag {
			self.generate_rag_response(request).await?.into_chat_response()
		} else {
			self.generate_response(request).await?
		};

		if cacheable {
			self.cache.insert(&message, use_rag, response.clone());
		}

		Ok(response)
	}

	/// Sends a tiny completion; true when the model answered with any content.
	pub async fn health_check(&self) -> bool {
		let request = ChatCompletionRequest {
			messages: vec![serde_json::json!({ "role": "user", "content": "Hello" })],
			temperature: HEALTH_CHECK_TEMPERATURE,
			max_tokens: HEALTH_CHECK_MAX_TOKENS,
			top_p: None,
			frequency_penalty: None,
			presence_penalty: None,
		};

		match self.providers.chat.complete(&self.cfg.providers.llm, &request).await {
			Ok(completion) => completion.content.is_some_and(|content| !content.is_empty()),
			Err(err) => {
				tracing::warn!(error = %err, "Chat provider health check failed.");

				false
			},
		}
	}

	pub fn clear_conversation(&self, conversation_id: &str) -> bool {
		let cleared = self.conversations.clear(conversation_id);

		if cleared {
			tracing::info!(conversation_id, "Conversation cleared.");
		}

		cleared
	}

	pub fn conversation_summary(&self, conversation_id: &str) -> Option<ConversationSummary> {
		self.conversations.summary(conversation_id)
	}

	pub fn active_conversations(&self) -> usize {
		self.conversations.active_count()
	}

	pub(crate) fn completion_request(
		&self,
		messages: &[PromptMessage],
		request: &ChatRequest,
		tuned: bool,
	) -> Result<ChatCompletionRequest> {
		let chat = &self.cfg.chat;
		let messages = messages
			.iter()
			.map(serde_json::to_value)
			.collect::<serde_json::Result<Vec<_>>>()?;

		Ok(ChatCompletionRequest {
			messages,
			temperature: request.temperature.unwrap_or(chat.default_temperature),
			max_tokens: request.max_tokens.unwrap_or(chat.max_tokens),
			top_p: tuned.then_some(chat.top_p),
			frequency_penalty: tuned.then_some(chat.frequency_penalty),
			presence_penalty: tuned.then_some(chat.presence_penalty),
		})
	}

	/// Runs a completion under the request limiter, retrying transient provider failures.
	pub(crate) async fn complete_with_retry(
		&self,
		request: &ChatCompletionRequest,
	) -> Result<ChatCompletion> {
		let retry = &self.cfg.chat.retry;
		let mut attempt = 1;

		loop {
			let outcome = {
				let _permit = self.limiter.acquire().await?;

				self.providers.chat.complete(&self.cfg.providers.llm, request).await
			};

			match outcome {
				Ok(completion) => return Ok(completion),
				Err(err) if err.is_transient() && attempt < retry.max_attempts => {
					let delay = backoff_delay(retry, attempt);

					tracing::warn!(
						error = %err,
						attempt,
						delay_ms = delay.as_millis() as u64,
						"Chat completion failed; retrying."
					);

					tokio::time::sleep(delay).await;

					attempt += 1;
				},
				Err(err) => return Err(err.into()),
			}
		}
	}

	/// Streams a completion under the request limiter, mapping each delta into `out`.
	///
	/// Returns the concatenated text, or `None` when `out` closed before the upstream finished.
	pub(crate) async fn stream_completion<T, F>(
		&self,
		request: &ChatCompletionRequest,
		out: &mpsc::Sender<T>,
		mut to_item: F,
	) -> Result<Option<String>>
	where
		T: Send,
		F: FnMut(String) -> T + Send,
	{
		let _permit = self.limiter.acquire().await?;
		let (tx, mut rx) = mpsc::channel::<String>(STREAM_BUFFER);
		let upstream = self.providers.chat.stream(&self.cfg.providers.llm, request, tx);
		let forward = async move {
			let mut full = String::new();

			while let Some(delta) = rx.recv().await {
				full.push_str(&delta);

				if out.send(to_item(delta)).await.is_err() {
					return None;
				}
			}

			Some(full)
		};
		let (outcome, full) = tokio::join!(upstream, forward);

		outcome?;

		Ok(full)
	}

	async fn run_chat_stream(
		self,
		request: ChatRequest,
		conversation_id: String,
		tx: mpsc::Sender<StreamingChatChunk>,
	) {
		let history = self.conversations.history(&conversation_id);
		let messages = prompt::build_chat_messages(
			prompt::CAREER_MENTOR_PROMPT,
			&history,
			&request.message,
			self.cfg.chat.context_messages as usize,
		);

		tracing::info!(
			conversation_id = %conversation_id,
			user_id_hash = %monitoring::user_hash(&request.user_id),
			"Starting streaming chat response."
		);

		let mut chunk_count = 0_u32;
		let outcome = match self.completion_request(&messages, &request, true) {
			Ok(completion_request) => {
				let chunk_conversation = conversation_id.clone();

				self.stream_completion(&completion_request, &tx, |content| {
					chunk_count += 1;

					StreamingChatChunk {
						id: format!("chunk_{chunk_count:03}"),
						conversation_id: chunk_conversation.clone(),
						content,
						is_final: false,
					}
				})
				.await
			},
			Err(err) => Err(err),
		};
		let last = match outcome {
			Ok(None) => {
				tracing::info!(
					conversation_id = %conversation_id,
					chunks_sent = chunk_count,
					"Streaming chat client disconnected; turn not recorded."
				);

				return;
			},
			Ok(Some(full_response)) => {
				self.conversations.record_turn(
					&conversation_id,
					&request.message,
					&full_response,
					self.cfg.chat.max_conversation_history as usize,
				);

				tracing::info!(
					conversation_id = %conversation_id,
					chunks_sent = chunk_count,
					total_length = full_response.chars().count(),
					"Streaming chat response completed."
				);

				StreamingChatChunk {
					id: "chunk_final".to_string(),
					conversation_id,
					content: String::new(),
					is_final: true,
				}
			},
			Err(err) => {
				tracing::error!(
					error = %err,
					conversation_id = %conversation_id,
					"Streaming chat response failed."
				);

				StreamingChatChunk {
					id: "chunk_error".to_string(),
					conversation_id,
					content: format!("Error: {err}"),
					is_final: true,
				}
			},
		};

		// The client may already be gone.
		let _ = tx.send(last).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn retry() -> ChatRetry {
		ChatRetry { max_attempts: 3, min_backoff_ms: 4_000, max_backoff_ms: 10_000 }
	}

	#[test]
	fn backoff_doubles_within_the_window() {
		assert_eq!(backoff_delay(&retry(), 1), Duration::from_secs(4));
		assert_eq!(backoff_delay(&retry(), 3), Duration::from_secs(4));
		assert_eq!(backoff_delay(&retry(), 4), Duration::from_secs(8));
		assert_eq!(backoff_delay(&retry(), 5), Duration::from_secs(10));
		assert_eq!(backoff_delay(&retry(), 60), Duration::from_secs(10));
	}

	#[test]
	fn normalization_trims_and_drops_blank_conversation() {
		let mut request = ChatRequest::new("  How do I start?  ", "user-1");

		request.conversation_id = Some("   ".to_string());

		let normalized = request.normalized().expect("Expected a valid request.");

		assert_eq!(normalized.message, "How do I start?");
		assert_eq!(normalized.conversation_id, None);
	}

	#[test]
	fn normalization_rejects_out_of_range_fields() {
		let blank = ChatRequest::new("   ", "user-1").normalized().expect_err("Blank message.");

		assert_eq!(blank.field, "message");

		let long = ChatRequest::new("a".repeat(MAX_MESSAGE_CHARS + 1), "user-1")
			.normalized()
			.expect_err("Long message.");

		assert_eq!(long.field, "message");

		let anonymous = ChatRequest::new("hi", " ").normalized().expect_err("Blank user.");

		assert_eq!(anonymous.field, "user_id");

		let mut hot = ChatRequest::new("hi", "user-1");

		hot.temperature = Some(2.5);

		assert_eq!(hot.normalized().expect_err("Hot temperature.").field, "temperature");

		let mut greedy = ChatRequest::new("hi", "user-1");

		greedy.max_tokens = Some(0);

		assert_eq!(greedy.normalized().expect_err("Zero tokens.").field, "max_tokens");
	}

	#[test]
	fn zero_temperature_is_accepted() {
		let mut request = ChatRequest::new("hi", "user-1");

		request.temperature = Some(0.0);

		assert_eq!(request.normalized().expect("Expected valid.").temperature, Some(0.0));
	}
}
