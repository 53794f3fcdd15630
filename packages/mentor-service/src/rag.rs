//! Retrieval-augmented answers: classify, retrieve, assemble the prompt, generate.

use std::time::Instant;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use mentor_domain::{
	classify::{self, ResponseType},
	confidence,
	conversation::{ChatMessage, Role},
	knowledge::{self, DocumentType, SearchQuery, SearchResult},
	prompt::{self, PromptMessage},
	time_serde,
};
use mentor_providers::chat::TokenUsage;

use crate::{
	ChatRequest, ChatResponse, Error, MentorService, Result,
	chat::STREAM_BUFFER,
	monitoring,
};

const KNOWLEDGE_SOURCES_IN_METADATA: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
	pub id: String,
	pub message: String,
	pub conversation_id: String,
	pub ai_model: String,
	pub retrieved_sources: Vec<SearchResult>,
	/// The user message, set only when retrieval produced sources.
	pub retrieval_query: Option<String>,
	pub confidence_score: Option<f32>,
	pub knowledge_enhanced: bool,
	pub processing_time_ms: u64,
	pub retrieval_time_ms: Option<u64>,
	pub generation_time_ms: u64,
	pub token_usage: Option<TokenUsage>,
	#[serde(with = "time_serde")]
	pub timestamp: OffsetDateTime,
}
impl RagResponse {
	/// Maps onto the generic chat response shape with retrieval details in `metadata`.
	pub fn into_chat_response(self) -> ChatResponse {
		let knowledge_sources = self
			.retrieved_sources
			.iter()
			.take(KNOWLEDGE_SOURCES_IN_METADATA)
			.map(|source| {
				serde_json::json!({
					"title": source.title,
					"confidence": source.similarity_score,
					"document_type": source.document_type,
				})
			})
			.collect::<Vec<_>>();
		let mut metadata = Map::new();

		metadata.insert("ai_model".to_string(), Value::String(self.ai_model.clone()));
		metadata.insert("sources_used".to_string(), Value::from(self.retrieved_sources.len()));
		metadata.insert(
			"rag_confidence".to_string(),
			self.confidence_score.map(Value::from).unwrap_or(Value::Null),
		);
		metadata.insert("knowledge_sources".to_string(), Value::Array(knowledge_sources));

		ChatResponse {
			id: self.id,
			message: self.message,
			conversation_id: self.conversation_id,
			ai_model: self.ai_model,
			processing_time_ms: self.processing_time_ms,
			token_usage: self.token_usage,
			confidence_score: self.confidence_score,
			response_type: ResponseType::RagEnhanced,
			metadata,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBrief {
	pub title: String,
	pub document_type: DocumentType,
	pub similarity_score: f32,
}
impl From<&SearchResult> for SourceBrief {
	fn from(result: &SearchResult) -> Self {
		Self {
			title: result.title.clone(),
			document_type: result.document_type,
			similarity_score: result.similarity_score,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RagStreamEvent {
	/// Sent only when retrieval ran.
	RetrievalComplete { retrieved_sources: Vec<SourceBrief>, retrieval_time_ms: u64 },
	ContentChunk { content: String, conversation_id: String },
	ResponseComplete {
		conversation_id: String,
		knowledge_enhanced: bool,
		processing_time_ms: u64,
		retrieval_time_ms: Option<u64>,
	},
	Error { error: String },
}

struct Retrieval {
	ran: bool,
	sources: Vec<SearchResult>,
	elapsed_ms: u64,
}

impl MentorService {
	pub async fn generate_rag_response(&self, request: ChatRequest) -> Result<RagResponse> {
		let started = Instant::now();
		let request = request.normalized()?;
		let conversation_id = crate::conversation_id_for(&request);
		let history = self.conversations.history(&conversation_id);
		let retrieval = self.retrieve(&request.message, &history).await;
		let generation_started = Instant::now();
		let messages = self.rag_messages(&request.message, &retrieval.sources, &history);
		let completion_request = self.completion_request(&messages, &request, false)?;
		let completion = self.complete_with_retry(&completion_request).await.inspect_err(|err| {
			tracing::error!(
				error = %err,
				conversation_id = %conversation_id,
				"Failed to generate RAG response."
			);
		})?;
		let generation_time_ms = crate::elapsed_ms(generation_started);
		let Some(message) = completion.content.filter(|content| !content.is_empty()) else {
			return Err(Error::Provider {
				message: "Chat completion returned empty content.".to_string(),
			});
		};
		let scores =
			retrieval.sources.iter().map(|source| source.similarity_score).collect::<Vec<_>>();

		self.conversations.record_turn(
			&conversation_id,
			&request.message,
			&message,
			self.cfg.chat.max_conversation_history as usize,
		);

		if let Some(usage) = &completion.usage {
			self.monitoring.record_token_usage(usage);
		}

		let knowledge_enhanced = !retrieval.sources.is_empty();
		let processing_time_ms = crate::elapsed_ms(started);

		tracing::info!(
			conversation_id = %conversation_id,
			processing_time_ms,
			retrieval_time_ms = retrieval.elapsed_ms,
			generation_time_ms,
			sources = retrieval.sources.len(),
			"RAG response generated."
		);

		Ok(RagResponse {
			id: Uuid::new_v4().to_string(),
			message,
			conversation_id,
			ai_model: completion.model.unwrap_or_else(|| self.cfg.providers.llm.model.clone()),
			retrieval_query: knowledge_enhanced.then(|| request.message.clone()),
			confidence_score: confidence::retrieval_confidence(&scores),
			knowledge_enhanced,
			processing_time_ms,
			retrieval_time_ms: retrieval.ran.then_some(retrieval.elapsed_ms),
			generation_time_ms,
			token_usage: completion.usage,
			timestamp: OffsetDateTime::now_utc(),
			retrieved_sources: retrieval.sources,
		})
	}

	pub fn generate_streaming_rag_response(
		&self,
		request: ChatRequest,
	) -> Result<BoxStream<'static, RagStreamEvent>> {
		let request = request.normalized()?;
		let conversation_id = crate::conversation_id_for(&request);
		let (tx, rx) = mpsc::channel(STREAM_BUFFER);
		let service = self.clone();

		tokio::spawn(async move { service.run_rag_stream(request, conversation_id, tx).await });

		Ok(crate::receiver_stream(rx))
	}

	async fn run_rag_stream(
		self,
		request: ChatRequest,
		conversation_id: String,
		tx: mpsc::Sender<RagStreamEvent>,
	) {
		let started = Instant::now();
		let history = self.conversations.history(&conversation_id);
		let retrieval = self.retrieve(&request.message, &history).await;

		tracing::info!(
			conversation_id = %conversation_id,
			user_id_hash = %monitoring::user_hash(&request.user_id),
			sources = retrieval.sources.len(),
			"Starting streaming RAG response."
		);

		if retrieval.ran {
			let event = RagStreamEvent::RetrievalComplete {
				retrieved_sources: retrieval.sources.iter().map(SourceBrief::from).collect(),
				retrieval_time_ms: retrieval.elapsed_ms,
			};

			if tx.send(event).await.is_err() {
				return;
			}
		}

		let messages = self.rag_messages(&request.message, &retrieval.sources, &history);
		let outcome = match self.completion_request(&messages, &request, false) {
			Ok(completion_request) => {
				let chunk_conversation = conversation_id.clone();

				self.stream_completion(&completion_request, &tx, |content| {
					RagStreamEvent::ContentChunk {
						content,
						conversation_id: chunk_conversation.clone(),
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
					"Streaming RAG client disconnected; turn not recorded."
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

				RagStreamEvent::ResponseComplete {
					conversation_id,
					knowledge_enhanced: !retrieval.sources.is_empty(),
					processing_time_ms: crate::elapsed_ms(started),
					retrieval_time_ms: retrieval.ran.then_some(retrieval.elapsed_ms),
				}
			},
			Err(err) => {
				tracing::error!(
					error = %err,
					conversation_id = %conversation_id,
					"Streaming RAG response failed."
				);

				RagStreamEvent::Error { error: err.to_string() }
			},
		};

		let _ = tx.send(last).await;
	}

	async fn retrieve(&self, message: &str, history: &[ChatMessage]) -> Retrieval {
		let rag = &self.cfg.rag;

		if !(rag.enabled_by_default && classify::should_use_rag(message)) {
			return Retrieval { ran: false, sources: Vec::new(), elapsed_ms: 0 };
		}

		let started = Instant::now();
		let query = SearchQuery {
			query: knowledge::truncate_chars(message, knowledge::MAX_QUERY_CHARS).to_string(),
			conversation_context: prompt::retrieval_context(history),
			document_types: None,
			tags: None,
			max_results: rag.max_search_results,
			similarity_threshold: rag.min_confidence_score,
		};
		let sources = self.semantic_search(&query).await;

		tracing::info!(sources = sources.len(), "Knowledge retrieval completed.");

		Retrieval { ran: true, sources, elapsed_ms: crate::elapsed_ms(started) }
	}

	/// Single RAG system message when sources exist, else the plain mentor conversation.
	fn rag_messages(
		&self,
		message: &str,
		sources: &[SearchResult],
		history: &[ChatMessage],
	) -> Vec<PromptMessage> {
		if sources.is_empty() {
			return prompt::build_chat_messages(
				prompt::CAREER_MENTOR_PROMPT,
				history,
				message,
				self.cfg.chat.context_messages as usize,
			);
		}

		let system = prompt::build_rag_prompt(
			message,
			sources,
			history,
			self.cfg.rag.max_search_results as usize,
		);

		vec![PromptMessage::new(Role::System, system)]
	}
}
