pub mod alerts;
pub mod cache;
pub mod chat;
pub mod conversation;
pub mod health;
pub mod monitoring;
pub mod rag;
pub mod search;

mod error;

pub use alerts::{Alert, AlertManager, AlertRule, AlertSeverity, AlertStatus};
pub use cache::ResponseCache;
pub use chat::{ChatRequest, ChatResponse, StreamingChatChunk};
pub use conversation::ConversationStore;
pub use error::{Error, Result};
pub use health::{DependencyStatus, HealthReport, ServiceStatus};
pub use monitoring::Monitoring;
pub use rag::{RagResponse, RagStreamEvent, SourceBrief};

use std::{
	future::Future,
	pin::Pin,
	sync::Arc,
	time::{Duration, Instant},
};

use futures::{StreamExt, stream::BoxStream};
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

use mentor_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, SearchProviderConfig};
use mentor_providers::{
	chat::{self as chat_api, ChatCompletion, ChatCompletionRequest},
	embedding,
	search::{self as search_api, IndexingOutcome, SearchRequest, SearchResponse},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<Vec<f32>>>>;
}

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a ChatCompletionRequest,
	) -> BoxFuture<'a, mentor_providers::Result<ChatCompletion>>;

	/// Sends content deltas into `tx` as they arrive.
	fn stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a ChatCompletionRequest,
		tx: mpsc::Sender<String>,
	) -> BoxFuture<'a, mentor_providers::Result<()>>;
}

pub trait SearchIndexProvider
where
	Self: Send + Sync,
{
	fn ensure_index<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		dimensions: u32,
	) -> BoxFuture<'a, mentor_providers::Result<()>>;

	fn upload<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		documents: &'a [Value],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<IndexingOutcome>>>;

	fn search<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		request: &'a SearchRequest,
	) -> BoxFuture<'a, mentor_providers::Result<SearchResponse>>;

	fn delete<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		ids: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<IndexingOutcome>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub chat: Arc<dyn ChatProvider>,
	pub search: Arc<dyn SearchIndexProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		chat: Arc<dyn ChatProvider>,
		search: Arc<dyn SearchIndexProvider>,
	) -> Self {
		Self { embedding, chat, search }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), chat: provider.clone(), search: provider }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
impl ChatProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a ChatCompletionRequest,
	) -> BoxFuture<'a, mentor_providers::Result<ChatCompletion>> {
		Box::pin(chat_api::complete(cfg, request))
	}

	fn stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a ChatCompletionRequest,
		tx: mpsc::Sender<String>,
	) -> BoxFuture<'a, mentor_providers::Result<()>> {
		Box::pin(chat_api::stream(cfg, request, tx))
	}
}
impl SearchIndexProvider for DefaultProviders {
	fn ensure_index<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		dimensions: u32,
	) -> BoxFuture<'a, mentor_providers::Result<()>> {
		Box::pin(search_api::create_or_update_index(cfg, dimensions))
	}

	fn upload<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		documents: &'a [Value],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<IndexingOutcome>>> {
		Box::pin(search_api::upload_documents(cfg, documents))
	}

	fn search<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		request: &'a SearchRequest,
	) -> BoxFuture<'a, mentor_providers::Result<SearchResponse>> {
		Box::pin(search_api::search(cfg, request))
	}

	fn delete<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		ids: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<IndexingOutcome>>> {
		Box::pin(search_api::delete_documents(cfg, ids))
	}
}

/// Chat, retrieval, and knowledge base operations over shared in-process state.
///
/// Cloning is cheap; clones share conversations, the cache, metrics, and the request limiter.
#[derive(Clone)]
pub struct MentorService {
	pub cfg: Arc<Config>,
	pub providers: Providers,
	pub conversations: Arc<ConversationStore>,
	pub cache: Arc<ResponseCache>,
	pub monitoring: Arc<Monitoring>,
	pub alerts: Arc<AlertManager>,
	limiter: Arc<Semaphore>,
}
impl MentorService {
	pub fn new(cfg: Config) -> Result<Self> {
		Self::with_providers(cfg, Providers::default())
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Result<Self> {
		let alerts = AlertManager::from_config(&cfg.monitoring)?;
		let monitoring = Monitoring::new(
			cfg.service.app_name.clone(),
			cfg.service.app_version.clone(),
			cfg.monitoring.histogram_window as usize,
		);
		let cache = ResponseCache::new(
			cfg.cache.max_entries as usize,
			Duration::from_secs(cfg.cache.ttl_seconds),
		);
		let limiter = Semaphore::new(cfg.chat.max_concurrent_requests as usize);

		Ok(Self {
			cfg: Arc::new(cfg),
			providers,
			conversations: Arc::new(ConversationStore::default()),
			cache: Arc::new(cache),
			monitoring: Arc::new(monitoring),
			alerts: Arc::new(alerts),
			limiter: Arc::new(limiter),
		})
	}
}

pub(crate) fn conversation_id_for(request: &ChatRequest) -> String {
	request.conversation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
	started.elapsed().as_millis() as u64
}

pub(crate) fn receiver_stream<T>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T>
where
	T: Send + 'static,
{
	futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
		.boxed()
}
