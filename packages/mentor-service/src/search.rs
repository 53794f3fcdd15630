//! Knowledge base indexing and retrieval over the managed search index.

use std::{
	collections::{BTreeMap, BTreeSet},
	time::{Duration, Instant},
};

use serde_json::{Map, Value};
use time::OffsetDateTime;

use mentor_domain::{
	knowledge::{
		self, DocumentType, IndexingState, IndexingStatus, KnowledgeBaseStats, KnowledgeDocument,
		SearchQuery, SearchResult,
	},
	time_serde,
};
use mentor_providers::search::{self as search_api, SearchHit, SearchRequest};

use crate::{Error, MentorService, Result, monitoring};

pub const INDEX_BATCH_SIZE: usize = 10;
pub const INDEX_BATCH_PAUSE: Duration = Duration::from_millis(100);

const STATS_SAMPLE_SIZE: u32 = 100;

impl MentorService {
	/// Creates or updates the index schema; failures are logged and reported as `false`.
	pub async fn initialize_index(&self) -> bool {
		let cfg = &self.cfg.providers;

		match self.providers.search.ensure_index(&cfg.search, cfg.embedding.dimensions).await {
			Ok(()) => {
				tracing::info!(index = %cfg.search.index_name, "Search index is ready.");

				true
			},
			Err(err) => {
				tracing::error!(
					error = %err,
					index = %cfg.search.index_name,
					"Failed to initialize search index."
				);

				false
			},
		}
	}

	pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [text.to_string()];
		let vectors = self.providers.embedding.embed(cfg, &texts).await?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != cfg.dimensions as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding has {} dimensions, expected {}.",
					vector.len(),
					cfg.dimensions
				),
			});
		}

		Ok(vector)
	}

	pub async fn index_document(&self, document: KnowledgeDocument) -> Result<()> {
		let document = document.normalized()?;
		let payload = self.search_document(&document).await?;
		let outcomes = self.providers.search.upload(&self.cfg.providers.search, &[payload]).await?;
		let Some(outcome) = outcomes.into_iter().next() else {
			return Err(Error::Provider {
				message: "Search index returned no indexing result.".to_string(),
			});
		};

		if !outcome.status {
			return Err(Error::Provider {
				message: format!(
					"Failed to index document {}: {}",
					document.id,
					outcome.error_message.unwrap_or_default()
				),
			});
		}

		tracing::info!(document_id = %document.id, "Document indexed.");

		Ok(())
	}

	/// Indexes documents in batches; individual failures are counted, not raised.
	pub async fn index_documents_batch(&self, documents: Vec<KnowledgeDocument>) -> IndexingStatus {
		let start = OffsetDateTime::now_utc();
		let operation_id = blake3::hash(
			format!("{}_{}", time_serde::format(start), documents.len()).as_bytes(),
		)
		.to_hex()
		.to_string();
		let mut status = IndexingStatus::start(operation_id, start);
		let batch_count = documents.len().div_ceil(INDEX_BATCH_SIZE);

		for (batch_index, batch) in documents.chunks(INDEX_BATCH_SIZE).enumerate() {
			let mut payloads = Vec::with_capacity(batch.len());

			for document in batch {
				let prepared = match document.clone().normalized() {
					Ok(document) => self.search_document(&document).await,
					Err(err) => Err(err.into()),
				};

				match prepared {
					Ok(payload) => payloads.push(payload),
					Err(err) => status.record_failure(format!("Document {}: {err}", document.id)),
				}
			}

			if !payloads.is_empty() {
				match self.providers.search.upload(&self.cfg.providers.search, &payloads).await {
					Ok(outcomes) =>
						for outcome in outcomes {
							if outcome.status {
								status.documents_successful += 1;
							} else {
								status.record_failure(format!(
									"Document {}: {}",
									outcome.key,
									outcome.error_message.unwrap_or_default()
								));
							}
						},
					Err(err) => {
						tracing::error!(error = %err, batch = batch_index, "Batch upload failed.");

						status.documents_failed += payloads.len() as u32;
						status.error_messages.push(format!("Batch upload error: {err}"));
					},
				}
			}

			status.documents_processed += batch.len() as u32;

			if batch_index + 1 < batch_count {
				tokio::time::sleep(INDEX_BATCH_PAUSE).await;
			}
		}

		status.finish(IndexingState::Completed, OffsetDateTime::now_utc());

		tracing::info!(
			operation_id = %status.operation_id,
			successful = status.documents_successful,
			failed = status.documents_failed,
			"Indexing operation completed."
		);

		status
	}

	/// Hybrid vector and semantic search; errors are logged and yield no results.
	pub async fn semantic_search(&self, query: &SearchQuery) -> Vec<SearchResult> {
		let started = Instant::now();

		match self.try_semantic_search(query).await {
			Ok(results) => {
				let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

				self.monitoring.record_search_query(&query.query, results.len(), elapsed_ms);

				results
			},
			Err(err) => {
				tracing::error!(error = %err, "Semantic search failed.");

				Vec::new()
			},
		}
	}

	pub async fn knowledge_base_stats(&self) -> KnowledgeBaseStats {
		match self.try_knowledge_base_stats().await {
			Ok(stats) => stats,
			Err(err) => {
				tracing::error!(error = %err, "Failed to read knowledge base stats.");

				KnowledgeBaseStats::empty(OffsetDateTime::now_utc())
			},
		}
	}

	pub async fn delete_document(&self, document_id: &str) -> bool {
		let ids = [document_id.to_string()];

		match self.providers.search.delete(&self.cfg.providers.search, &ids).await {
			Ok(outcomes) => {
				let deleted = outcomes.first().is_some_and(|outcome| outcome.status);

				tracing::info!(document_id, deleted, "Document delete requested.");

				deleted
			},
			Err(err) => {
				tracing::error!(error = %err, document_id, "Failed to delete document.");

				false
			},
		}
	}

	async fn try_semantic_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
		query.validate()?;

		let vector = self.generate_embedding(&query.query).await?;
		let types = query
			.document_types
			.iter()
			.flatten()
			.map(|kind| kind.as_str())
			.collect::<Vec<_>>();
		let tags = query.tags.iter().flatten().map(String::as_str).collect::<Vec<_>>();
		let request = SearchRequest {
			search: query.query.clone(),
			filter: search_api::build_filter(&types, &tags),
			top: query.max_results,
			vector: Some(vector),
			..Default::default()
		};
		let response = self.providers.search.search(&self.cfg.providers.search, &request).await?;
		let mut results = response
			.hits
			.into_iter()
			.filter_map(to_search_result)
			.filter(|result| result.similarity_score >= query.similarity_threshold)
			.collect::<Vec<_>>();

		results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));

		tracing::info!(
			results = results.len(),
			query_preview = knowledge::truncate_chars(&query.query, 50),
			"Semantic search completed."
		);

		Ok(results)
	}

	async fn try_knowledge_base_stats(&self) -> Result<KnowledgeBaseStats> {
		let cfg = &self.cfg.providers.search;
		let count = SearchRequest {
			search: "*".to_string(),
			top: 0,
			count: true,
			..Default::default()
		};
		let facets = SearchRequest {
			search: "*".to_string(),
			top: 0,
			facets: vec!["document_type".to_string()],
			..Default::default()
		};
		let sample = SearchRequest {
			search: "*".to_string(),
			top: STATS_SAMPLE_SIZE,
			select: vec!["content".to_string(), "tags".to_string()],
			..Default::default()
		};
		let total_documents = self.providers.search.search(cfg, &count).await?.count.unwrap_or(0);
		let facet_response = self.providers.search.search(cfg, &facets).await?;
		let mut documents_by_type = BTreeMap::new();

		for facet in facet_response.facets.get("document_type").into_iter().flatten() {
			match facet.value.as_str().map(str::parse::<DocumentType>) {
				Some(Ok(kind)) => {
					documents_by_type.insert(kind, facet.count);
				},
				_ => tracing::warn!(value = %facet.value, "Skipping unknown document type facet."),
			}
		}

		let sample_response = self.providers.search.search(cfg, &sample).await?;
		let mut total_length = 0_usize;
		let mut sampled = 0_usize;
		let mut tags = BTreeSet::new();

		for hit in &sample_response.hits {
			if let Some(content) = hit.document.get("content").and_then(Value::as_str)
				&& !content.is_empty()
			{
				total_length += content.chars().count();
				sampled += 1;
			}

			for tag in hit.document.get("tags").and_then(Value::as_array).into_iter().flatten() {
				if let Some(tag) = tag.as_str() {
					tags.insert(tag.to_string());
				}
			}
		}

		let average_document_length =
			if sampled > 0 { total_length as f64 / sampled as f64 } else { 0.0 };
		let summary = self.monitoring.metrics().summary();
		let mut search_performance = BTreeMap::new();

		if let Some(avg) = summary.histogram_mean(monitoring::SEARCH_DURATION_MS) {
			search_performance.insert("avg_search_time_ms".to_string(), avg);
		}
		if let Some(avg) = summary.histogram_mean(monitoring::SEARCH_RESULTS_COUNT) {
			search_performance.insert("avg_results_count".to_string(), avg);
		}

		Ok(KnowledgeBaseStats {
			total_documents,
			documents_by_type,
			total_tags: tags.len() as u64,
			average_document_length,
			last_updated: OffsetDateTime::now_utc(),
			search_performance,
		})
	}

	async fn search_document(&self, document: &KnowledgeDocument) -> Result<Value> {
		let vector = self.generate_embedding(&document.embedding_text()).await?;

		Ok(index_payload(document, vector, &self.cfg.providers.search.vector_field)?)
	}
}

/// Index representation of a document; metadata is stored as a JSON string.
pub fn index_payload(
	document: &KnowledgeDocument,
	vector: Vec<f32>,
	vector_field: &str,
) -> serde_json::Result<Value> {
	let mut payload = Map::new();

	payload.insert("id".to_string(), Value::String(document.id.clone()));
	payload.insert("title".to_string(), Value::String(document.title.clone()));
	payload.insert("content".to_string(), Value::String(document.content.clone()));
	payload.insert("summary".to_string(), Value::String(document.summary.clone()));
	payload.insert(
		"document_type".to_string(),
		Value::String(document.document_type.as_str().to_string()),
	);
	payload.insert("tags".to_string(), Value::from(document.tags.clone()));
	payload.insert(
		"metadata".to_string(),
		Value::String(serde_json::to_string(&document.metadata)?),
	);
	payload.insert("source_url".to_string(), Value::from(document.source_url.clone()));
	payload.insert("author".to_string(), Value::from(document.author.clone()));
	payload.insert(
		"created_at".to_string(),
		Value::String(time_serde::format(document.created_at)),
	);
	payload.insert(
		"updated_at".to_string(),
		Value::String(time_serde::format(document.updated_at)),
	);
	payload.insert(vector_field.to_string(), Value::from(vector));

	Ok(Value::Object(payload))
}

/// Converts an index hit; hits missing required fields are skipped.
fn to_search_result(hit: SearchHit) -> Option<SearchResult> {
	let doc = &hit.document;
	let text = |field: &str| doc.get(field).and_then(Value::as_str);
	let document_type = match text("document_type")?.parse::<DocumentType>() {
		Ok(kind) => kind,
		Err(err) => {
			tracing::warn!(error = %err, "Skipping search hit with unknown document type.");

			return None;
		},
	};
	let metadata = text("metadata")
		.and_then(|raw| serde_json::from_str::<Map<String, Value>>(raw).ok())
		.unwrap_or_default();
	let tags = doc
		.get("tags")
		.and_then(Value::as_array)
		.map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
		.unwrap_or_default();

	Some(SearchResult {
		document_id: text("id")?.to_string(),
		title: text("title")?.to_string(),
		content_snippet: knowledge::content_snippet(text("content")?),
		summary: text("summary").unwrap_or_default().to_string(),
		document_type,
		similarity_score: knowledge::hybrid_similarity(hit.reranker_score, hit.score),
		tags,
		metadata,
		highlighted_snippets: hit.captions,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hit(document: Value, score: Option<f64>, reranker_score: Option<f64>) -> SearchHit {
		SearchHit {
			document: document.as_object().cloned().expect("Hit must be an object."),
			score,
			reranker_score,
			captions: vec!["caption".to_string()],
		}
	}

	#[test]
	fn payload_stores_metadata_as_json_text() {
		let mut document = KnowledgeDocument::new("T", "C", "S", DocumentType::SalaryData);

		document.metadata.insert("region".to_string(), Value::String("eu".to_string()));

		let payload =
			index_payload(&document, vec![0.5], "content_vector").expect("Payload failed.");

		assert_eq!(payload["metadata"], r#"{"region":"eu"}"#);
		assert_eq!(payload["document_type"], "salary_data");
		assert_eq!(payload["content_vector"][0], 0.5);
		assert!(payload["author"].is_null());
	}

	#[test]
	fn hits_map_to_results_with_tolerant_metadata() {
		let result = to_search_result(hit(
			serde_json::json!({
				"id": "doc-1",
				"title": "Guide",
				"content": "Body",
				"summary": "Short",
				"document_type": "career_guide",
				"tags": ["python"],
				"metadata": "not json"
			}),
			Some(0.4),
			Some(3.2),
		))
		.expect("Expected a result.");

		assert!((result.similarity_score - 0.8).abs() < 1e-6);
		assert!(result.metadata.is_empty());
		assert_eq!(result.tags, vec!["python".to_string()]);
		assert_eq!(result.highlighted_snippets, vec!["caption".to_string()]);
	}

	#[test]
	fn hits_with_unknown_types_are_skipped() {
		let result = to_search_result(hit(
			serde_json::json!({ "id": "x", "title": "t", "content": "c", "document_type": "blog" }),
			Some(0.9),
			None,
		));

		assert!(result.is_none());
	}
}
