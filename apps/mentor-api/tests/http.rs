use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode, header},
	response::Response,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::util::ServiceExt;

use mentor_api::{middleware, routes, state::AppState};
use mentor_config::{EmbeddingProviderConfig, LlmProviderConfig, SearchProviderConfig};
use mentor_providers::{
	Error as ProviderError,
	chat::{ChatCompletion, ChatCompletionRequest, TokenUsage},
	search::{IndexingOutcome, SearchHit, SearchRequest, SearchResponse},
};
use mentor_service::{
	BoxFuture, ChatProvider, EmbeddingProvider, MentorService, Providers, SearchIndexProvider,
	monitoring,
};

struct StubEmbedding;
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(texts.iter().map(|_| vec![0.0, 1.0, 0.0]).collect()) })
	}
}

struct StubLlm {
	available: bool,
}
impl ChatProvider for StubLlm {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_request: &'a ChatCompletionRequest,
	) -> BoxFuture<'a, mentor_providers::Result<ChatCompletion>> {
		Box::pin(async move {
			if !self.available {
				return Err(ProviderError::InvalidResponse {
					message: "model unavailable".to_string(),
				});
			}

			Ok(ChatCompletion {
				content: Some("Build a portfolio and practice interviews.".to_string()),
				finish_reason: Some("stop".to_string()),
				model: Some("mock-gpt".to_string()),
				usage: Some(TokenUsage {
					prompt_tokens: 12,
					completion_tokens: 8,
					total_tokens: 20,
				}),
			})
		})
	}

	fn stream<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_request: &'a ChatCompletionRequest,
		tx: mpsc::Sender<String>,
	) -> BoxFuture<'a, mentor_providers::Result<()>> {
		Box::pin(async move {
			for delta in ["Build ", "a portfolio."] {
				if tx.send(delta.to_string()).await.is_err() {
					break;
				}
			}

			Ok(())
		})
	}
}

struct StubSearch;
impl SearchIndexProvider for StubSearch {
	fn ensure_index<'a>(
		&'a self,
		_cfg: &'a SearchProviderConfig,
		_dimensions: u32,
	) -> BoxFuture<'a, mentor_providers::Result<()>> {
		Box::pin(async { Ok(()) })
	}

	fn upload<'a>(
		&'a self,
		_cfg: &'a SearchProviderConfig,
		documents: &'a [Value],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<IndexingOutcome>>> {
		Box::pin(async move {
			Ok(documents
				.iter()
				.map(|doc| IndexingOutcome {
					key: doc["id"].as_str().unwrap_or_default().to_string(),
					status: true,
					error_message: None,
					status_code: Some(201),
				})
				.collect())
		})
	}

	fn search<'a>(
		&'a self,
		_cfg: &'a SearchProviderConfig,
		request: &'a SearchRequest,
	) -> BoxFuture<'a, mentor_providers::Result<SearchResponse>> {
		Box::pin(async move {
			if request.count {
				return Ok(SearchResponse { count: Some(1), ..Default::default() });
			}
			if request.vector.is_none() {
				return Ok(SearchResponse::default());
			}

			let document = json!({
				"id": "guide-1",
				"title": "Interview Playbook",
				"content": "Practice system design and behavioral questions.",
				"summary": "How to prepare for interviews.",
				"document_type": "interview_prep",
				"tags": ["interview"],
				"metadata": "{}"
			});
			let hit = SearchHit {
				document: document.as_object().cloned().unwrap_or_default(),
				score: Some(0.88),
				reranker_score: None,
				captions: Vec::new(),
			};

			Ok(SearchResponse { hits: vec![hit], ..Default::default() })
		})
	}

	fn delete<'a>(
		&'a self,
		_cfg: &'a SearchProviderConfig,
		_ids: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<IndexingOutcome>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

fn test_app(llm_available: bool) -> (Router, MentorService) {
	let cfg = mentor_testkit::test_config("http://127.0.0.1:9").expect("Failed to build config.");
	let providers = Providers::new(
		Arc::new(StubEmbedding),
		Arc::new(StubLlm { available: llm_available }),
		Arc::new(StubSearch),
	);
	let service = MentorService::with_providers(cfg, providers).expect("Failed to build service.");
	let app = routes::router(AppState::from_service(service.clone()));

	(app, service)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
	let mut builder = Request::builder().method(method).uri(uri);
	let body = match body {
		Some(json) => {
			builder = builder.header(header::CONTENT_TYPE, "application/json");

			Body::from(json.to_string())
		},
		None => Body::empty(),
	};

	app.clone()
		.oneshot(builder.body(body).expect("Failed to build request."))
		.await
		.expect("Failed to call the router.")
}

async fn body_text(response: Response) -> String {
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");

	String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8.")
}

async fn body_json(response: Response) -> Value {
	serde_json::from_str(&body_text(response).await).expect("Failed to parse response.")
}

#[tokio::test]
async fn root_welcomes_with_version() {
	let (app, _) = test_app(true);
	let response = send(&app, "GET", "/", None).await;

	assert_eq!(response.status(), StatusCode::OK);

	let json = body_json(response).await;

	assert_eq!(json["message"], "Welcome to AI Career Mentor Chatbot");
	assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn responses_carry_request_id_and_timing() {
	let (app, service) = test_app(true);
	let response = send(&app, "GET", "/api/v1/health/live", None).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert!(response.headers().contains_key(middleware::REQUEST_ID_HEADER));

	let timing = response.headers()[middleware::RESPONSE_TIME_HEADER]
		.to_str()
		.expect("Timing header is not ASCII.");

	assert!(timing.ends_with("ms"));
	assert_eq!(body_json(response).await["status"], "alive");
	assert_eq!(
		service.monitoring.metrics().summary().counter_total(monitoring::CHAT_REQUESTS_TOTAL),
		1.0
	);
}

#[tokio::test]
async fn readiness_follows_model_availability() {
	let (ready, _) = test_app(true);

	assert_eq!(send(&ready, "GET", "/api/v1/health/ready", None).await.status(), StatusCode::OK);

	let (not_ready, service) = test_app(false);
	let response = send(&not_ready, "GET", "/api/v1/health/ready", None).await;

	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(body_json(response).await["error_code"], "service_unavailable");
	assert_eq!(service.monitoring.derived_metrics()["total_errors"], 1.0);
}

#[tokio::test]
async fn health_reports_dependency_status() {
	let (app, _) = test_app(false);
	let json = body_json(send(&app, "GET", "/api/v1/health", None).await).await;

	assert_eq!(json["status"], "unhealthy");
	assert_eq!(json["llm_status"], "error");
	assert_eq!(json["search_status"], "connected");
}

#[tokio::test]
async fn chat_returns_a_mentor_response() {
	let (app, _) = test_app(true);
	let response = send(
		&app,
		"POST",
		"/api/v1/chat/chat",
		Some(json!({ "message": "How do I switch careers?", "user_id": "user-1" })),
	)
	.await;

	assert_eq!(response.status(), StatusCode::OK);

	let json = body_json(response).await;

	assert_eq!(json["response_type"], "career_advice");
	assert_eq!(json["token_usage"]["total_tokens"], 20);
	assert!(json["conversation_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn chat_with_rag_maps_sources_into_metadata() {
	let (app, _) = test_app(true);
	let json = body_json(
		send(
			&app,
			"POST",
			"/api/v1/chat/chat?use_rag=true",
			Some(json!({ "message": "How should I prepare for an interview?", "user_id": "u" })),
		)
		.await,
	)
	.await;

	assert_eq!(json["response_type"], "rag_enhanced");
	assert_eq!(json["metadata"]["sources_used"], 1);
	assert_eq!(json["metadata"]["knowledge_sources"][0]["title"], "Interview Playbook");
}

#[tokio::test]
async fn rag_endpoint_returns_retrieval_details() {
	let (app, _) = test_app(true);
	let json = body_json(
		send(
			&app,
			"POST",
			"/api/v1/chat/chat/rag",
			Some(json!({ "message": "What interview skills matter?", "user_id": "u" })),
		)
		.await,
	)
	.await;

	assert_eq!(json["knowledge_enhanced"], true);
	assert_eq!(json["retrieved_sources"][0]["document_id"], "guide-1");
	assert_eq!(json["retrieval_query"], "What interview skills matter?");
}

#[tokio::test]
async fn invalid_chat_requests_name_the_field() {
	let (app, _) = test_app(true);
	let response = send(
		&app,
		"POST",
		"/api/v1/chat/chat",
		Some(json!({ "message": "hi", "user_id": "u", "temperature": 3.5 })),
	)
	.await;

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let json = body_json(response).await;

	assert_eq!(json["error_code"], "invalid_request");
	assert_eq!(json["fields"][0], "temperature");
}

#[tokio::test]
async fn provider_failures_map_to_bad_gateway() {
	let (app, _) = test_app(false);
	let response = send(
		&app,
		"POST",
		"/api/v1/chat/chat",
		Some(json!({ "message": "Hello", "user_id": "u" })),
	)
	.await;

	assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
	assert_eq!(body_json(response).await["error_code"], "provider_error");
}

#[tokio::test]
async fn chat_stream_emits_sse_chunks() {
	let (app, _) = test_app(true);
	let response = send(
		&app,
		"POST",
		"/api/v1/chat/chat/stream",
		Some(json!({ "message": "Hello", "user_id": "u", "conversation_id": "conv-sse" })),
	)
	.await;

	assert_eq!(response.status(), StatusCode::OK);
	assert!(
		response.headers()[header::CONTENT_TYPE]
			.to_str()
			.expect("Content type is not ASCII.")
			.starts_with("text/event-stream")
	);

	let text = body_text(response).await;
	let events = text
		.lines()
		.filter_map(|line| line.strip_prefix("data: "))
		.map(|data| serde_json::from_str::<Value>(data).expect("Event is not JSON."))
		.collect::<Vec<_>>();
	let ids =
		events.iter().map(|event| event["id"].as_str().unwrap_or_default()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["chunk_001", "chunk_002", "chunk_final"]);
	assert_eq!(events[0]["conversation_id"], "conv-sse");
}

#[tokio::test]
async fn rag_stream_emits_typed_events() {
	let (app, _) = test_app(true);
	let text = body_text(
		send(
			&app,
			"POST",
			"/api/v1/chat/chat/rag/stream",
			Some(json!({ "message": "Which interview topics matter?", "user_id": "u" })),
		)
		.await,
	)
	.await;
	let types = text
		.lines()
		.filter_map(|line| line.strip_prefix("data: "))
		.map(|data| serde_json::from_str::<Value>(data).expect("Event is not JSON."))
		.map(|event| event["type"].as_str().unwrap_or_default().to_string())
		.collect::<Vec<_>>();

	assert_eq!(
		types,
		vec!["retrieval_complete", "content_chunk", "content_chunk", "response_complete"]
	);
}

#[tokio::test]
async fn search_validates_and_formats_results() {
	let (app, _) = test_app(true);
	let bad_limit = send(&app, "POST", "/api/v1/chat/search?query=python&limit=0", None).await;

	assert_eq!(bad_limit.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(bad_limit).await["fields"][0], "limit");

	let bad_type =
		send(&app, "POST", "/api/v1/chat/search?query=python&document_types=blog", None).await;

	assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);

	let json = body_json(
		send(
			&app,
			"POST",
			"/api/v1/chat/search?query=interview&limit=30&document_types=interview_prep",
			None,
		)
		.await,
	)
	.await;

	assert_eq!(json["total_results"], 1);
	assert_eq!(json["max_results"], 30);
	assert_eq!(json["document_types_filter"][0], "interview_prep");
	assert_eq!(json["results"][0]["title"], "Interview Playbook");
	assert!(json["results"][0]["confidence_score"].as_f64().is_some_and(|score| score > 0.87));
}

#[tokio::test]
async fn knowledge_stats_report_index_health() {
	let (app, _) = test_app(true);
	let json = body_json(send(&app, "GET", "/api/v1/chat/knowledge/stats", None).await).await;

	assert_eq!(json["total_documents"], 1);
	assert_eq!(json["index_health"], "healthy");
	assert!(json["available_document_types"].as_array().is_some_and(Vec::is_empty));
}

#[tokio::test]
async fn conversations_can_be_summarized_and_cleared() {
	let (app, _) = test_app(true);
	let missing = send(&app, "GET", "/api/v1/chat/conversations/nope/summary", None).await;

	assert_eq!(missing.status(), StatusCode::NOT_FOUND);
	assert_eq!(body_json(missing).await["error_code"], "not_found");

	send(
		&app,
		"POST",
		"/api/v1/chat/chat",
		Some(json!({ "message": "Hello", "user_id": "u", "conversation_id": "conv-1" })),
	)
	.await;

	let summary =
		body_json(send(&app, "GET", "/api/v1/chat/conversations/conv-1/summary", None).await).await;

	assert_eq!(summary["total_messages"], 2);

	let active =
		body_json(send(&app, "GET", "/api/v1/chat/conversations/active", None).await).await;

	assert_eq!(active["active_conversations"], 1);

	let cleared =
		body_json(send(&app, "DELETE", "/api/v1/chat/conversations/conv-1", None).await).await;

	assert_eq!(cleared["cleared"], true);
	assert_eq!(cleared["status"], "success");
}

#[tokio::test]
async fn monitoring_exposes_metrics_and_alerts() {
	let (app, _) = test_app(true);

	send(&app, "GET", "/api/v1/health/live", None).await;

	let metrics = body_json(send(&app, "GET", "/api/v1/monitoring/metrics", None).await).await;

	assert_eq!(metrics["health"]["metrics_summary"]["chat_requests"], 1.0);
	assert_eq!(metrics["derived"]["total_requests"], 1.0);
	assert_eq!(metrics["export"]["service"], "AI Career Mentor Chatbot");

	let alerts = body_json(send(&app, "GET", "/api/v1/monitoring/alerts", None).await).await;

	assert_eq!(alerts["summary"]["rules_count"], 7);
	assert!(alerts["active"].as_array().is_some_and(Vec::is_empty));
}
