use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value, json};
use tokio::{net::TcpListener, sync::mpsc};

use mentor_providers::{
	Error,
	chat::{self, ChatCompletionRequest},
	embedding, search,
};
use mentor_testkit::{CannedResponse, MockUpstream};

fn completion_request() -> ChatCompletionRequest {
	ChatCompletionRequest {
		messages: vec![json!({ "role": "user", "content": "How do I become an AI engineer?" })],
		temperature: 0.7,
		max_tokens: 100,
		top_p: Some(0.95),
		frequency_penalty: Some(0.2),
		presence_penalty: Some(0.1),
	}
}

#[test]
fn builds_bearer_auth_header() {
	let headers = mentor_providers::auth_headers("bearer", "secret", &Map::new())
		.expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn builds_api_key_header_with_defaults() {
	let mut defaults = Map::new();

	defaults.insert("x-tenant".to_string(), Value::String("mentor".to_string()));

	let headers = mentor_providers::auth_headers("api_key", "secret", &defaults)
		.expect("Failed to build headers.");

	assert_eq!(headers.get("api-key").expect("Missing api-key header."), "secret");
	assert_eq!(headers.get("x-tenant").expect("Missing default header."), "mentor");
	assert!(headers.get(AUTHORIZATION).is_none());
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("x-retries".to_string(), json!(3));

	let err = mentor_providers::auth_headers("bearer", "secret", &defaults)
		.expect_err("Expected invalid config.");

	assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[test]
fn endpoint_url_appends_api_version() {
	assert_eq!(
		mentor_providers::endpoint_url("https://x", "/chat", Some("2023-12-01-preview")),
		"https://x/chat?api-version=2023-12-01-preview"
	);
	assert_eq!(mentor_providers::endpoint_url("https://x", "/chat", None), "https://x/chat");
}

#[test]
fn status_errors_classify_transience() {
	let throttled =
		Error::Status { status: reqwest::StatusCode::TOO_MANY_REQUESTS, body: String::new() };
	let unavailable =
		Error::Status { status: reqwest::StatusCode::BAD_GATEWAY, body: String::new() };
	let rejected = Error::Status { status: reqwest::StatusCode::BAD_REQUEST, body: String::new() };

	assert!(throttled.is_transient());
	assert!(unavailable.is_transient());
	assert!(!rejected.is_transient());
	assert!(!Error::InvalidResponse { message: "x".to_string() }.is_transient());
}

#[tokio::test]
async fn completion_sends_generation_parameters() {
	let upstream = MockUpstream::start([(
		"/chat/completions",
		CannedResponse::ok(json!({
			"model": "mock-gpt",
			"choices": [
				{ "message": { "content": "Start with Python." }, "finish_reason": "stop" }
			],
			"usage": { "prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14 }
		})),
	)])
	.await
	.expect("Failed to start upstream.");
	let cfg = mentor_testkit::test_config(&upstream.base_url()).expect("Failed to build config.");
	let completion = chat::complete(&cfg.providers.llm, &completion_request())
		.await
		.expect("Completion failed.");

	assert_eq!(completion.content.as_deref(), Some("Start with Python."));
	assert_eq!(completion.usage.map(|usage| usage.total_tokens), Some(14));

	let recorded = upstream.requests_to("/chat/completions");
	let body = &recorded[0].body;

	assert_eq!(body["model"], "mock-gpt");
	assert_eq!(body["max_tokens"], 100);
	assert!(body.get("stream").is_none());
	assert!((body["top_p"].as_f64().expect("Missing top_p.") - 0.95).abs() < 1e-6);
	assert_eq!(
		recorded[0].headers.get("authorization").map(String::as_str),
		Some("Bearer llm-key")
	);
}

#[tokio::test]
async fn completion_surfaces_upstream_status() {
	let upstream = MockUpstream::start([(
		"/chat/completions",
		CannedResponse::Json { status: 503, body: json!({ "error": "overloaded" }) },
	)])
	.await
	.expect("Failed to start upstream.");
	let cfg = mentor_testkit::test_config(&upstream.base_url()).expect("Failed to build config.");
	let err = chat::complete(&cfg.providers.llm, &completion_request())
		.await
		.expect_err("Expected status error.");

	assert!(matches!(err, Error::Status { .. }));
	assert!(err.is_transient());
}

#[tokio::test]
async fn stream_forwards_deltas_until_done() {
	let upstream = MockUpstream::start([(
		"/chat/completions",
		CannedResponse::Sse(vec![
			r#"{"choices":[{"delta":{"role":"assistant"}}]}"#.to_string(),
			r#"{"choices":[{"delta":{"content":"Learn "}}]}"#.to_string(),
			r#"{"choices":[{"delta":{"content":"Python."}}]}"#.to_string(),
			"[DONE]".to_string(),
		]),
	)])
	.await
	.expect("Failed to start upstream.");
	let cfg = mentor_testkit::test_config(&upstream.base_url()).expect("Failed to build config.");
	let (tx, mut rx) = mpsc::channel(8);

	chat::stream(&cfg.providers.llm, &completion_request(), tx).await.expect("Stream failed.");

	let mut deltas = Vec::new();

	while let Some(delta) = rx.recv().await {
		deltas.push(delta);
	}

	assert_eq!(deltas, vec!["Learn ".to_string(), "Python.".to_string()]);
	assert_eq!(upstream.requests_to("/chat/completions")[0].body["stream"], true);
}

#[tokio::test]
async fn stream_gives_up_on_a_silent_upstream() {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind listener.");
	let addr = listener.local_addr().expect("Missing local address.");
	let silent = tokio::spawn(async move {
		let (_socket, _) = listener.accept().await.expect("Failed to accept connection.");

		tokio::time::sleep(Duration::from_secs(30)).await;
	});
	let mut cfg =
		mentor_testkit::test_config(&format!("http://{addr}")).expect("Failed to build config.");

	cfg.providers.llm.timeout_ms = 200;

	let (tx, _rx) = mpsc::channel(8);
	let outcome = tokio::time::timeout(
		Duration::from_secs(5),
		chat::stream(&cfg.providers.llm, &completion_request(), tx),
	)
	.await
	.expect("Stream must not wait past its event timeout.");

	silent.abort();

	let err = outcome.expect_err("A silent upstream must fail the stream.");

	assert!(matches!(err, Error::EventSource { .. }));
	assert!(err.is_transient());
}

#[tokio::test]
async fn embeddings_return_one_vector_per_input() {
	let upstream = MockUpstream::start([(
		"/embeddings",
		CannedResponse::ok(json!({
			"data": [
				{ "index": 1, "embedding": [0.0, 1.0, 0.0] },
				{ "index": 0, "embedding": [1.0, 0.0, 0.0] }
			]
		})),
	)])
	.await
	.expect("Failed to start upstream.");
	let cfg = mentor_testkit::test_config(&upstream.base_url()).expect("Failed to build config.");
	let texts = vec!["first".to_string(), "second".to_string()];
	let vectors = embedding::embed(&cfg.providers.embedding, &texts).await.expect("Embed failed.");

	assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
	assert_eq!(upstream.requests_to("/embeddings")[0].body["input"], json!(["first", "second"]));
}

#[tokio::test]
async fn hybrid_search_posts_vector_and_semantic_options() {
	let upstream = MockUpstream::start([(
		"/indexes/career-knowledge/docs/search",
		CannedResponse::ok(json!({
			"value": [{ "@search.score": 0.02, "@search.rerankerScore": 3.6, "id": "doc-1" }]
		})),
	)])
	.await
	.expect("Failed to start upstream.");
	let cfg = mentor_testkit::test_config(&upstream.base_url()).expect("Failed to build config.");
	let request = search::SearchRequest {
		search: "ai engineer".to_string(),
		filter: search::build_filter(&["career_guide"], &[]),
		top: 5,
		vector: Some(vec![0.1, 0.2, 0.3]),
		..Default::default()
	};
	let response = search::search(&cfg.providers.search, &request).await.expect("Search failed.");

	assert_eq!(response.hits.len(), 1);
	assert_eq!(response.hits[0].reranker_score, Some(3.6));

	let recorded = &upstream.requests_to("/indexes/career-knowledge/docs/search")[0];

	assert_eq!(recorded.query.as_deref(), Some("api-version=2023-11-01"));
	assert_eq!(recorded.headers.get("api-key").map(String::as_str), Some("search-key"));
	assert_eq!(recorded.body["queryType"], "semantic");
	assert_eq!(recorded.body["semanticConfiguration"], "career-semantic-config");
	assert_eq!(recorded.body["captions"], "extractive");
	assert_eq!(recorded.body["vectorQueries"][0]["k"], 5);
	assert_eq!(recorded.body["vectorQueries"][0]["fields"], "content_vector");
	assert_eq!(recorded.body["filter"], "(document_type eq 'career_guide')");
}

#[tokio::test]
async fn uploads_tag_each_document_with_the_upload_action() {
	let upstream = MockUpstream::start([(
		"/indexes/career-knowledge/docs/index",
		CannedResponse::ok(json!({
			"value": [
				{ "key": "doc-1", "status": true, "statusCode": 201 },
				{ "key": "doc-2", "status": false, "errorMessage": "bad vector", "statusCode": 400 }
			]
		})),
	)])
	.await
	.expect("Failed to start upstream.");
	let cfg = mentor_testkit::test_config(&upstream.base_url()).expect("Failed to build config.");
	let docs = vec![json!({ "id": "doc-1" }), json!({ "id": "doc-2" })];
	let outcomes =
		search::upload_documents(&cfg.providers.search, &docs).await.expect("Upload failed.");

	assert!(outcomes[0].status);
	assert_eq!(outcomes[1].error_message.as_deref(), Some("bad vector"));

	let body = &upstream.requests_to("/indexes/career-knowledge/docs/index")[0].body;

	assert_eq!(body["value"][1]["@search.action"], "upload");
	assert_eq!(body["value"][1]["id"], "doc-2");
}

#[tokio::test]
async fn index_creation_accepts_no_content() {
	let upstream =
		MockUpstream::start([("/indexes/career-knowledge", CannedResponse::Empty(204))])
			.await
			.expect("Failed to start upstream.");
	let cfg = mentor_testkit::test_config(&upstream.base_url()).expect("Failed to build config.");

	search::create_or_update_index(&cfg.providers.search, 3).await.expect("Index creation failed.");

	let recorded = &upstream.requests_to("/indexes/career-knowledge")[0];

	assert_eq!(recorded.method, "PUT");
	assert_eq!(recorded.body["fields"][11]["dimensions"], 3);
	assert_eq!(
		recorded.body["vectorSearch"]["algorithms"][0]["hnswParameters"]["metric"],
		"cosine"
	);
}
