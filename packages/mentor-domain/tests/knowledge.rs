use std::str::FromStr;

use mentor_domain::knowledge::{
	self, DocumentType, IndexingState, IndexingStatus, KnowledgeDocument, SearchQuery,
};

fn sample_document() -> KnowledgeDocument {
	KnowledgeDocument::new(
		"Career Transition Guide",
		"Start with Python, then learn machine learning fundamentals.",
		"How to move into AI engineering.",
		DocumentType::CareerGuide,
	)
}

#[test]
fn document_type_round_trips_through_wire_names() {
	for kind in DocumentType::ALL {
		let json = serde_json::to_value(kind).expect("Failed to serialize document type.");

		assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
		assert_eq!(DocumentType::from_str(kind.as_str()).expect("Known type must parse."), kind);
	}

	assert!(DocumentType::from_str("blog_post").is_err());
}

#[test]
fn tags_are_trimmed_lowercased_and_deduplicated() {
	let tags = vec![" Python ".to_string(), "ML".to_string(), "python".to_string()];
	let normalized = knowledge::normalize_tags(&tags).expect("Tags must normalize.");

	assert_eq!(normalized, vec!["python".to_string(), "ml".to_string()]);
}

#[test]
fn empty_or_long_tags_are_rejected() {
	let blank = vec!["   ".to_string()];
	let long = vec!["x".repeat(51)];

	assert_eq!(knowledge::normalize_tags(&blank).expect_err("Expected error.").field, "tags");
	assert_eq!(knowledge::normalize_tags(&long).expect_err("Expected error.").field, "tags");
}

#[test]
fn document_length_limits_are_enforced() {
	let mut doc = sample_document();

	doc.title = "t".repeat(201);

	assert_eq!(doc.validate().expect_err("Expected error.").field, "title");

	let mut doc = sample_document();

	doc.summary = String::new();

	assert_eq!(doc.validate().expect_err("Expected error.").field, "summary");

	let mut doc = sample_document();

	doc.tags = vec!["AI".to_string(), "ai".to_string()];

	let doc = doc.normalized().expect("Document must normalize.");

	assert_eq!(doc.tags, vec!["ai".to_string()]);
}

#[test]
fn embedding_text_joins_title_summary_and_content() {
	let doc = sample_document();

	assert_eq!(
		doc.embedding_text(),
		"Career Transition Guide How to move into AI engineering. Start with Python, then learn machine learning fundamentals."
	);
}

#[test]
fn documents_deserialize_from_toml_with_defaults() {
	let raw = r#"
title = "Salary Guide"
content = "Entry level AI engineers earn competitive salaries."
summary = "Compensation overview."
document_type = "salary_data"
tags = ["salary"]

[metadata]
region = "US"
"#;
	let doc: KnowledgeDocument = toml::from_str(raw).expect("Document must parse.");

	assert_eq!(doc.document_type, DocumentType::SalaryData);
	assert!(!doc.id.is_empty());
	assert_eq!(doc.metadata.get("region").and_then(|v| v.as_str()), Some("US"));
	assert!(doc.source_url.is_none());
}

#[test]
fn search_query_defaults_and_bounds() {
	let query = SearchQuery::new("ai engineer skills");

	assert_eq!(query.max_results, 5);
	assert!((query.similarity_threshold - 0.7).abs() < f32::EPSILON);
	assert!(query.validate().is_ok());

	let mut query = SearchQuery::new("ai engineer skills");

	query.max_results = 21;

	assert_eq!(query.validate().expect_err("Expected error.").field, "max_results");

	let mut query = SearchQuery::new("ai engineer skills");

	query.similarity_threshold = 1.5;

	assert_eq!(query.validate().expect_err("Expected error.").field, "similarity_threshold");

	let mut query = SearchQuery::new("ai engineer skills");

	query.conversation_context = Some("c".repeat(2_001));

	assert_eq!(query.validate().expect_err("Expected error.").field, "conversation_context");
	assert_eq!(SearchQuery::new("").validate().expect_err("Expected error.").field, "query");
}

#[test]
fn snippets_are_cut_on_char_boundaries() {
	assert_eq!(knowledge::content_snippet("short"), "short");

	let exact = "a".repeat(500);

	assert_eq!(knowledge::content_snippet(&exact), exact);

	let long = "é".repeat(501);
	let snippet = knowledge::content_snippet(&long);

	assert!(snippet.ends_with("..."));
	assert_eq!(snippet.chars().count(), 503);
}

#[test]
fn hybrid_similarity_prefers_the_stronger_signal() {
	assert!((knowledge::hybrid_similarity(Some(3.2), Some(0.03)) - 0.8).abs() < 1e-6);
	assert!((knowledge::hybrid_similarity(None, Some(0.6)) - 0.6).abs() < 1e-6);
	assert_eq!(knowledge::hybrid_similarity(None, Some(1.7)), 1.0);
	assert_eq!(knowledge::hybrid_similarity(None, None), 0.0);
}

#[test]
fn indexing_status_tracks_failures() {
	let now = time::OffsetDateTime::now_utc();
	let mut status = IndexingStatus::start("op-1", now);

	status.documents_processed = 2;
	status.documents_successful = 1;
	status.record_failure("doc-2: embedding failed");
	status.finish(IndexingState::Completed, now);

	let json = serde_json::to_value(&status).expect("Failed to serialize status.");

	assert_eq!(json["status"], "completed");
	assert_eq!(json["documents_failed"], 1);
	assert!(json["end_time"].is_string());
}
