use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ValidationError;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_CONTENT_CHARS: usize = 10_000;
pub const MAX_SUMMARY_CHARS: usize = 500;
pub const MAX_TAG_CHARS: usize = 50;
pub const MAX_QUERY_CHARS: usize = 1_000;
pub const MAX_CONTEXT_CHARS: usize = 2_000;
pub const MAX_SEARCH_RESULTS: u32 = 20;
pub const SNIPPET_CHARS: usize = 500;
/// Semantic reranker scores range 0-4; dividing brings them onto the vector score scale.
pub const RERANKER_SCALE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
	CareerGuide,
	TechnicalSkill,
	InterviewPrep,
	IndustryInsight,
	LearningPath,
	SalaryData,
	CompanyInfo,
}
impl DocumentType {
	pub const ALL: [Self; 7] = [
		Self::CareerGuide,
		Self::TechnicalSkill,
		Self::InterviewPrep,
		Self::IndustryInsight,
		Self::LearningPath,
		Self::SalaryData,
		Self::CompanyInfo,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::CareerGuide => "career_guide",
			Self::TechnicalSkill => "technical_skill",
			Self::InterviewPrep => "interview_prep",
			Self::IndustryInsight => "industry_insight",
			Self::LearningPath => "learning_path",
			Self::SalaryData => "salary_data",
			Self::CompanyInfo => "company_info",
		}
	}
}
impl fmt::Display for DocumentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for DocumentType {
	type Err = ValidationError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		let needle = raw.trim();

		Self::ALL.into_iter().find(|kind| kind.as_str() == needle).ok_or_else(|| {
			ValidationError::new("document_type", format!("Unknown document type {needle:?}."))
		})
	}
}

/// A knowledge base entry as authored and as uploaded to the search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
	#[serde(default = "new_document_id")]
	pub id: String,
	pub title: String,
	pub content: String,
	pub summary: String,
	pub document_type: DocumentType,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default)]
	pub source_url: Option<String>,
	#[serde(default)]
	pub author: Option<String>,
	#[serde(default = "OffsetDateTime::now_utc", with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(default = "OffsetDateTime::now_utc", with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}
impl KnowledgeDocument {
	pub fn new(
		title: impl Into<String>,
		content: impl Into<String>,
		summary: impl Into<String>,
		document_type: DocumentType,
	) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			id: new_document_id(),
			title: title.into(),
			content: content.into(),
			summary: summary.into(),
			document_type,
			tags: Vec::new(),
			metadata: Map::new(),
			source_url: None,
			author: None,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn validate(&self) -> Result<(), ValidationError> {
		check_length("title", &self.title, MAX_TITLE_CHARS)?;
		check_length("content", &self.content, MAX_CONTENT_CHARS)?;
		check_length("summary", &self.summary, MAX_SUMMARY_CHARS)?;
		normalize_tags(&self.tags)?;

		Ok(())
	}

	/// Validates the document and returns it with its tags normalized.
	pub fn normalized(mut self) -> Result<Self, ValidationError> {
		self.validate()?;

		self.tags = normalize_tags(&self.tags)?;

		Ok(self)
	}

	/// Text fed to the embedding model when the document is indexed.
	pub fn embedding_text(&self) -> String {
		format!("{} {} {}", self.title, self.summary, self.content)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
	pub query: String,
	#[serde(default)]
	pub conversation_context: Option<String>,
	#[serde(default)]
	pub document_types: Option<Vec<DocumentType>>,
	#[serde(default)]
	pub tags: Option<Vec<String>>,
	#[serde(default = "default_max_results")]
	pub max_results: u32,
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f32,
}
impl SearchQuery {
	pub fn new(query: impl Into<String>) -> Self {
		Self {
			query: query.into(),
			conversation_context: None,
			document_types: None,
			tags: None,
			max_results: default_max_results(),
			similarity_threshold: default_similarity_threshold(),
		}
	}

	pub fn validate(&self) -> Result<(), ValidationError> {
		check_length("query", &self.query, MAX_QUERY_CHARS)?;

		if let Some(context) = self.conversation_context.as_deref()
			&& context.chars().count() > MAX_CONTEXT_CHARS
		{
			return Err(ValidationError::new(
				"conversation_context",
				format!("Must be at most {MAX_CONTEXT_CHARS} characters."),
			));
		}
		if !(1..=MAX_SEARCH_RESULTS).contains(&self.max_results) {
			return Err(ValidationError::new(
				"max_results",
				format!("Must be in the range 1-{MAX_SEARCH_RESULTS}."),
			));
		}
		if !self.similarity_threshold.is_finite()
			|| !(0.0..=1.0).contains(&self.similarity_threshold)
		{
			return Err(ValidationError::new(
				"similarity_threshold",
				"Must be in the range 0.0-1.0.",
			));
		}

		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
	pub document_id: String,
	pub title: String,
	pub content_snippet: String,
	pub summary: String,
	pub document_type: DocumentType,
	pub similarity_score: f32,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default)]
	pub highlighted_snippets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseStats {
	pub total_documents: u64,
	pub documents_by_type: BTreeMap<DocumentType, u64>,
	pub total_tags: u64,
	pub average_document_length: f64,
	#[serde(with = "crate::time_serde")]
	pub last_updated: OffsetDateTime,
	pub search_performance: BTreeMap<String, f64>,
}
impl KnowledgeBaseStats {
	pub fn empty(now: OffsetDateTime) -> Self {
		Self {
			total_documents: 0,
			documents_by_type: BTreeMap::new(),
			total_tags: 0,
			average_document_length: 0.0,
			last_updated: now,
			search_performance: BTreeMap::new(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingState {
	Pending,
	Running,
	Completed,
	Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStatus {
	pub operation_id: String,
	pub status: IndexingState,
	pub documents_processed: u32,
	pub documents_successful: u32,
	pub documents_failed: u32,
	#[serde(with = "crate::time_serde")]
	pub start_time: OffsetDateTime,
	#[serde(default, with = "crate::time_serde::option")]
	pub end_time: Option<OffsetDateTime>,
	#[serde(default)]
	pub error_messages: Vec<String>,
}
impl IndexingStatus {
	pub fn start(operation_id: impl Into<String>, now: OffsetDateTime) -> Self {
		Self {
			operation_id: operation_id.into(),
			status: IndexingState::Running,
			documents_processed: 0,
			documents_successful: 0,
			documents_failed: 0,
			start_time: now,
			end_time: None,
			error_messages: Vec::new(),
		}
	}

	pub fn record_failure(&mut self, message: impl Into<String>) {
		self.documents_failed += 1;
		self.error_messages.push(message.into());
	}

	pub fn finish(&mut self, state: IndexingState, now: OffsetDateTime) {
		self.status = state;
		self.end_time = Some(now);
	}
}

/// Trims, lower-cases, and de-duplicates tags, keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, ValidationError> {
	let mut out: Vec<String> = Vec::with_capacity(tags.len());

	for tag in tags {
		let trimmed = tag.trim();

		if trimmed.is_empty() {
			return Err(ValidationError::new("tags", "Tags cannot be empty."));
		}
		if trimmed.chars().count() > MAX_TAG_CHARS {
			return Err(ValidationError::new(
				"tags",
				format!("Tags must be {MAX_TAG_CHARS} characters or less."),
			));
		}

		let lowered = trimmed.to_lowercase();

		if !out.contains(&lowered) {
			out.push(lowered);
		}
	}

	Ok(out)
}

pub fn content_snippet(content: &str) -> String {
	match content.char_indices().nth(SNIPPET_CHARS) {
		Some((cut, _)) => format!("{}...", &content[..cut]),
		None => content.to_string(),
	}
}

/// Returns at most `max_chars` leading characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((cut, _)) => &text[..cut],
		None => text,
	}
}

/// Blends the semantic reranker score with the hybrid search score, capped at 1.0.
pub fn hybrid_similarity(reranker_score: Option<f64>, search_score: Option<f64>) -> f32 {
	let semantic = reranker_score.unwrap_or(0.0) / RERANKER_SCALE;
	let vector = search_score.unwrap_or(0.0);
	let blended = semantic.max(vector);

	if !blended.is_finite() {
		return 0.0;
	}

	blended.clamp(0.0, 1.0) as f32
}

fn check_length(field: &'static str, value: &str, max_chars: usize) -> Result<(), ValidationError> {
	let count = value.chars().count();

	if count == 0 || value.trim().is_empty() {
		return Err(ValidationError::new(field, "Must be non-empty."));
	}
	if count > max_chars {
		return Err(ValidationError::new(field, format!("Must be at most {max_chars} characters.")));
	}

	Ok(())
}

fn new_document_id() -> String {
	Uuid::new_v4().to_string()
}

fn default_max_results() -> u32 {
	5
}

fn default_similarity_threshold() -> f32 {
	0.7
}
