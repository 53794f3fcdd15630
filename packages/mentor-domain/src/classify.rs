use serde::{Deserialize, Serialize};

/// Query terms that make retrieval worthwhile.
pub const CAREER_QUERY_KEYWORDS: [&str; 21] = [
	"career",
	"job",
	"skill",
	"interview",
	"salary",
	"learning",
	"transition",
	"ai engineer",
	"machine learning",
	"data science",
	"resume",
	"portfolio",
	"experience",
	"qualification",
	"certification",
	"bootcamp",
	"degree",
	"course",
	"training",
	"mentor",
	"advice",
];

/// Answer terms that mark a response as career advice.
pub const CAREER_RESPONSE_KEYWORDS: [&str; 11] = [
	"career",
	"job",
	"role",
	"engineer",
	"transition",
	"skills",
	"interview",
	"resume",
	"portfolio",
	"salary",
	"experience",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
	CareerAdvice,
	General,
	Clarification,
	RagEnhanced,
}
impl ResponseType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::CareerAdvice => "career_advice",
			Self::General => "general",
			Self::Clarification => "clarification",
			Self::RagEnhanced => "rag_enhanced",
		}
	}
}

pub fn should_use_rag(query: &str) -> bool {
	let lowered = query.to_lowercase();

	CAREER_QUERY_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

pub fn classify_response(text: &str) -> ResponseType {
	let lowered = text.to_lowercase();

	if CAREER_RESPONSE_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
		ResponseType::CareerAdvice
	} else if text.contains('?') || lowered.contains("clarify") {
		ResponseType::Clarification
	} else {
		ResponseType::General
	}
}
