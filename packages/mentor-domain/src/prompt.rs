//! System prompts and message assembly for the chat-completion upstream.

use serde::Serialize;

use crate::{
	conversation::{self, ChatMessage, Role},
	knowledge::{self, SearchResult},
};

/// Trailing history messages replayed inside the RAG prompt.
pub const RAG_HISTORY_MESSAGES: usize = 6;
/// Trailing history messages folded into the retrieval context.
pub const RETRIEVAL_CONTEXT_MESSAGES: usize = 4;

pub const CAREER_MENTOR_PROMPT: &str = "You are an expert AI Career Mentor specializing in helping people transition into AI engineering roles. You have deep knowledge of:

- AI/ML engineering career paths and requirements
- Technical skills needed (Python, ML frameworks, cloud platforms)
- Educational pathways (courses, certifications, degrees)
- Portfolio project recommendations
- Interview preparation and common questions
- Industry trends and job market insights
- Salary expectations and negotiation
- Networking and professional development

Provide practical, actionable advice that's specific to the user's background and goals. Be encouraging but realistic about the challenges and timeline for career transitions. Focus on concrete next steps they can take.";

pub const RAG_SYSTEM_PROMPT: &str = "You are an expert AI Career Mentor with access to comprehensive career guidance knowledge.
Your role is to provide personalized, actionable advice for professionals transitioning to or advancing in AI engineering roles.

Guidelines:
- Use the provided knowledge sources to enhance your responses
- Always cite sources when using specific information
- Provide practical, actionable advice
- Be encouraging but realistic about career challenges
- Tailor advice to the user's background and goals
- If knowledge sources don't contain relevant information, rely on your general expertise";

const CITATION_INSTRUCTION: &str = "Please provide a comprehensive response using the knowledge sources where relevant, and cite them appropriately.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
	pub role: Role,
	pub content: String,
}
impl PromptMessage {
	pub fn new(role: Role, content: impl Into<String>) -> Self {
		Self { role, content: content.into() }
	}
}

/// Builds the single system message used when retrieval produced sources.
///
/// At most `max_sources` sources are listed, numbered from 1.
pub fn build_rag_prompt(
	query: &str,
	sources: &[SearchResult],
	history: &[ChatMessage],
	max_sources: usize,
) -> String {
	let mut prompt = String::from(RAG_SYSTEM_PROMPT);

	if !sources.is_empty() {
		prompt.push_str("\n\nRELEVANT KNOWLEDGE SOURCES:\n");

		for (i, source) in sources.iter().take(max_sources).enumerate() {
			prompt.push_str(&format!("\n[Source {}] {}\n", i + 1, source.title));
			prompt.push_str(&format!("Type: {}\n", source.document_type));
			prompt.push_str(&format!("Summary: {}\n", source.summary));
			prompt.push_str(&format!("Content: {}\n", source.content_snippet));

			if !source.tags.is_empty() {
				prompt.push_str(&format!("Tags: {}\n", source.tags.join(", ")));
			}

			prompt.push_str(&format!("Relevance Score: {:.2}\n", source.similarity_score));
		}
	}
	if !history.is_empty() {
		prompt.push_str("\n\nCONVERSATION CONTEXT:\n");

		for msg in conversation::recent(history, RAG_HISTORY_MESSAGES) {
			prompt.push_str(&format!("{}: {}\n", msg.role.label(), msg.content));
		}
	}

	prompt.push_str(&format!("\n\nUSER QUERY: {query}\n\n{CITATION_INSTRUCTION}"));

	prompt
}

/// System prompt, the trailing `window` history messages, then the user message.
pub fn build_chat_messages(
	system: &str,
	history: &[ChatMessage],
	message: &str,
	window: usize,
) -> Vec<PromptMessage> {
	let mut messages = Vec::with_capacity(window.min(history.len()) + 2);

	messages.push(PromptMessage::new(Role::System, system));
	messages.extend(
		conversation::recent(history, window)
			.iter()
			.map(|msg| PromptMessage::new(msg.role, msg.content.clone())),
	);
	messages.push(PromptMessage::new(Role::User, message));

	messages
}

/// Joins the trailing history into the retrieval context, `None` for a fresh conversation.
///
/// The result is cut to the longest context a search query accepts.
pub fn retrieval_context(history: &[ChatMessage]) -> Option<String> {
	if history.is_empty() {
		return None;
	}

	let joined = conversation::recent(history, RETRIEVAL_CONTEXT_MESSAGES)
		.iter()
		.map(|msg| msg.content.as_str())
		.collect::<Vec<_>>()
		.join(" ");

	Some(knowledge::truncate_chars(&joined, knowledge::MAX_CONTEXT_CHARS).to_string())
}
