use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
	System,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
			Self::System => "system",
		}
	}

	/// Capitalized label used in prompt transcripts.
	pub fn label(self) -> &'static str {
		match self {
			Self::User => "User",
			Self::Assistant => "Assistant",
			Self::System => "System",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub id: String,
	pub role: Role,
	pub content: String,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
}
impl ChatMessage {
	pub fn new(role: Role, content: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			role,
			content: content.into(),
			timestamp: OffsetDateTime::now_utc(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
	pub conversation_id: String,
	pub total_messages: usize,
	pub user_messages: usize,
	pub assistant_messages: usize,
	#[serde(default, with = "crate::time_serde::option")]
	pub first_message_time: Option<OffsetDateTime>,
	#[serde(default, with = "crate::time_serde::option")]
	pub last_message_time: Option<OffsetDateTime>,
}
impl ConversationSummary {
	pub fn from_history(conversation_id: impl Into<String>, history: &[ChatMessage]) -> Self {
		let count = |role| history.iter().filter(|msg| msg.role == role).count();

		Self {
			conversation_id: conversation_id.into(),
			total_messages: history.len(),
			user_messages: count(Role::User),
			assistant_messages: count(Role::Assistant),
			first_message_time: history.first().map(|msg| msg.timestamp),
			last_message_time: history.last().map(|msg| msg.timestamp),
		}
	}
}

/// Drops the oldest messages so at most `max_history` remain.
pub fn trim_history(history: &mut Vec<ChatMessage>, max_history: usize) {
	if history.len() > max_history {
		let excess = history.len() - max_history;

		history.drain(..excess);
	}
}

/// The trailing `n` messages of `history`.
pub fn recent(history: &[ChatMessage], n: usize) -> &[ChatMessage] {
	&history[history.len().saturating_sub(n)..]
}
