use std::{collections::HashMap, sync::Mutex};

use mentor_domain::conversation::{self, ChatMessage, ConversationSummary, Role};

/// In-process conversation histories keyed by conversation ID.
#[derive(Debug, Default)]
pub struct ConversationStore {
	histories: Mutex<HashMap<String, Vec<ChatMessage>>>,
}
impl ConversationStore {
	pub fn history(&self, conversation_id: &str) -> Vec<ChatMessage> {
		self.lock().get(conversation_id).cloned().unwrap_or_default()
	}

	/// Appends a user/assistant pair and keeps the trailing `max_history` messages.
	pub fn record_turn(
		&self,
		conversation_id: &str,
		user_message: &str,
		assistant_message: &str,
		max_history: usize,
	) {
		let mut histories = self.lock();
		let history = histories.entry(conversation_id.to_string()).or_default();

		history.push(ChatMessage::new(Role::User, user_message));
		history.push(ChatMessage::new(Role::Assistant, assistant_message));

		conversation::trim_history(history, max_history);
	}

	pub fn clear(&self, conversation_id: &str) -> bool {
		self.lock().remove(conversation_id).is_some()
	}

	pub fn summary(&self, conversation_id: &str) -> Option<ConversationSummary> {
		self.lock()
			.get(conversation_id)
			.map(|history| ConversationSummary::from_history(conversation_id, history))
	}

	pub fn active_count(&self) -> usize {
		self.lock().len()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<ChatMessage>>> {
		self.histories.lock().unwrap_or_else(|err| err.into_inner())
	}
}
