use std::{
	collections::HashMap,
	sync::Mutex,
	time::{Duration, Instant},
};

use crate::chat::ChatResponse;

struct CacheEntry {
	response: ChatResponse,
	inserted_at: Instant,
}

/// Bounded TTL cache of chat answers keyed by normalized message text.
pub struct ResponseCache {
	entries: Mutex<HashMap<String, CacheEntry>>,
	max_entries: usize,
	ttl: Duration,
}
impl ResponseCache {
	pub fn new(max_entries: usize, ttl: Duration) -> Self {
		Self { entries: Mutex::new(HashMap::new()), max_entries, ttl }
	}

	pub fn key(message: &str, use_rag: bool) -> String {
		let normalized = format!("{}_rag_{use_rag}", message.trim().to_lowercase());

		blake3::hash(normalized.as_bytes()).to_hex().to_string()
	}

	/// Returns a live entry; expired entries are dropped on read.
	pub fn get(&self, message: &str, use_rag: bool) -> Option<ChatResponse> {
		self.get_at(message, use_rag, Instant::now())
	}

	pub fn insert(&self, message: &str, use_rag: bool, response: ChatResponse) {
		self.insert_at(message, use_rag, response, Instant::now());
	}

	pub fn clear(&self) {
		self.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub(crate) fn get_at(
		&self,
		message: &str,
		use_rag: bool,
		now: Instant,
	) -> Option<ChatResponse> {
		let key = Self::key(message, use_rag);
		let mut entries = self.lock();
		let expired = now.saturating_duration_since(entries.get(&key)?.inserted_at) > self.ttl;

		if expired {
			entries.remove(&key);

			return None;
		}

		entries.get(&key).map(|entry| entry.response.clone())
	}

	pub(crate) fn insert_at(
		&self,
		message: &str,
		use_rag: bool,
		response: ChatResponse,
		now: Instant,
	) {
		if self.max_entries == 0 {
			return;
		}

		let key = Self::key(message, use_rag);
		let mut entries = self.lock();

		if !entries.contains_key(&key) && entries.len() >= self.max_entries {
			let oldest = entries
				.iter()
				.min_by_key(|(_, entry)| entry.inserted_at)
				.map(|(key, _)| key.clone());

			if let Some(oldest) = oldest {
				entries.remove(&oldest);
			}
		}

		entries.insert(key, CacheEntry { response, inserted_at: now });
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use mentor_domain::classify::ResponseType;

	fn response(message: &str) -> ChatResponse {
		ChatResponse {
			id: "resp".to_string(),
			message: message.to_string(),
			conversation_id: "conv".to_string(),
			ai_model: "mock".to_string(),
			processing_time_ms: 1,
			token_usage: None,
			confidence_score: Some(0.9),
			response_type: ResponseType::General,
			metadata: Default::default(),
		}
	}

	#[test]
	fn keys_ignore_case_and_surrounding_whitespace() {
		assert_eq!(ResponseCache::key("  Hello ", true), ResponseCache::key("hello", true));
		assert_ne!(ResponseCache::key("hello", true), ResponseCache::key("hello", false));
	}

	#[test]
	fn expired_entries_are_removed_on_read() {
		let cache = ResponseCache::new(10, Duration::from_secs(60));
		let start = Instant::now();

		cache.insert_at("hi", false, response("cached"), start);

		assert!(cache.get_at("hi", false, start + Duration::from_secs(30)).is_some());
		assert!(cache.get_at("hi", false, start + Duration::from_secs(61)).is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn full_cache_evicts_the_oldest_entry() {
		let cache = ResponseCache::new(2, Duration::from_secs(60));
		let start = Instant::now();

		cache.insert_at("first", false, response("1"), start);
		cache.insert_at("second", false, response("2"), start + Duration::from_secs(1));
		cache.insert_at("third", false, response("3"), start + Duration::from_secs(2));

		let later = start + Duration::from_secs(3);

		assert_eq!(cache.len(), 2);
		assert!(cache.get_at("first", false, later).is_none());
		assert!(cache.get_at("second", false, later).is_some());
		assert!(cache.get_at("third", false, later).is_some());
	}
}
