use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub security: Security,
	pub providers: Providers,
	#[serde(default)]
	pub chat: Chat,
	#[serde(default)]
	pub rag: Rag,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub monitoring: Monitoring,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	#[serde(default = "default_app_name")]
	pub app_name: String,
	#[serde(default = "default_app_version")]
	pub app_version: String,
	/// Relaxes CORS to any origin.
	#[serde(default)]
	pub debug: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub allowed_origins: Vec<String>,
}
impl Default for Security {
	fn default() -> Self {
		Self {
			bind_localhost_only: false,
			allowed_origins: vec![
				"http://localhost".to_string(),
				"http://127.0.0.1".to_string(),
			],
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub llm: LlmProviderConfig,
	pub embedding: EmbeddingProviderConfig,
	pub search: SearchProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	/// One of "bearer" or "api_key".
	#[serde(default = "default_auth_scheme")]
	pub auth_scheme: String,
	pub path: String,
	/// Appended as the `api-version` query parameter when set.
	#[serde(default)]
	pub api_version: Option<String>,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_auth_scheme")]
	pub auth_scheme: String,
	pub path: String,
	#[serde(default)]
	pub api_version: Option<String>,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct SearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub index_name: String,
	#[serde(default = "default_search_api_version")]
	pub api_version: String,
	#[serde(default = "default_semantic_configuration")]
	pub semantic_configuration: String,
	#[serde(default = "default_vector_field")]
	pub vector_field: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Chat {
	/// Messages kept per conversation after trimming.
	pub max_conversation_history: u32,
	/// Trailing history messages sent with a plain chat completion.
	pub context_messages: u32,
	pub default_temperature: f32,
	pub max_tokens: u32,
	pub top_p: f32,
	pub frequency_penalty: f32,
	pub presence_penalty: f32,
	pub max_concurrent_requests: u32,
	pub retry: ChatRetry,
}
impl Default for Chat {
	fn default() -> Self {
		Self {
			max_conversation_history: 20,
			context_messages: 10,
			default_temperature: 0.7,
			max_tokens: 1_000,
			top_p: 0.95,
			frequency_penalty: 0.2,
			presence_penalty: 0.1,
			max_concurrent_requests: 10,
			retry: ChatRetry::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChatRetry {
	pub max_attempts: u32,
	pub min_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for ChatRetry {
	fn default() -> Self {
		Self { max_attempts: 3, min_backoff_ms: 4_000, max_backoff_ms: 10_000 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rag {
	pub enabled_by_default: bool,
	pub max_search_results: u32,
	pub min_confidence_score: f32,
}
impl Default for Rag {
	fn default() -> Self {
		Self { enabled_by_default: true, max_search_results: 5, min_confidence_score: 0.7 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub max_entries: u32,
	pub ttl_seconds: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self { enabled: true, max_entries: 500, ttl_seconds: 1_800 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Monitoring {
	pub alerts_enabled: bool,
	pub check_interval_secs: u64,
	pub error_backoff_secs: u64,
	pub histogram_window: u32,
	/// Appended to the built-in alert rules.
	pub rules: Vec<AlertRuleConfig>,
}
impl Default for Monitoring {
	fn default() -> Self {
		Self {
			alerts_enabled: true,
			check_interval_secs: 30,
			error_backoff_secs: 60,
			histogram_window: 1_000,
			rules: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertRuleConfig {
	pub name: String,
	pub description: String,
	pub metric_name: String,
	pub threshold: f64,
	/// One of gt, gte, lt, lte, or eq.
	pub comparison: String,
	/// One of info, warning, or critical.
	pub severity: String,
	#[serde(default = "default_duration_minutes")]
	pub duration_minutes: u32,
}

fn default_app_name() -> String {
	"AI Career Mentor Chatbot".to_string()
}

fn default_app_version() -> String {
	"0.1.0".to_string()
}

fn default_auth_scheme() -> String {
	"bearer".to_string()
}

fn default_search_api_version() -> String {
	"2023-11-01".to_string()
}

fn default_semantic_configuration() -> String {
	"career-semantic-config".to_string()
}

fn default_vector_field() -> String {
	"content_vector".to_string()
}

fn default_duration_minutes() -> u32 {
	5
}
