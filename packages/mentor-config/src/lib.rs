mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	AlertRuleConfig, Cache, Chat, ChatRetry, Config, EmbeddingProviderConfig, LlmProviderConfig,
	Monitoring, Providers, Rag, SearchProviderConfig, Security, Service,
};

use std::{fs, path::Path};

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const AUTH_SCHEMES: [&str; 2] = ["bearer", "api_key"];
pub const ALERT_COMPARISONS: [&str; 5] = ["gt", "gte", "lt", "lte", "eq"];
pub const ALERT_SEVERITIES: [&str; 3] = ["info", "warning", "critical"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if !LOG_LEVELS.contains(&cfg.service.log_level.as_str()) {
		return Err(Error::Validation {
			message: "service.log_level must be one of trace, debug, info, warn, or error."
				.to_string(),
		});
	}

	for (label, key) in [
		("llm", &cfg.providers.llm.api_key),
		("embedding", &cfg.providers.embedding.api_key),
		("search", &cfg.providers.search.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, scheme) in [
		("llm", &cfg.providers.llm.auth_scheme),
		("embedding", &cfg.providers.embedding.auth_scheme),
	] {
		if !AUTH_SCHEMES.contains(&scheme.as_str()) {
			return Err(Error::Validation {
				message: format!("Provider {label} auth_scheme must be one of bearer or api_key."),
			});
		}
	}

	if cfg.providers.search.index_name.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.search.index_name must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if !cfg.chat.default_temperature.is_finite()
		|| !(0.0..=2.0).contains(&cfg.chat.default_temperature)
	{
		return Err(Error::Validation {
			message: "chat.default_temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if !(1..=4_000).contains(&cfg.chat.max_tokens) {
		return Err(Error::Validation {
			message: "chat.max_tokens must be in the range 1-4000.".to_string(),
		});
	}
	if cfg.chat.max_conversation_history == 0 {
		return Err(Error::Validation {
			message: "chat.max_conversation_history must be greater than zero.".to_string(),
		});
	}
	if cfg.chat.max_concurrent_requests == 0 {
		return Err(Error::Validation {
			message: "chat.max_concurrent_requests must be greater than zero.".to_string(),
		});
	}
	if cfg.chat.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "chat.retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.chat.retry.min_backoff_ms > cfg.chat.retry.max_backoff_ms {
		return Err(Error::Validation {
			message: "chat.retry.min_backoff_ms must not exceed chat.retry.max_backoff_ms."
				.to_string(),
		});
	}
	if !cfg.rag.min_confidence_score.is_finite()
		|| !(0.0..=1.0).contains(&cfg.rag.min_confidence_score)
	{
		return Err(Error::Validation {
			message: "rag.min_confidence_score must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !(1..=20).contains(&cfg.rag.max_search_results) {
		return Err(Error::Validation {
			message: "rag.max_search_results must be in the range 1-20.".to_string(),
		});
	}
	if cfg.cache.enabled && cfg.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "cache.max_entries must be greater than zero when enabled.".to_string(),
		});
	}
	if cfg.monitoring.check_interval_secs == 0 {
		return Err(Error::Validation {
			message: "monitoring.check_interval_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.monitoring.histogram_window == 0 {
		return Err(Error::Validation {
			message: "monitoring.histogram_window must be greater than zero.".to_string(),
		});
	}

	for rule in &cfg.monitoring.rules {
		if rule.name.trim().is_empty() || rule.metric_name.trim().is_empty() {
			return Err(Error::Validation {
				message: "monitoring.rules name and metric_name must be non-empty.".to_string(),
			});
		}
		if !rule.threshold.is_finite() {
			return Err(Error::Validation {
				message: format!(
					"monitoring.rules.{} threshold must be a finite number.",
					rule.name
				),
			});
		}
		if !ALERT_COMPARISONS.contains(&rule.comparison.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"monitoring.rules.{} comparison must be one of gt, gte, lt, lte, or eq.",
					rule.name
				),
			});
		}
		if !ALERT_SEVERITIES.contains(&rule.severity.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"monitoring.rules.{} severity must be one of info, warning, or critical.",
					rule.name
				),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let level = cfg.service.log_level.trim().to_ascii_lowercase();

	cfg.service.log_level = match level.as_str() {
		"warning" => "warn".to_string(),
		"critical" => "error".to_string(),
		_ => level,
	};

	for base in [
		&mut cfg.providers.llm.api_base,
		&mut cfg.providers.embedding.api_base,
		&mut cfg.providers.search.api_base,
	] {
		let trimmed = base.trim().trim_end_matches('/').to_string();

		*base = trimmed;
	}

	if cfg.providers.llm.api_version.as_deref().map(|v| v.trim().is_empty()).unwrap_or(false) {
		cfg.providers.llm.api_version = None;
	}
	if cfg.providers.embedding.api_version.as_deref().map(|v| v.trim().is_empty()).unwrap_or(false)
	{
		cfg.providers.embedding.api_version = None;
	}

	cfg.security.allowed_origins = cfg
		.security
		.allowed_origins
		.iter()
		.map(|origin| origin.trim().to_string())
		.filter(|origin| !origin.is_empty())
		.collect();
}
