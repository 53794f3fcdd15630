use std::{
	collections::{BTreeMap, VecDeque},
	sync::Mutex,
	time::Instant,
};

use serde::Serialize;
use time::OffsetDateTime;

use mentor_domain::time_serde;
use mentor_providers::chat::TokenUsage;

pub const CHAT_REQUESTS_TOTAL: &str = "chat_requests_total";
pub const CHAT_RESPONSE_TIME_MS: &str = "chat_response_time_ms";
pub const AI_TOKENS_USED_TOTAL: &str = "ai_tokens_used_total";
pub const ERRORS_TOTAL: &str = "errors_total";
pub const SEARCH_QUERIES_TOTAL: &str = "search_queries_total";
pub const SEARCH_DURATION_MS: &str = "search_duration_ms";
pub const SEARCH_RESULTS_COUNT: &str = "search_results_count";
pub const AI_SERVICE_HEALTH: &str = "ai_service_health";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
	pub count: usize,
	pub avg: f64,
	pub min: f64,
	pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
	pub counters: BTreeMap<String, f64>,
	pub gauges: BTreeMap<String, f64>,
	pub histogram_summaries: BTreeMap<String, HistogramSummary>,
	pub uptime_seconds: f64,
}
impl MetricsSummary {
	/// Sums every counter series of `name`, across all tag sets.
	pub fn counter_total(&self, name: &str) -> f64 {
		self.counters.iter().filter(|(key, _)| series_of(key, name)).map(|(_, v)| v).sum()
	}

	/// Sample-weighted mean across every histogram series of `name`.
	pub fn histogram_mean(&self, name: &str) -> Option<f64> {
		let (count, total) = self
			.histogram_summaries
			.iter()
			.filter(|(key, _)| series_of(key, name))
			.fold((0_usize, 0.0_f64), |(count, total), (_, hist)| {
				(count + hist.count, total + hist.avg * hist.count as f64)
			});

		if count == 0 { None } else { Some(total / count as f64) }
	}
}

#[derive(Debug, Default)]
struct MetricsState {
	counters: BTreeMap<String, f64>,
	histograms: BTreeMap<String, VecDeque<f64>>,
	gauges: BTreeMap<String, f64>,
}

/// In-memory counters, bounded histograms, and gauges.
pub struct MetricsCollector {
	state: Mutex<MetricsState>,
	window: usize,
	started: Instant,
}
impl MetricsCollector {
	pub fn new(window: usize) -> Self {
		Self {
			state: Mutex::new(MetricsState::default()),
			window: window.max(1),
			started: Instant::now(),
		}
	}

	pub fn increment_counter(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
		*self.lock().counters.entry(metric_key(name, tags)).or_default() += value;
	}

	pub fn record_histogram(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
		let mut state = self.lock();
		let samples = state.histograms.entry(metric_key(name, tags)).or_default();

		if samples.len() >= self.window {
			samples.pop_front();
		}

		samples.push_back(value);
	}

	pub fn set_gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
		self.lock().gauges.insert(metric_key(name, tags), value);
	}

	pub fn gauge(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
		self.lock().gauges.get(&metric_key(name, tags)).copied()
	}

	pub fn summary(&self) -> MetricsSummary {
		let state = self.lock();
		let histogram_summaries = state
			.histograms
			.iter()
			.map(|(key, samples)| (key.clone(), summarize(samples)))
			.collect();

		MetricsSummary {
			counters: state.counters.clone(),
			gauges: state.gauges.clone(),
			histogram_summaries,
			uptime_seconds: self.started.elapsed().as_secs_f64(),
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, MetricsState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricCounts {
	pub total_counters: usize,
	pub total_gauges: usize,
	pub total_histograms: usize,
	pub chat_requests: f64,
	pub errors: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
	#[serde(with = "time_serde")]
	pub timestamp: OffsetDateTime,
	pub monitoring_enabled: bool,
	pub service_status: &'static str,
	pub uptime_seconds: f64,
	pub uptime_hours: f64,
	pub metrics_summary: MetricCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
	#[serde(with = "time_serde")]
	pub timestamp: OffsetDateTime,
	pub service: String,
	pub version: String,
	pub metrics: MetricsSummary,
}

/// Request, search, error, and business metrics for the running service.
pub struct Monitoring {
	metrics: MetricsCollector,
	service: String,
	version: String,
}
impl Monitoring {
	pub fn new(service: impl Into<String>, version: impl Into<String>, window: usize) -> Self {
		Self {
			metrics: MetricsCollector::new(window),
			service: service.into(),
			version: version.into(),
		}
	}

	pub fn metrics(&self) -> &MetricsCollector {
		&self.metrics
	}

	pub fn record_chat_request(
		&self,
		endpoint: &str,
		status: &str,
		response_time_ms: f64,
		token_usage: Option<&TokenUsage>,
		user_id: Option<&str>,
	) {
		self.metrics.increment_counter(
			CHAT_REQUESTS_TOTAL,
			1.0,
			&[("endpoint", endpoint), ("status", status)],
		);
		self.metrics.record_histogram(
			CHAT_RESPONSE_TIME_MS,
			response_time_ms,
			&[("endpoint", endpoint)],
		);

		if let Some(usage) = token_usage {
			self.record_token_usage(usage);
		}

		let user_id_hash = user_id.map(user_hash);

		tracing::info!(
			endpoint,
			status,
			response_time_ms,
			total_tokens = token_usage.map(|usage| usage.total_tokens),
			user_id_hash = user_id_hash.as_deref(),
			"Chat request completed."
		);
	}

	pub fn record_token_usage(&self, usage: &TokenUsage) {
		for (kind, count) in [
			("prompt_tokens", usage.prompt_tokens),
			("completion_tokens", usage.completion_tokens),
			("total_tokens", usage.total_tokens),
		] {
			self.metrics.increment_counter(AI_TOKENS_USED_TOTAL, count as f64, &[("type", kind)]);
		}
	}

	pub fn record_search_query(&self, query: &str, results_count: usize, search_time_ms: f64) {
		let tags = [("type", "knowledge_search")];

		self.metrics.increment_counter(SEARCH_QUERIES_TOTAL, 1.0, &tags);
		self.metrics.record_histogram(SEARCH_DURATION_MS, search_time_ms, &tags);
		self.metrics.record_histogram(SEARCH_RESULTS_COUNT, results_count as f64, &tags);

		tracing::info!(
			query_length = query.chars().count(),
			results_count,
			search_time_ms,
			"Search query executed."
		);
	}

	pub fn record_error(&self, error_type: &str, endpoint: &str, message: &str) {
		self.metrics.increment_counter(
			ERRORS_TOTAL,
			1.0,
			&[("endpoint", endpoint), ("error_type", error_type)],
		);

		tracing::error!(
			error_type,
			endpoint,
			error_message = message,
			"Application error occurred."
		);
	}

	pub fn record_business_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
		self.metrics.set_gauge(name, value, tags);

		tracing::info!(metric_name = name, value, "Business metric recorded.");
	}

	pub fn health_metrics(&self) -> HealthMetrics {
		let summary = self.metrics.summary();

		HealthMetrics {
			timestamp: OffsetDateTime::now_utc(),
			monitoring_enabled: true,
			service_status: "healthy",
			uptime_seconds: summary.uptime_seconds,
			uptime_hours: summary.uptime_seconds / 3_600.0,
			metrics_summary: MetricCounts {
				total_counters: summary.counters.len(),
				total_gauges: summary.gauges.len(),
				total_histograms: summary.histogram_summaries.len(),
				chat_requests: summary.counter_total(CHAT_REQUESTS_TOTAL),
				errors: summary.counter_total(ERRORS_TOTAL),
			},
		}
	}

	pub fn export(&self) -> MetricsExport {
		MetricsExport {
			timestamp: OffsetDateTime::now_utc(),
			service: self.service.clone(),
			version: self.version.clone(),
			metrics: self.metrics.summary(),
		}
	}

	/// Values that alert rules are evaluated against, keyed by metric name.
	pub fn derived_metrics(&self) -> BTreeMap<String, f64> {
		let summary = self.metrics.summary();
		let total_requests = summary.counter_total(CHAT_REQUESTS_TOTAL);
		let total_errors = summary.counter_total(ERRORS_TOTAL);
		let error_rate =
			if total_requests > 0.0 { total_errors / total_requests * 100.0 } else { 0.0 };
		let total_tokens = summary
			.counters
			.iter()
			.filter(|(key, _)| {
				series_of(key, AI_TOKENS_USED_TOTAL) && key.contains("type=total_tokens")
			})
			.map(|(_, v)| v)
			.sum::<f64>();
		let hours = (summary.uptime_seconds / 3_600.0).max(1.0);
		let ai_health = self.metrics.gauge(AI_SERVICE_HEALTH, &[]).unwrap_or(1.0);

		BTreeMap::from([
			("error_rate_percentage".to_string(), error_rate),
			("success_rate_percentage".to_string(), 100.0 - error_rate),
			(
				"avg_response_time_ms".to_string(),
				summary.histogram_mean(CHAT_RESPONSE_TIME_MS).unwrap_or(0.0),
			),
			("ai_service_health".to_string(), ai_health),
			("tokens_per_hour".to_string(), total_tokens / hours),
			("total_requests".to_string(), total_requests),
			("total_errors".to_string(), total_errors),
		])
	}
}

/// `name` when untagged, else `name[k=v,...]` with tags sorted by key.
pub fn metric_key(name: &str, tags: &[(&str, &str)]) -> String {
	if tags.is_empty() {
		return name.to_string();
	}

	let mut sorted = tags.to_vec();

	sorted.sort_unstable();

	let joined = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");

	format!("{name}[{joined}]")
}

/// Short stable digest so user identifiers never reach the logs.
pub fn user_hash(user_id: &str) -> String {
	blake3::hash(user_id.as_bytes()).to_hex()[..8].to_string()
}

fn series_of(key: &str, name: &str) -> bool {
	key == name || key.strip_prefix(name).is_some_and(|rest| rest.starts_with('['))
}

fn summarize(samples: &VecDeque<f64>) -> HistogramSummary {
	if samples.is_empty() {
		return HistogramSummary { count: 0, avg: 0.0, min: 0.0, max: 0.0 };
	}

	let sum = samples.iter().sum::<f64>();
	let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
	let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

	HistogramSummary { count: samples.len(), avg: sum / samples.len() as f64, min, max }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keys_sort_tags() {
		assert_eq!(metric_key("m", &[]), "m");
		assert_eq!(
			metric_key("m", &[("status", "ok"), ("endpoint", "GET /")]),
			"m[endpoint=GET /,status=ok]"
		);
	}

	#[test]
	fn histograms_keep_a_bounded_window() {
		let metrics = MetricsCollector::new(3);

		for value in [1.0, 2.0, 3.0, 4.0] {
			metrics.record_histogram("latency", value, &[]);
		}

		let summary = metrics.summary();
		let hist = &summary.histogram_summaries["latency"];

		assert_eq!(hist.count, 3);
		assert_eq!(hist.min, 2.0);
		assert_eq!(hist.max, 4.0);
		assert!((hist.avg - 3.0).abs() < f64::EPSILON);
	}

	#[test]
	fn series_match_requires_a_tag_boundary() {
		assert!(series_of("errors_total", "errors_total"));
		assert!(series_of("errors_total[endpoint=x]", "errors_total"));
		assert!(!series_of("operation_errors_total[x=y]", "errors_total"));
		assert!(!series_of("errors_total_extra", "errors_total"));
	}

	#[test]
	fn derived_metrics_compute_error_rate() {
		let monitoring = Monitoring::new("career-mentor", "0.1.0", 100);

		for _ in 0..4 {
			monitoring.record_chat_request("POST /chat", "success", 100.0, None, Some("user-1"));
		}

		monitoring.record_error("server_error", "POST /chat", "boom");

		let derived = monitoring.derived_metrics();

		assert!((derived["error_rate_percentage"] - 25.0).abs() < 1e-9);
		assert!((derived["success_rate_percentage"] - 75.0).abs() < 1e-9);
		assert!((derived["avg_response_time_ms"] - 100.0).abs() < 1e-9);
		assert_eq!(derived["ai_service_health"], 1.0);
		assert_eq!(derived["total_requests"], 4.0);
	}

	#[test]
	fn user_hash_is_short_and_stable() {
		assert_eq!(user_hash("alice").len(), 8);
		assert_eq!(user_hash("alice"), user_hash("alice"));
		assert_ne!(user_hash("alice"), user_hash("bob"));
	}
}
