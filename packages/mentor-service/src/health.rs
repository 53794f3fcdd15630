use serde::Serialize;
use time::OffsetDateTime;

use mentor_domain::time_serde;
use mentor_providers::search::SearchRequest;

use crate::{MentorService, monitoring};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
	Healthy,
	Degraded,
	Unhealthy,
}
impl ServiceStatus {
	/// Both dependencies up is healthy; a reachable model alone keeps the service degraded.
	pub fn from_dependencies(llm: DependencyStatus, search: DependencyStatus) -> Self {
		match (llm, search) {
			(DependencyStatus::Connected, DependencyStatus::Connected) => Self::Healthy,
			(DependencyStatus::Connected, _) => Self::Degraded,
			_ => Self::Unhealthy,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
	Connected,
	Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
	pub status: ServiceStatus,
	#[serde(with = "time_serde")]
	pub timestamp: OffsetDateTime,
	pub version: String,
	pub llm_status: DependencyStatus,
	pub search_status: DependencyStatus,
	pub response_time_ms: Option<u64>,
	pub active_conversations: usize,
}

impl MentorService {
	pub async fn health(&self) -> HealthReport {
		let (llm_ok, search_ok) = tokio::join!(self.health_check(), self.search_reachable());
		let llm_status = if llm_ok { DependencyStatus::Connected } else { DependencyStatus::Error };
		let search_status =
			if search_ok { DependencyStatus::Connected } else { DependencyStatus::Error };

		self.monitoring.metrics().set_gauge(
			monitoring::AI_SERVICE_HEALTH,
			if llm_ok { 1.0 } else { 0.0 },
			&[],
		);

		let response_time_ms = self
			.monitoring
			.metrics()
			.summary()
			.histogram_mean(monitoring::CHAT_RESPONSE_TIME_MS)
			.map(|avg| avg.round() as u64);

		HealthReport {
			status: ServiceStatus::from_dependencies(llm_status, search_status),
			timestamp: OffsetDateTime::now_utc(),
			version: self.cfg.service.app_version.clone(),
			llm_status,
			search_status,
			response_time_ms,
			active_conversations: self.active_conversations(),
		}
	}

	async fn search_reachable(&self) -> bool {
		let request = SearchRequest {
			search: "*".to_string(),
			top: 0,
			count: true,
			..Default::default()
		};

		match self.providers.search.search(&self.cfg.providers.search, &request).await {
			Ok(_) => true,
			Err(err) => {
				tracing::warn!(error = %err, "Search index health check failed.");

				false
			},
		}
	}
}
