//! Threshold alert rules evaluated against derived service metrics.

use std::{
	collections::{BTreeMap, VecDeque},
	sync::{Arc, Mutex},
};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use mentor_config::AlertRuleConfig;
use mentor_domain::time_serde;

use crate::{Error, Result, monitoring::Monitoring};

const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
	Info,
	Warning,
	Critical,
}
impl AlertSeverity {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Critical => "critical",
		}
	}

	fn parse(raw: &str) -> Option<Self> {
		match raw {
			"info" => Some(Self::Info),
			"warning" => Some(Self::Warning),
			"critical" => Some(Self::Critical),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
	Gt,
	Gte,
	Lt,
	Lte,
	Eq,
}
impl Comparison {
	pub fn breached(self, value: f64, threshold: f64) -> bool {
		match self {
			Self::Gt => value > threshold,
			Self::Gte => value >= threshold,
			Self::Lt => value < threshold,
			Self::Lte => value <= threshold,
			Self::Eq => value == threshold,
		}
	}

	fn parse(raw: &str) -> Option<Self> {
		match raw {
			"gt" => Some(Self::Gt),
			"gte" => Some(Self::Gte),
			"lt" => Some(Self::Lt),
			"lte" => Some(Self::Lte),
			"eq" => Some(Self::Eq),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
	Active,
	Resolved,
	Acknowledged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
	pub name: String,
	pub description: String,
	pub metric_name: String,
	pub threshold: f64,
	pub comparison: Comparison,
	pub severity: AlertSeverity,
	/// How long a breach must persist before a non-critical alert fires.
	pub duration_minutes: u32,
}
impl AlertRule {
	pub fn from_config(cfg: &AlertRuleConfig) -> Result<Self> {
		let comparison = Comparison::parse(&cfg.comparison).ok_or_else(|| Error::InvalidRequest {
			message: format!("Unknown alert comparison {:?}.", cfg.comparison),
		})?;
		let severity = AlertSeverity::parse(&cfg.severity).ok_or_else(|| Error::InvalidRequest {
			message: format!("Unknown alert severity {:?}.", cfg.severity),
		})?;

		Ok(Self {
			name: cfg.name.clone(),
			description: cfg.description.clone(),
			metric_name: cfg.metric_name.clone(),
			threshold: cfg.threshold,
			comparison,
			severity,
			duration_minutes: cfg.duration_minutes,
		})
	}

	pub fn defaults() -> Vec<Self> {
		vec![
			default_rule(
				"high_error_rate",
				"Error rate exceeds 5%",
				"error_rate_percentage",
				5.0,
				Comparison::Gt,
				AlertSeverity::Warning,
				2,
			),
			default_rule(
				"critical_error_rate",
				"Error rate exceeds 15%",
				"error_rate_percentage",
				15.0,
				Comparison::Gt,
				AlertSeverity::Critical,
				1,
			),
			default_rule(
				"high_response_time",
				"Average response time exceeds 5 seconds",
				"avg_response_time_ms",
				5_000.0,
				Comparison::Gt,
				AlertSeverity::Warning,
				3,
			),
			default_rule(
				"critical_response_time",
				"Average response time exceeds 10 seconds",
				"avg_response_time_ms",
				10_000.0,
				Comparison::Gt,
				AlertSeverity::Critical,
				1,
			),
			default_rule(
				"low_success_rate",
				"Success rate below 95%",
				"success_rate_percentage",
				95.0,
				Comparison::Lt,
				AlertSeverity::Warning,
				5,
			),
			default_rule(
				"ai_service_down",
				"Chat completion service unavailable",
				"ai_service_health",
				0.0,
				Comparison::Eq,
				AlertSeverity::Critical,
				1,
			),
			default_rule(
				"high_token_usage",
				"Token usage exceeds 100k per hour",
				"tokens_per_hour",
				100_000.0,
				Comparison::Gt,
				AlertSeverity::Info,
				10,
			),
		]
	}
}

fn default_rule(
	name: &str,
	description: &str,
	metric_name: &str,
	threshold: f64,
	comparison: Comparison,
	severity: AlertSeverity,
	duration_minutes: u32,
) -> AlertRule {
	AlertRule {
		name: name.to_string(),
		description: description.to_string(),
		metric_name: metric_name.to_string(),
		threshold,
		comparison,
		severity,
		duration_minutes,
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
	pub id: String,
	pub rule_name: String,
	pub metric_name: String,
	pub severity: AlertSeverity,
	pub threshold: f64,
	pub current_value: f64,
	pub status: AlertStatus,
	/// When the breach was first detected.
	#[serde(with = "time_serde")]
	pub detected_at: OffsetDateTime,
	#[serde(with = "time_serde::option")]
	pub resolved_at: Option<OffsetDateTime>,
	#[serde(with = "time_serde::option")]
	pub acknowledged_at: Option<OffsetDateTime>,
	pub acknowledged_by: Option<String>,
	pub message: String,
	pub notified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsSummary {
	pub rules_count: usize,
	pub active_alerts_count: usize,
	pub alerts_by_severity: BTreeMap<&'static str, usize>,
	pub recent_alerts_count: usize,
	pub notification_handlers_count: usize,
}

pub trait AlertNotifier
where
	Self: Send + Sync,
{
	fn notify(&self, alert: &Alert);
}

/// Writes fired alerts to the log.
pub struct LogNotifier;
impl AlertNotifier for LogNotifier {
	fn notify(&self, alert: &Alert) {
		tracing::warn!(
			alert_id = %alert.id,
			rule_name = %alert.rule_name,
			severity = alert.severity.as_str(),
			current_value = alert.current_value,
			threshold = alert.threshold,
			message = %alert.message,
			"Alert notification."
		);
	}
}

#[derive(Default)]
struct AlertState {
	rules: Vec<AlertRule>,
	active: BTreeMap<String, Alert>,
	history: VecDeque<Alert>,
}

pub struct AlertManager {
	state: Mutex<AlertState>,
	notifiers: Mutex<Vec<Arc<dyn AlertNotifier>>>,
}
impl AlertManager {
	pub fn new(rules: Vec<AlertRule>) -> Self {
		let notifiers: Vec<Arc<dyn AlertNotifier>> = vec![Arc::new(LogNotifier)];

		Self {
			state: Mutex::new(AlertState { rules, ..Default::default() }),
			notifiers: Mutex::new(notifiers),
		}
	}

	/// Built-in rules followed by any configured custom rules.
	pub fn from_config(cfg: &mentor_config::Monitoring) -> Result<Self> {
		let mut rules = AlertRule::defaults();

		for rule in &cfg.rules {
			rules.push(AlertRule::from_config(rule)?);
		}

		Ok(Self::new(rules))
	}

	pub fn add_rule(&self, rule: AlertRule) {
		tracing::info!(
			rule_name = %rule.name,
			metric = %rule.metric_name,
			threshold = rule.threshold,
			"Alert rule added."
		);

		self.lock().rules.push(rule);
	}

	pub fn remove_rule(&self, name: &str) -> bool {
		let mut state = self.lock();
		let before = state.rules.len();

		state.rules.retain(|rule| rule.name != name);

		state.rules.len() != before
	}

	pub fn add_notifier(&self, notifier: Arc<dyn AlertNotifier>) {
		self.notifiers.lock().unwrap_or_else(|err| err.into_inner()).push(notifier);
	}

	pub fn rules(&self) -> Vec<AlertRule> {
		self.lock().rules.clone()
	}

	pub fn active_alerts(&self) -> Vec<Alert> {
		self.lock().active.values().cloned().collect()
	}

	/// The most recent `limit` resolved alerts, oldest first.
	pub fn history(&self, limit: usize) -> Vec<Alert> {
		let state = self.lock();
		let skip = state.history.len().saturating_sub(limit);

		state.history.iter().skip(skip).cloned().collect()
	}

	pub fn acknowledge(&self, alert_id: &str, acknowledged_by: &str) -> bool {
		let mut state = self.lock();
		let Some(alert) = state.active.get_mut(alert_id) else {
			return false;
		};

		alert.status = AlertStatus::Acknowledged;
		alert.acknowledged_at = Some(OffsetDateTime::now_utc());
		alert.acknowledged_by = Some(acknowledged_by.to_string());

		tracing::info!(alert_id, acknowledged_by, "Alert acknowledged.");

		true
	}

	pub fn summary(&self) -> AlertsSummary {
		let state = self.lock();
		let mut alerts_by_severity = BTreeMap::from([("info", 0), ("warning", 0), ("critical", 0)]);

		for alert in state.active.values() {
			*alerts_by_severity.entry(alert.severity.as_str()).or_default() += 1;
		}

		AlertsSummary {
			rules_count: state.rules.len(),
			active_alerts_count: state.active.len(),
			alerts_by_severity,
			recent_alerts_count: state.history.len(),
			notification_handlers_count: self
				.notifiers
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.len(),
		}
	}

	/// Evaluates every rule against the current derived metrics and fires due alerts.
	pub fn check(&self, monitoring: &Monitoring) -> Vec<Alert> {
		let fired = self.evaluate(&monitoring.derived_metrics(), OffsetDateTime::now_utc());

		for alert in &fired {
			self.fire(alert, monitoring);
		}

		fired
	}

	/// Updates alert state for one evaluation pass and returns the alerts that became due.
	pub fn evaluate(&self, metrics: &BTreeMap<String, f64>, now: OffsetDateTime) -> Vec<Alert> {
		let mut state = self.lock();
		let mut fired = Vec::new();
		let rules = state.rules.clone();

		for rule in &rules {
			let Some(&value) = metrics.get(&rule.metric_name) else {
				continue;
			};
			let alert_id = format!("{}_{}", rule.name, rule.metric_name);
			let breached = rule.comparison.breached(value, rule.threshold);

			match (breached, state.active.get_mut(&alert_id)) {
				(true, None) => {
					let mut alert = Alert {
						id: alert_id.clone(),
						rule_name: rule.name.clone(),
						metric_name: rule.metric_name.clone(),
						severity: rule.severity,
						threshold: rule.threshold,
						current_value: value,
						status: AlertStatus::Active,
						detected_at: now,
						resolved_at: None,
						acknowledged_at: None,
						acknowledged_by: None,
						message: format!(
							"{}. Current value: {value}, Threshold: {}",
							rule.description, rule.threshold
						),
						notified: false,
					};

					if rule.severity == AlertSeverity::Critical {
						alert.notified = true;

						fired.push(alert.clone());
					} else {
						tracing::info!(
							rule_name = %rule.name,
							current_value = value,
							threshold = rule.threshold,
							"Alert condition detected; waiting for the rule duration."
						);
					}

					state.active.insert(alert_id, alert);
				},
				(true, Some(alert)) => {
					alert.current_value = value;

					let due =
						now - alert.detected_at >= Duration::minutes(rule.duration_minutes.into());

					if due && alert.status == AlertStatus::Active && !alert.notified {
						alert.notified = true;

						fired.push(alert.clone());
					}
				},
				(false, Some(_)) => {
					if let Some(mut alert) = state.active.remove(&alert_id) {
						alert.status = AlertStatus::Resolved;
						alert.resolved_at = Some(now);

						tracing::info!(
							alert_id = %alert.id,
							duration_minutes = (now - alert.detected_at).whole_minutes(),
							"Alert resolved."
						);

						state.history.push_back(alert);

						while state.history.len() > MAX_HISTORY {
							state.history.pop_front();
						}
					}
				},
				(false, None) => {},
			}
		}

		fired
	}

	fn fire(&self, alert: &Alert, monitoring: &Monitoring) {
		tracing::warn!(
			alert_id = %alert.id,
			rule_name = %alert.rule_name,
			severity = alert.severity.as_str(),
			current_value = alert.current_value,
			threshold = alert.threshold,
			"Alert fired."
		);

		let notifiers = self.notifiers.lock().unwrap_or_else(|err| err.into_inner()).clone();

		for notifier in notifiers {
			notifier.notify(alert);
		}

		monitoring.record_business_metric(
			"alerts_fired_total",
			1.0,
			&[("rule_name", alert.rule_name.as_str()), ("severity", alert.severity.as_str())],
		);
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, AlertState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// Periodically evaluates alert rules until the task is dropped.
///
/// A panicking check is logged and retried after `error_backoff`.
pub async fn run_alert_loop(
	alerts: Arc<AlertManager>,
	monitoring: Arc<Monitoring>,
	check_interval: std::time::Duration,
	error_backoff: std::time::Duration,
) {
	tracing::info!(rules = alerts.rules().len(), "Alert monitoring started.");

	loop {
		let task_alerts = alerts.clone();
		let task_monitoring = monitoring.clone();
		let pause = match tokio::spawn(async move { task_alerts.check(&task_monitoring) }).await {
			Ok(fired) => {
				if !fired.is_empty() {
					tracing::debug!(fired = fired.len(), "Alert check completed.");
				}

				check_interval
			},
			Err(err) => {
				tracing::error!(error = %err, "Alert check failed.");

				error_backoff
			},
		};

		tokio::time::sleep(pause).await;
	}
}
