use std::{collections::BTreeMap, time::Instant};

use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{HeaderValue, Method, StatusCode},
	middleware,
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, KeepAliveStream, Sse},
	},
	routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	trace::TraceLayer,
};

use mentor_config::Config;
use mentor_domain::{
	ValidationError,
	conversation::ConversationSummary,
	knowledge::{self, DocumentType, KnowledgeBaseStats, SearchQuery},
	time_serde,
};
use mentor_service::{
	Alert, ChatRequest, ChatResponse, Error as ServiceError, HealthReport, RagResponse,
	alerts::AlertsSummary,
	monitoring::{HealthMetrics, MetricsExport},
};

use crate::{middleware::track_requests, state::AppState};

pub const MAX_SEARCH_LIMIT: u32 = 50;

const DEFAULT_SEARCH_LIMIT: u32 = 10;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.7;
const ALERT_HISTORY_LIMIT: usize = 20;

pub fn router(state: AppState) -> Router {
	let cors = cors_layer(&state.service.cfg);

	Router::new()
		.route("/", get(root))
		.nest("/api/v1", api_router())
		.layer(middleware::from_fn_with_state(state.clone(), track_requests))
		.layer(cors)
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

fn api_router() -> Router<AppState> {
	Router::new()
		.route("/health", get(health))
		.route("/health/live", get(liveness))
		.route("/health/ready", get(readiness))
		.route("/chat/chat", post(chat))
		.route("/chat/chat/rag", post(chat_rag))
		.route("/chat/chat/stream", post(chat_stream))
		.route("/chat/chat/rag/stream", post(chat_rag_stream))
		.route("/chat/search", post(search))
		.route("/chat/knowledge/stats", get(knowledge_stats))
		.route("/chat/conversations/active", get(active_conversations))
		.route("/chat/conversations/{conversation_id}/summary", get(conversation_summary))
		.route("/chat/conversations/{conversation_id}", axum::routing::delete(clear_conversation))
		.route("/monitoring/metrics", get(monitoring_metrics))
		.route("/monitoring/alerts", get(monitoring_alerts))
}

/// Any origin in debug mode, else the configured origins.
fn cors_layer(cfg: &Config) -> CorsLayer {
	if cfg.service.debug {
		return CorsLayer::permissive();
	}

	let origins = cfg
		.security
		.allowed_origins
		.iter()
		.filter_map(|origin| match HeaderValue::from_str(origin) {
			Ok(value) => Some(value),
			Err(err) => {
				tracing::warn!(error = %err, origin = %origin, "Skipping invalid CORS origin.");

				None
			},
		})
		.collect::<Vec<_>>();

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
		.allow_headers(Any)
}

#[derive(Debug, Serialize)]
struct WelcomeResponse {
	message: String,
	version: String,
	status: &'static str,
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
	status: &'static str,
	timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatParams {
	#[serde(default)]
	pub use_rag: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
	pub query: String,
	#[serde(default = "default_search_limit")]
	pub limit: u32,
	/// Comma-separated document types.
	#[serde(default)]
	pub document_types: Option<String>,
	#[serde(default = "default_min_confidence")]
	pub min_confidence: f32,
}

#[derive(Debug, Serialize)]
struct SearchResultBody {
	title: String,
	summary: String,
	document_type: DocumentType,
	confidence_score: f32,
	tags: Vec<String>,
	metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
	query: String,
	total_results: usize,
	max_results: u32,
	min_confidence: f32,
	document_types_filter: Option<Vec<DocumentType>>,
	results: Vec<SearchResultBody>,
	processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
struct KnowledgeStatsResponse {
	#[serde(flatten)]
	stats: KnowledgeBaseStats,
	index_health: &'static str,
	available_document_types: Vec<DocumentType>,
}

#[derive(Debug, Serialize)]
struct ClearConversationResponse {
	message: String,
	status: &'static str,
	cleared: bool,
}

#[derive(Debug, Serialize)]
struct ActiveConversationsResponse {
	active_conversations: usize,
	timestamp: String,
	status: &'static str,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
	health: HealthMetrics,
	derived: BTreeMap<String, f64>,
	export: MetricsExport,
}

#[derive(Debug, Serialize)]
struct AlertsResponse {
	summary: AlertsSummary,
	active: Vec<Alert>,
	history: Vec<Alert>,
}

async fn root(State(state): State<AppState>) -> Json<WelcomeResponse> {
	let service = &state.service.cfg.service;

	Json(WelcomeResponse {
		message: format!("Welcome to {}", service.app_name),
		version: service.app_version.clone(),
		status: "healthy",
	})
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
	Json(state.service.health().await)
}

async fn liveness() -> Json<ProbeResponse> {
	Json(ProbeResponse { status: "alive", timestamp: now_timestamp() })
}

async fn readiness(State(state): State<AppState>) -> Result<Json<ProbeResponse>, ApiError> {
	if !state.service.health_check().await {
		return Err(json_error(
			StatusCode::SERVICE_UNAVAILABLE,
			"service_unavailable",
			"Service not ready - dependencies unavailable.",
			None,
		));
	}

	Ok(Json(ProbeResponse { status: "ready", timestamp: now_timestamp() }))
}

async fn chat(
	State(state): State<AppState>,
	Query(params): Query<ChatParams>,
	Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
	let request = payload.normalized()?;

	tracing::info!(
		conversation_id = request.conversation_id.as_deref(),
		message_length = request.message.chars().count(),
		use_rag = params.use_rag,
		stream = request.stream,
		"Processing chat request."
	);

	let response = state.service.chat(request, params.use_rag).await?;

	Ok(Json(response))
}

async fn chat_rag(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Json<RagResponse>, ApiError> {
	let request = payload.normalized()?;
	let response = state.service.generate_rag_response(request).await?;

	Ok(Json(response))
}

async fn chat_stream(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
	let stream = state.service.generate_streaming_response(payload.normalized()?)?;

	Ok(sse(stream.map(|chunk| Event::default().json_data(chunk))))
}

async fn chat_rag_stream(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
	let stream = state.service.generate_streaming_rag_response(payload.normalized()?)?;

	Ok(sse(stream.map(|event| Event::default().json_data(event))))
}

async fn search(
	State(state): State<AppState>,
	Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
	let started = Instant::now();

	if !(1..=MAX_SEARCH_LIMIT).contains(&params.limit) {
		return Err(invalid_field("limit", format!("Must be in the range 1-{MAX_SEARCH_LIMIT}.")));
	}
	if !params.min_confidence.is_finite() || !(0.0..=1.0).contains(&params.min_confidence) {
		return Err(invalid_field("min_confidence", "Must be in the range 0.0-1.0."));
	}

	let document_types = parse_document_types(params.document_types.as_deref())?;
	let query = SearchQuery {
		query: params.query.clone(),
		conversation_context: None,
		document_types: document_types.clone(),
		tags: None,
		max_results: params.limit.min(knowledge::MAX_SEARCH_RESULTS),
		similarity_threshold: params.min_confidence,
	};

	query.validate()?;

	let results = state.service.semantic_search(&query).await;

	Ok(Json(SearchResponse {
		query: params.query,
		total_results: results.len(),
		max_results: params.limit,
		min_confidence: params.min_confidence,
		document_types_filter: document_types,
		results: results
			.into_iter()
			.map(|result| SearchResultBody {
				title: result.title,
				summary: result.summary,
				document_type: result.document_type,
				confidence_score: result.similarity_score,
				tags: result.tags,
				metadata: result.metadata,
			})
			.collect(),
		processing_time_ms: started.elapsed().as_millis() as u64,
	}))
}

async fn knowledge_stats(State(state): State<AppState>) -> Json<KnowledgeStatsResponse> {
	let stats = state.service.knowledge_base_stats().await;
	let available_document_types = stats.documents_by_type.keys().copied().collect();

	Json(KnowledgeStatsResponse { stats, index_health: "healthy", available_document_types })
}

async fn conversation_summary(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
) -> Result<Json<ConversationSummary>, ApiError> {
	state.service.conversation_summary(&conversation_id).map(Json).ok_or_else(|| {
		json_error(StatusCode::NOT_FOUND, "not_found", "Conversation not found.", None)
	})
}

async fn clear_conversation(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
) -> Json<ClearConversationResponse> {
	let cleared = state.service.clear_conversation(&conversation_id);

	Json(ClearConversationResponse {
		message: format!("Conversation {conversation_id} cleared."),
		status: "success",
		cleared,
	})
}

async fn active_conversations(State(state): State<AppState>) -> Json<ActiveConversationsResponse> {
	Json(ActiveConversationsResponse {
		active_conversations: state.service.active_conversations(),
		timestamp: now_timestamp(),
		status: "success",
	})
}

async fn monitoring_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
	let monitoring = &state.service.monitoring;

	Json(MetricsResponse {
		health: monitoring.health_metrics(),
		derived: monitoring.derived_metrics(),
		export: monitoring.export(),
	})
}

async fn monitoring_alerts(State(state): State<AppState>) -> Json<AlertsResponse> {
	let alerts = &state.service.alerts;

	Json(AlertsResponse {
		summary: alerts.summary(),
		active: alerts.active_alerts(),
		history: alerts.history(ALERT_HISTORY_LIMIT),
	})
}

fn sse<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
	S: Stream<Item = Result<Event, axum::Error>> + Send + 'static,
{
	Sse::new(stream).keep_alive(KeepAlive::default())
}

fn parse_document_types(raw: Option<&str>) -> Result<Option<Vec<DocumentType>>, ApiError> {
	let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
		return Ok(None);
	};
	let kinds = raw
		.split(',')
		.map(|kind| kind.parse::<DocumentType>())
		.collect::<Result<Vec<_>, _>>()
		.map_err(|err| invalid_field("document_types", err.message))?;

	Ok(Some(kinds))
}

fn now_timestamp() -> String {
	time_serde::format(OffsetDateTime::now_utc())
}

fn default_search_limit() -> u32 {
	DEFAULT_SEARCH_LIMIT
}

fn default_min_confidence() -> f32 {
	DEFAULT_MIN_CONFIDENCE
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message, None),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "not_found", message, None),
			ServiceError::Provider { message } =>
				json_error(StatusCode::BAD_GATEWAY, "provider_error", message, None),
			ServiceError::Unavailable { message } =>
				json_error(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message, None),
			ServiceError::Internal { message } => {
				tracing::error!(error = %message, "Internal error while handling request.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"Internal server error.",
					None,
				)
			},
		}
	}
}
impl From<ValidationError> for ApiError {
	fn from(err: ValidationError) -> Self {
		invalid_field(err.field, err.message)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

fn invalid_field(field: &str, message: impl Into<String>) -> ApiError {
	json_error(StatusCode::BAD_REQUEST, "invalid_request", message, Some(vec![field.to_string()]))
}
