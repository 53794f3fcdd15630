use std::time::Instant;

use axum::{
	extract::{Request, State},
	http::HeaderValue,
	middleware::Next,
	response::Response,
};
use uuid::Uuid;

use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Records every request in the service metrics and tags the response with its id and latency.
pub async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
	let started = Instant::now();
	let endpoint = format!("{} {}", req.method(), req.uri().path());
	let request_id = Uuid::new_v4().to_string();
	let mut response = next.run(req).await;
	let response_time_ms = started.elapsed().as_secs_f64() * 1_000.0;
	let status = response.status();
	let outcome = if status.as_u16() < 400 { "success" } else { "error" };
	let monitoring = &state.service.monitoring;

	monitoring.record_chat_request(&endpoint, outcome, response_time_ms, None, None);

	if status.is_server_error() {
		monitoring.record_error(
			&format!("http_{}", status.as_u16()),
			&endpoint,
			status.canonical_reason().unwrap_or("Server error"),
		);
	}

	let headers = response.headers_mut();

	if let Ok(value) = HeaderValue::from_str(&request_id) {
		headers.insert(REQUEST_ID_HEADER, value);
	}
	if let Ok(value) = HeaderValue::from_str(&format!("{response_time_ms:.2}ms")) {
		headers.insert(RESPONSE_TIME_HEADER, value);
	}

	response
}
