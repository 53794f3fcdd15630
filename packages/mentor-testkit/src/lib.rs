mod error;

pub use error::{Error, Result};

use std::{
	collections::HashMap,
	net::SocketAddr,
	sync::{Arc, Mutex},
};

use axum::{
	Router,
	body::{self, Body},
	extract::{Request, State},
	http::{StatusCode, header},
	response::{IntoResponse, Response},
};
use serde_json::Value;
use tokio::{net::TcpListener, task::JoinHandle};

use mentor_config::Config;

const TEST_CONFIG_TEMPLATE: &str = r#"
[service]
http_bind = "127.0.0.1:0"
log_level = "debug"

[providers.llm]
provider_id = "mock"
api_base    = "{API_BASE}"
api_key     = "llm-key"
path        = "/chat/completions"
model       = "mock-gpt"
timeout_ms  = 5000

[providers.embedding]
provider_id = "mock"
api_base    = "{API_BASE}"
api_key     = "embedding-key"
path        = "/embeddings"
model       = "mock-embedding"
dimensions  = 3
timeout_ms  = 5000

[providers.search]
provider_id = "mock"
api_base    = "{API_BASE}"
api_key     = "search-key"
index_name  = "career-knowledge"
timeout_ms  = 5000

[chat.retry]
max_attempts   = 3
min_backoff_ms = 1
max_backoff_ms = 5

[monitoring]
alerts_enabled = false
"#;

/// A validated config whose providers all point at `api_base`, with millisecond retry backoff.
pub fn test_config(api_base: &str) -> Result<Config> {
	let raw = TEST_CONFIG_TEMPLATE.replace("{API_BASE}", api_base);
	let cfg: Config = toml::from_str(&raw)?;

	mentor_config::validate(&cfg)?;

	Ok(cfg)
}

#[derive(Debug, Clone)]
pub enum CannedResponse {
	Json { status: u16, body: Value },
	/// Each entry is sent as one `data:` event.
	Sse(Vec<String>),
	Empty(u16),
}
impl CannedResponse {
	pub fn ok(body: Value) -> Self {
		Self::Json { status: 200, body }
	}
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub query: Option<String>,
	pub headers: HashMap<String, String>,
	pub body: Value,
}

#[derive(Clone, Default)]
struct MockState {
	routes: Arc<HashMap<String, CannedResponse>>,
	recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// An HTTP server on an ephemeral port that replays canned responses by path.
///
/// Unknown paths answer 404. The server stops when the value is dropped.
pub struct MockUpstream {
	addr: SocketAddr,
	state: MockState,
	handle: JoinHandle<()>,
}
impl MockUpstream {
	pub async fn start<I, P>(routes: I) -> Result<Self>
	where
		I: IntoIterator<Item = (P, CannedResponse)>,
		P: Into<String>,
	{
		let routes = routes.into_iter().map(|(path, res)| (path.into(), res)).collect();
		let state = MockState { routes: Arc::new(routes), recorded: Default::default() };
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let app = Router::new().fallback(replay).with_state(state.clone());
		let handle = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, app).await {
				eprintln!("Mock upstream stopped: {err}.");
			}
		});

		Ok(Self { addr, state, handle })
	}

	pub fn base_url(&self) -> String {
		format!("http://{}", self.addr)
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.state.recorded.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
		self.requests().into_iter().filter(|req| req.path == path).collect()
	}
}
impl Drop for MockUpstream {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

async fn replay(State(state): State<MockState>, req: Request) -> Response {
	let (parts, raw_body) = req.into_parts();
	let bytes = match body::to_bytes(raw_body, usize::MAX).await {
		Ok(bytes) => bytes,
		Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
	};
	let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
	let headers = parts
		.headers
		.iter()
		.filter_map(|(name, value)| {
			value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
		})
		.collect();
	let path = parts.uri.path().to_string();

	state.recorded.lock().unwrap_or_else(|err| err.into_inner()).push(RecordedRequest {
		method: parts.method.to_string(),
		path: path.clone(),
		query: parts.uri.query().map(str::to_string),
		headers,
		body,
	});

	match state.routes.get(&path) {
		Some(CannedResponse::Json { status, body }) => {
			let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

			(status, axum::Json(body.clone())).into_response()
		},
		Some(CannedResponse::Sse(events)) => {
			let payload = events.iter().map(|data| format!("data: {data}\n\n")).collect::<String>();

			([(header::CONTENT_TYPE, "text/event-stream")], Body::from(payload)).into_response()
		},
		Some(CannedResponse::Empty(status)) =>
			StatusCode::from_u16(*status).unwrap_or(StatusCode::NO_CONTENT).into_response(),
		None => StatusCode::NOT_FOUND.into_response(),
	}
}
