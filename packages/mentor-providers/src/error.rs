use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("Upstream returned {status}: {body}")]
	Status { status: StatusCode, body: String },
	#[error("Event stream failed: {message}")]
	EventSource { message: String },
}
impl Error {
	/// Whether a retry may succeed: transport failures, timeouts, 429, and 5xx.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Reqwest(err) => err.is_timeout() || err.is_connect() || err.is_request(),
			Self::Status { status, .. } =>
				*status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
			Self::EventSource { .. } => true,
			_ => false,
		}
	}
}
