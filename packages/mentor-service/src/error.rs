pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Service unavailable: {message}")]
	Unavailable { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl From<mentor_providers::Error> for Error {
	fn from(err: mentor_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
impl From<mentor_domain::ValidationError> for Error {
	fn from(err: mentor_domain::ValidationError) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Internal { message: err.to_string() }
	}
}
impl From<tokio::sync::AcquireError> for Error {
	fn from(_: tokio::sync::AcquireError) -> Self {
		Self::Unavailable { message: "Request limiter is closed.".to_string() }
	}
}
