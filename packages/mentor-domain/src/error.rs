/// A rejected field on an inbound request or knowledge document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
	pub field: &'static str,
	pub message: String,
}
impl ValidationError {
	pub fn new(field: &'static str, message: impl Into<String>) -> Self {
		Self { field, message: message.into() }
	}
}
