pub mod chat;
pub mod embedding;
pub mod search;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client, Response,
	header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value};

/// Builds request headers for a provider.
///
/// `bearer` sends `Authorization: Bearer <key>`; `api_key` sends the key in an `api-key` header.
pub fn auth_headers(
	auth_scheme: &str,
	api_key: &str,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	match auth_scheme {
		"bearer" => {
			headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
		},
		"api_key" => {
			headers.insert(HeaderName::from_static("api-key"), HeaderValue::from_str(api_key)?);
		},
		other => {
			return Err(Error::InvalidConfig {
				message: format!("Unsupported auth scheme {other:?}."),
			});
		},
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Joins base and path, appending `api-version` when one is configured.
pub fn endpoint_url(api_base: &str, path: &str, api_version: Option<&str>) -> String {
	let mut url = format!("{api_base}{path}");

	if let Some(version) = api_version {
		url.push(if url.contains('?') { '&' } else { '?' });
		url.push_str("api-version=");
		url.push_str(version);
	}

	url
}

pub(crate) fn http_client(timeout_ms: u64) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?)
}

/// Reads a JSON body, turning non-success statuses into [`Error::Status`].
pub(crate) async fn read_json(res: Response) -> Result<Value> {
	let status = res.status();

	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();

		return Err(Error::Status { status, body });
	}

	Ok(res.json().await?)
}
