pub mod assessment;
pub mod download;
pub mod portal;

mod error;

pub use error::{Error, Result};

use std::{future::Future, time::Duration};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	optional_auth_headers(Some(api_key), default_headers)
}

/// Like [`auth_headers`], but only sends `Authorization` when a key is configured.
pub fn optional_auth_headers(
	api_key: Option<&str>,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if let Some(api_key) = api_key {
		headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
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

async fn with_timeout<F, T>(timeout_ms: u64, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
		Ok(result) => result,
		Err(_) => Err(Error::Timeout { timeout_ms }),
	}
}

fn client(timeout_ms: u64) -> Result<reqwest::Client> {
	Ok(reqwest::Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?)
}
