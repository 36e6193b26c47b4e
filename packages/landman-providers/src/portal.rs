//! Client for the remote browser-automation service that runs county portal searches.
//!
//! The service receives a typed search request, logs into the portal with the supplied
//! credentials, and answers with the document records it found.

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, Result};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSearchRequest<'a> {
	pub portal_url: &'a str,
	pub username: &'a str,
	pub password: &'a str,
	pub party_name: &'a str,
	pub party_role: &'a str,
	#[serde(with = "iso_date")]
	pub date_from: Date,
	#[serde(with = "iso_date")]
	pub date_to: Date,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub legal_description: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub document_reference: Option<&'a str>,
}
impl std::fmt::Debug for PortalSearchRequest<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PortalSearchRequest")
			.field("portal_url", &self.portal_url)
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.field("party_name", &self.party_name)
			.field("party_role", &self.party_role)
			.field("date_from", &self.date_from)
			.field("date_to", &self.date_to)
			.finish_non_exhaustive()
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSearchResponse {
	#[serde(default)]
	pub success: bool,
	#[serde(default)]
	pub documents: Vec<PortalDocument>,
	#[serde(default)]
	pub error: Option<String>,
}
impl PortalSearchResponse {
	/// Turns a reported failure into an error so callers only see one failure path.
	pub fn into_documents(self) -> Result<Vec<PortalDocument>> {
		if self.success {
			return Ok(self.documents);
		}

		let message = self
			.error
			.filter(|message| !message.trim().is_empty())
			.unwrap_or_else(|| "Portal search failed without an error message.".to_string());

		Err(Error::InvalidResponse { message })
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalDocument {
	pub document_number: String,
	#[serde(default)]
	pub recording_date: Option<String>,
	#[serde(default)]
	pub grantor: Option<String>,
	#[serde(default)]
	pub grantee: Option<String>,
	#[serde(default)]
	pub document_type: Option<String>,
	#[serde(default)]
	pub legal_description: Option<String>,
	#[serde(default)]
	pub page_count: Option<i32>,
	#[serde(default)]
	pub link: Option<String>,
}

pub async fn search(
	cfg: &landman_config::PortalSearchProviderConfig,
	request: &PortalSearchRequest<'_>,
) -> Result<PortalSearchResponse> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let res = client
		.post(url)
		.headers(crate::optional_auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?)
		.json(request)
		.send()
		.await?;
	let response = res.error_for_status()?.json::<PortalSearchResponse>().await?;

	Ok(response)
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	#[test]
	fn request_serializes_camel_case_with_iso_dates() {
		let request = PortalSearchRequest {
			portal_url: "https://records.example.gov",
			username: "landman",
			password: "hunter2",
			party_name: "John Smith",
			party_role: "grantor",
			date_from: date!(2001 - 02 - 03),
			date_to: date!(2010 - 11 - 30),
			legal_description: None,
			document_reference: Some("2009-1234"),
		};
		let json = serde_json::to_value(&request).expect("Failed to serialize request.");

		assert_eq!(json["partyName"], "John Smith");
		assert_eq!(json["dateFrom"], "2001-02-03");
		assert_eq!(json["dateTo"], "2010-11-30");
		assert_eq!(json["documentReference"], "2009-1234");
		assert!(json.get("legalDescription").is_none());
	}

	#[test]
	fn debug_output_hides_password() {
		let request = PortalSearchRequest {
			portal_url: "https://records.example.gov",
			username: "landman",
			password: "hunter2",
			party_name: "John Smith",
			party_role: "both",
			date_from: date!(2001 - 02 - 03),
			date_to: date!(2010 - 11 - 30),
			legal_description: None,
			document_reference: None,
		};

		assert!(!format!("{request:?}").contains("hunter2"));
	}

	#[test]
	fn reported_failure_becomes_error() {
		let response: PortalSearchResponse =
			serde_json::from_str(r#"{"success": false, "error": "Login rejected."}"#)
				.expect("Failed to parse response.");
		let err = response.into_documents().expect_err("Expected failure.");

		assert_eq!(err.to_string(), "Login rejected.");

		let response: PortalSearchResponse =
			serde_json::from_str(r#"{"success": false}"#).expect("Failed to parse response.");
		let err = response.into_documents().expect_err("Expected failure.");

		assert!(err.to_string().contains("without an error message"));
	}
}
