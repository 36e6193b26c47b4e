use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::Date;

use crate::review::Assessment;

pub const RAW_EXCERPT_CHARS: usize = 200;
pub const UNPARSED_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_RELEVANT_PAGES: &str = "all";

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// What a reviewer is looking for in a batch of documents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentCriteria {
	pub party_name: String,
	#[serde(default, with = "iso_date::option")]
	pub date_from: Option<Date>,
	#[serde(default, with = "iso_date::option")]
	pub date_to: Option<Date>,
	pub legal_description: Option<String>,
	#[serde(default)]
	pub document_types: Vec<String>,
}

/// Document fields shown to the model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFacts {
	pub document_number: String,
	pub document_type: Option<String>,
	#[serde(default, with = "iso_date::option")]
	pub recording_date: Option<Date>,
	pub grantor: Option<String>,
	pub grantee: Option<String>,
	pub legal_description: Option<String>,
	pub page_count: Option<i32>,
}

/// AI stage of a document review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssessmentOutcome {
	pub assessment: Assessment,
	pub confidence: f32,
	pub evidence: String,
	pub quotes: String,
	pub relevant_pages: String,
	/// `party_match`, `date_match`, and `legal_match` sub-judgments when the model gave them.
	pub match_details: Map<String, Value>,
}
impl AssessmentOutcome {
	/// Interprets raw model output. Unusable output degrades to a pending outcome that quotes the
	/// start of the response.
	pub fn from_response_text(text: &str) -> Self {
		match extract_json_object(text).and_then(|raw| serde_json::from_str::<RawOutcome>(raw).ok())
		{
			Some(raw) => raw.into_outcome(),
			None => Self::unparsed(text),
		}
	}

	pub fn unparsed(text: &str) -> Self {
		let excerpt: String = text.chars().take(RAW_EXCERPT_CHARS).collect();

		Self {
			assessment: Assessment::Pending,
			confidence: UNPARSED_CONFIDENCE,
			evidence: format!("Failed to parse AI response: {excerpt}"),
			quotes: String::new(),
			relevant_pages: DEFAULT_RELEVANT_PAGES.to_string(),
			match_details: Map::new(),
		}
	}

	/// Outcome recorded when the model could not be reached or timed out.
	pub fn call_failed(message: &str) -> Self {
		Self {
			assessment: Assessment::Pending,
			confidence: 0.0,
			evidence: format!("Analysis failed: {message}"),
			quotes: String::new(),
			relevant_pages: DEFAULT_RELEVANT_PAGES.to_string(),
			match_details: Map::new(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcome {
	assessment: Option<String>,
	confidence: Option<f64>,
	evidence: Option<String>,
	quotes: Option<Value>,
	relevant_pages: Option<Value>,
	party_match: Option<Value>,
	date_match: Option<Value>,
	legal_match: Option<Value>,
}
impl RawOutcome {
	fn into_outcome(self) -> AssessmentOutcome {
		let assessment =
			self.assessment.and_then(|raw| raw.trim().parse().ok()).unwrap_or(Assessment::Pending);
		let mut match_details = Map::new();

		for (key, value) in [
			("party_match", self.party_match),
			("date_match", self.date_match),
			("legal_match", self.legal_match),
		] {
			if let Some(value) = value.filter(|value| !value.is_null()) {
				match_details.insert(key.to_string(), value);
			}
		}

		AssessmentOutcome {
			assessment,
			confidence: clamp_confidence(self.confidence),
			evidence: self.evidence.unwrap_or_default(),
			quotes: self.quotes.map(|value| flatten_text(value, "\n")).unwrap_or_default(),
			relevant_pages: self
				.relevant_pages
				.map(|value| flatten_text(value, ","))
				.filter(|pages| !pages.trim().is_empty())
				.unwrap_or_else(|| DEFAULT_RELEVANT_PAGES.to_string()),
			match_details,
		}
	}
}

/// Builds the single user message sent to the assessment model.
pub fn build_prompt(doc: &DocumentFacts, criteria: &AssessmentCriteria) -> String {
	let mut out = String::with_capacity(2_048);
	let na = "N/A";
	let any = "Any";

	out.push_str(
		"You are a land title analyst assistant. Decide whether this recorded document matches the \
		 search criteria.\n\nDOCUMENT RECORD:\n",
	);

	let _ = writeln!(out, "- Document Number: {}", doc.document_number);
	let _ = writeln!(out, "- Document Type: {}", doc.document_type.as_deref().unwrap_or(na));
	let _ = writeln!(out, "- Recording Date: {}", format_date(doc.recording_date, na));
	let _ = writeln!(out, "- Grantor (Seller): {}", doc.grantor.as_deref().unwrap_or(na));
	let _ = writeln!(out, "- Grantee (Buyer): {}", doc.grantee.as_deref().unwrap_or(na));
	let _ =
		writeln!(out, "- Legal Description: {}", doc.legal_description.as_deref().unwrap_or(na));
	let _ = writeln!(
		out,
		"- Page Count: {}",
		doc.page_count.map(|count| count.to_string()).unwrap_or_else(|| na.to_string())
	);

	out.push_str("\nSEARCH CRITERIA:\n");

	let _ = writeln!(out, "- Party Name to Match: {}", criteria.party_name);
	let _ = writeln!(
		out,
		"- Date Range: {} to {}",
		format_date(criteria.date_from, any),
		format_date(criteria.date_to, any)
	);
	let _ = writeln!(
		out,
		"- Legal Description to Match: {}",
		criteria.legal_description.as_deref().unwrap_or(any)
	);
	let _ = writeln!(
		out,
		"- Document Types of Interest: {}",
		if criteria.document_types.is_empty() {
			any.to_string()
		} else {
			criteria.document_types.join(", ")
		}
	);

	out.push_str(
		"\nINSTRUCTIONS:\n\
		 1. Check whether the party name appears as grantor or grantee. Allow partial matches, \
		 spelling variants, and entity suffixes such as LLC, Inc, or Corp.\n\
		 2. Check whether the recording date falls inside the date range.\n\
		 3. Check whether the legal description matches or overlaps the criteria.\n\
		 4. Decide whether the document type is relevant.\n\n\
		 Reply with one JSON object and nothing else:\n\
		 {\n\
		 \x20 \"assessment\": \"meets_criteria\" | \"probable_match\" | \"exclude\",\n\
		 \x20 \"confidence\": 0.0-1.0,\n\
		 \x20 \"evidence\": \"short explanation\",\n\
		 \x20 \"partyMatch\": { \"found\": true/false, \"matchType\": \"grantor\" | \"grantee\" | \"both\" | \"none\", \"details\": \"...\" },\n\
		 \x20 \"dateMatch\": { \"inRange\": true/false, \"details\": \"...\" },\n\
		 \x20 \"legalMatch\": { \"matches\": true/false, \"details\": \"...\" },\n\
		 \x20 \"quotes\": \"relevant excerpts from the record\",\n\
		 \x20 \"relevantPages\": \"all\" | \"none\" | \"1,2,3\"\n\
		 }\n",
	);

	out
}

fn extract_json_object(text: &str) -> Option<&str> {
	let start = text.find('{')?;
	let end = text.rfind('}')?;

	if end < start {
		return None;
	}

	Some(&text[start..=end])
}

fn clamp_confidence(raw: Option<f64>) -> f32 {
	match raw {
		Some(value) if value.is_finite() => value.clamp(0.0, 1.0) as f32,
		_ => UNPARSED_CONFIDENCE,
	}
}

fn flatten_text(value: Value, separator: &str) -> String {
	match value {
		Value::String(text) => text,
		Value::Array(items) => items
			.into_iter()
			.map(|item| flatten_text(item, separator))
			.filter(|item| !item.is_empty())
			.collect::<Vec<_>>()
			.join(separator),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}

fn format_date(date: Option<Date>, fallback: &str) -> String {
	date.map(|date| date.to_string()).unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_outer_object_from_chatter() {
		let text = "Sure. {\"a\": {\"b\": 1}} Hope that helps.";

		assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
		assert_eq!(extract_json_object("} backwards {"), None);
	}

	#[test]
	fn flattens_page_lists() {
		assert_eq!(flatten_text(serde_json::json!([1, 2, 3]), ","), "1,2,3");
		assert_eq!(flatten_text(serde_json::json!(["a", "", "b"]), "\n"), "a\nb");
		assert_eq!(flatten_text(serde_json::json!("1,2"), ","), "1,2");
	}
}
