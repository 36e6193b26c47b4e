//! Search results submitted by hand or uploaded as exported JSON or CSV files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, LandmanService, Result};
use landman_domain::result::{self as result_rules, ResultStatus};
use landman_providers::portal::PortalDocument;
use landman_storage::{
	models::{NewSearchResult, SearchResult},
	results as result_store,
};

const DOCUMENT_NUMBER_KEYS: &[&str] =
	&["document_number", "documentNumber", "Document Number", "doc_num"];
const RECORDING_DATE_KEYS: &[&str] = &["recording_date", "recordingDate", "Recording Date", "date"];
const GRANTOR_KEYS: &[&str] = &["grantor", "Grantor", "seller"];
const GRANTEE_KEYS: &[&str] = &["grantee", "Grantee", "buyer"];
const DOCUMENT_TYPE_KEYS: &[&str] = &["document_type", "documentType", "Document Type", "type"];
const LEGAL_DESCRIPTION_KEYS: &[&str] =
	&["legal_description", "legalDescription", "Legal Description"];
const PAGE_COUNT_KEYS: &[&str] = &["page_count", "pageCount", "Page Count"];
const PORTAL_URL_KEYS: &[&str] = &["portal_url", "portalUrl", "url", "link"];
const DEFAULT_PAGE_COUNT: i32 = 1;

/// One document as a user or an export file describes it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResultInput {
	#[serde(alias = "documentNumber")]
	pub document_number: String,
	#[serde(default, alias = "recordingDate")]
	pub recording_date: Option<String>,
	#[serde(default)]
	pub grantor: Option<String>,
	#[serde(default)]
	pub grantee: Option<String>,
	#[serde(default, alias = "documentType")]
	pub document_type: Option<String>,
	#[serde(default, alias = "legalDescription")]
	pub legal_description: Option<String>,
	#[serde(default, alias = "pageCount")]
	pub page_count: Option<i32>,
	#[serde(default, alias = "portalUrl", alias = "link")]
	pub portal_url: Option<String>,
}

impl From<PortalDocument> for ResultInput {
	fn from(doc: PortalDocument) -> Self {
		Self {
			document_number: doc.document_number,
			recording_date: doc.recording_date,
			grantor: doc.grantor,
			grantee: doc.grantee,
			document_type: doc.document_type,
			legal_description: doc.legal_description,
			page_count: doc.page_count,
			portal_url: doc.link,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitResultsRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
	pub results: Vec<ResultInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadResultsRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
	/// Used to pick the parser by extension. Content sniffing decides when it has none.
	pub file_name: String,
	pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
	pub task_id: Uuid,
	pub received: usize,
	pub inserted: usize,
	pub duplicates: usize,
	/// Rows without a document number.
	pub skipped: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultListRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
	#[serde(default)]
	pub statuses: Vec<ResultStatus>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultListResponse {
	pub task_id: Uuid,
	pub results: Vec<ResultView>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultStatusRequest {
	pub user_id: Uuid,
	pub result_id: Uuid,
	pub status: ResultStatus,
	pub review_notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultView {
	pub result_id: Uuid,
	pub task_id: Uuid,
	pub document_number: String,
	#[serde(with = "crate::time_serde::date::option")]
	pub recording_date: Option<Date>,
	pub grantor: Option<String>,
	pub grantee: Option<String>,
	pub document_type: Option<String>,
	pub legal_description: Option<String>,
	pub page_count: Option<i32>,
	pub portal_url: Option<String>,
	pub status: String,
	pub review_notes: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}
impl From<SearchResult> for ResultView {
	fn from(result: SearchResult) -> Self {
		Self {
			result_id: result.result_id,
			task_id: result.task_id,
			document_number: result.document_number,
			recording_date: result.recording_date,
			grantor: result.grantor,
			grantee: result.grantee,
			document_type: result.document_type,
			legal_description: result.legal_description,
			page_count: result.page_count,
			portal_url: result.portal_url,
			status: result.status,
			review_notes: result.review_notes,
			created_at: result.created_at,
			updated_at: result.updated_at,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileFormat {
	Json,
	Csv,
}

impl LandmanService {
	pub async fn submit_results(&self, req: SubmitResultsRequest) -> Result<IngestResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;

		self.ingest_results(task.task_id, req.results).await
	}

	pub async fn upload_results(&self, req: UploadResultsRequest) -> Result<IngestResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;
		let inputs = parse_results_file(&req.file_name, &req.content)?;

		tracing::info!(
			task_id = %task.task_id,
			file_name = %req.file_name,
			rows = inputs.len(),
			"Parsed uploaded results file."
		);

		self.ingest_results(task.task_id, inputs).await
	}

	pub async fn list_results(&self, req: ResultListRequest) -> Result<ResultListResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;
		let statuses: Vec<String> =
			req.statuses.iter().map(|status| status.as_str().to_string()).collect();
		let filter = if statuses.is_empty() { None } else { Some(statuses.as_slice()) };
		let results = result_store::list_search_results(&self.db.pool, task.task_id, filter).await?;

		Ok(ResultListResponse {
			task_id: task.task_id,
			results: results.into_iter().map(ResultView::from).collect(),
		})
	}

	pub async fn set_result_status(&self, req: ResultStatusRequest) -> Result<ResultView> {
		let owned = result_store::get_owned_search_result(&self.db.pool, req.result_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Search result not found.".to_string() })?;

		crate::ensure_owner(owned.owner_id, req.user_id, "Search result")?;

		let notes = crate::tasks::non_blank(req.review_notes);

		result_store::update_search_result_status(
			&self.db.pool,
			req.result_id,
			req.status.as_str(),
			notes.as_deref(),
			OffsetDateTime::now_utc(),
		)
		.await?;

		let updated = result_store::get_owned_search_result(&self.db.pool, req.result_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Search result not found.".to_string() })?;

		Ok(updated.result.into())
	}

	async fn ingest_results(
		&self,
		task_id: Uuid,
		inputs: Vec<ResultInput>,
	) -> Result<IngestResponse> {
		let now = OffsetDateTime::now_utc();
		let received = inputs.len();
		let mut inserted = 0;
		let mut duplicates = 0;
		let mut skipped = 0;
		let mut tx = self.db.pool.begin().await?;

		for input in inputs {
			let Some(doc) = to_new_result(input) else {
				skipped += 1;

				continue;
			};

			if result_store::upsert_search_result(&mut *tx, task_id, &doc, now).await? {
				inserted += 1;
			} else {
				duplicates += 1;
			}
		}

		tx.commit().await?;

		Ok(IngestResponse { task_id, received, inserted, duplicates, skipped })
	}
}

/// Normalizes one input row. Rows without a document number yield `None`.
pub fn to_new_result(input: ResultInput) -> Option<NewSearchResult> {
	let document_number = result_rules::normalize_document_number(&input.document_number)?;

	Some(NewSearchResult {
		document_number,
		recording_date: input
			.recording_date
			.as_deref()
			.and_then(result_rules::parse_recording_date),
		grantor: crate::tasks::non_blank(input.grantor),
		grantee: crate::tasks::non_blank(input.grantee),
		document_type: crate::tasks::non_blank(input.document_type),
		legal_description: crate::tasks::non_blank(input.legal_description),
		page_count: Some(input.page_count.filter(|count| *count > 0).unwrap_or(DEFAULT_PAGE_COUNT)),
		portal_url: crate::tasks::non_blank(input.portal_url),
	})
}

fn parse_results_file(file_name: &str, content: &str) -> Result<Vec<ResultInput>> {
	let rows = match detect_format(file_name, content) {
		FileFormat::Json => json_rows(content)?,
		FileFormat::Csv => csv_rows(content)?,
	};

	Ok(rows.iter().map(row_to_input).collect())
}

fn detect_format(file_name: &str, content: &str) -> FileFormat {
	let lowered = file_name.trim().to_ascii_lowercase();

	if lowered.ends_with(".json") {
		return FileFormat::Json;
	}
	if lowered.ends_with(".csv") {
		return FileFormat::Csv;
	}

	match content.trim_start().chars().next() {
		Some('[' | '{') => FileFormat::Json,
		_ => FileFormat::Csv,
	}
}

type Row = BTreeMap<String, String>;

fn json_rows(content: &str) -> Result<Vec<Row>> {
	let value: Value = serde_json::from_str(content).map_err(|err| Error::InvalidRequest {
		message: format!("Results file is not valid JSON: {err}."),
	})?;
	let items = match value {
		Value::Array(items) => items,
		Value::Object(mut object) => {
			let nested = object.remove("documents").or_else(|| object.remove("results"));
			let Some(Value::Array(items)) = nested else {
				return Err(Error::InvalidRequest {
					message: "JSON results object must hold a documents or results array."
						.to_string(),
				});
			};

			items
		},
		_ => {
			return Err(Error::InvalidRequest {
				message: "JSON results must be an array or an object.".to_string(),
			});
		},
	};

	Ok(items
		.into_iter()
		.filter_map(|item| match item {
			Value::Object(object) => Some(
				object
					.into_iter()
					.filter_map(|(key, value)| scalar_text(value).map(|text| (key, text)))
					.collect(),
			),
			_ => None,
		})
		.collect())
}

fn scalar_text(value: Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text),
		Value::Number(number) => Some(number.to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		_ => None,
	}
}

fn csv_rows(content: &str) -> Result<Vec<Row>> {
	let mut reader = csv::ReaderBuilder::new()
		.flexible(true)
		.trim(csv::Trim::All)
		.from_reader(content.as_bytes());
	let headers = reader
		.headers()
		.map_err(|err| Error::InvalidRequest {
			message: format!("Results CSV has no header row: {err}."),
		})?
		.clone();
	let mut rows = Vec::new();

	for record in reader.records() {
		let record = record.map_err(|err| Error::InvalidRequest {
			message: format!("Results CSV is malformed: {err}."),
		})?;

		rows.push(
			headers
				.iter()
				.zip(record.iter())
				.map(|(header, value)| (header.to_string(), value.to_string()))
				.collect(),
		);
	}

	Ok(rows)
}

fn row_to_input(row: &Row) -> ResultInput {
	ResultInput {
		document_number: pick(row, DOCUMENT_NUMBER_KEYS).unwrap_or_default(),
		recording_date: pick(row, RECORDING_DATE_KEYS),
		grantor: pick(row, GRANTOR_KEYS),
		grantee: pick(row, GRANTEE_KEYS),
		document_type: pick(row, DOCUMENT_TYPE_KEYS),
		legal_description: pick(row, LEGAL_DESCRIPTION_KEYS),
		page_count: pick(row, PAGE_COUNT_KEYS).and_then(|raw| raw.parse().ok()),
		portal_url: pick(row, PORTAL_URL_KEYS),
	}
}

/// First non-blank value among `keys`, in alias order.
fn pick(row: &Row, keys: &[&str]) -> Option<String> {
	keys.iter()
		.filter_map(|key| row.get(*key))
		.map(|value| value.trim())
		.find(|value| !value.is_empty())
		.map(str::to_string)
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	#[test]
	fn json_accepts_arrays_and_wrapped_documents() {
		let bare = parse_results_file(
			"export.json",
			r#"[{"documentNumber": "2019-1", "pageCount": 4}, {"grantor": "NO NUMBER"}]"#,
		)
		.expect("parse failed");

		assert_eq!(bare.len(), 2);
		assert_eq!(bare[0].document_number, "2019-1");
		assert_eq!(bare[0].page_count, Some(4));
		assert_eq!(bare[1].document_number, "");

		let content = r#"{"results": [{"Document Number": "A-7", "seller": "SMITH"}]}"#;
		let wrapped = parse_results_file("", content).expect("parse failed");

		assert_eq!(wrapped[0].document_number, "A-7");
		assert_eq!(wrapped[0].grantor.as_deref(), Some("SMITH"));
	}

	#[test]
	fn json_without_a_result_array_is_rejected() {
		assert!(matches!(
			parse_results_file("export.json", r#"{"items": []}"#),
			Err(Error::InvalidRequest { .. })
		));
		assert!(matches!(
			parse_results_file("export.json", "[1,"),
			Err(Error::InvalidRequest { .. })
		));
	}

	#[test]
	fn csv_headers_map_through_aliases() {
		let content = "\
Document Number,Recording Date,seller,buyer,type,Page Count,link
2019-004411,05/02/2019,SMITH JOHN,DOE JANE,Warranty Deed,3,https://records.example.gov/d/1
,01/01/2020,MISSING NUMBER,,Deed,,
";
		let rows = parse_results_file("export.csv", content).expect("parse failed");

		assert_eq!(rows.len(), 2);
		assert_eq!(rows[0].document_number, "2019-004411");
		assert_eq!(rows[0].grantee.as_deref(), Some("DOE JANE"));
		assert_eq!(rows[0].document_type.as_deref(), Some("Warranty Deed"));
		assert_eq!(rows[0].portal_url.as_deref(), Some("https://records.example.gov/d/1"));

		let first = to_new_result(rows[0].clone()).expect("row must be kept");

		assert_eq!(first.recording_date, Some(date!(2019 - 05 - 02)));
		assert_eq!(first.page_count, Some(3));
		assert!(to_new_result(rows[1].clone()).is_none());
	}

	#[test]
	fn normalization_defaults_pages_and_drops_bad_dates() {
		let doc = to_new_result(ResultInput {
			document_number: "  77  ".to_string(),
			recording_date: Some("sometime in May".to_string()),
			grantor: Some("   ".to_string()),
			..Default::default()
		})
		.expect("row must be kept");

		assert_eq!(doc.document_number, "77");
		assert_eq!(doc.recording_date, None);
		assert_eq!(doc.grantor, None);
		assert_eq!(doc.page_count, Some(DEFAULT_PAGE_COUNT));
	}

	#[test]
	fn format_falls_back_to_content_sniffing() {
		assert_eq!(detect_format("upload", "  [ ]"), FileFormat::Json);
		assert_eq!(detect_format("upload", "document_number\n1"), FileFormat::Csv);
		assert_eq!(detect_format("EXPORT.CSV", "[looks like json]"), FileFormat::Csv);
	}
}
