use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Portal {
	pub portal_id: Uuid,
	pub name: String,
	pub slug: String,
	pub base_url: String,
	pub is_active: bool,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct PortalCredential {
	pub credential_id: Uuid,
	pub user_id: Uuid,
	pub portal_id: Uuid,
	pub username: String,
	/// Base64 of `nonce || ciphertext`.
	pub encrypted_password: String,
	pub label: Option<String>,
	pub is_active: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SearchTask {
	pub task_id: Uuid,
	pub organization_id: Option<Uuid>,
	pub user_id: Uuid,
	pub portal_id: Uuid,
	pub county_id: Uuid,
	pub party_name: String,
	pub party_role: String,
	pub date_from: Date,
	pub date_to: Date,
	pub legal_description: Option<String>,
	pub document_reference: Option<String>,
	pub priority: i32,
	pub status: String,
	pub notes: Option<String>,
	pub error_message: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub started_at: Option<OffsetDateTime>,
	pub completed_at: Option<OffsetDateTime>,
}

/// A task the worker moved to `running`, with the portal it targets.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ClaimedSearchTask {
	#[sqlx(flatten)]
	pub task: SearchTask,
	pub portal_base_url: String,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct QueueStats {
	pub queued: i64,
	pub running: i64,
	pub completed: i64,
	pub paused: i64,
	pub failed: i64,
	pub total: i64,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SearchResult {
	pub result_id: Uuid,
	pub task_id: Uuid,
	pub document_number: String,
	pub recording_date: Option<Date>,
	pub grantor: Option<String>,
	pub grantee: Option<String>,
	pub document_type: Option<String>,
	pub legal_description: Option<String>,
	pub page_count: Option<i32>,
	pub portal_url: Option<String>,
	pub status: String,
	pub review_notes: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Result row joined with the owner of its parent task.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct OwnedSearchResult {
	#[sqlx(flatten)]
	pub result: SearchResult,
	pub owner_id: Uuid,
}

#[derive(Clone, Debug, Default)]
pub struct NewSearchResult {
	pub document_number: String,
	pub recording_date: Option<Date>,
	pub grantor: Option<String>,
	pub grantee: Option<String>,
	pub document_type: Option<String>,
	pub legal_description: Option<String>,
	pub page_count: Option<i32>,
	pub portal_url: Option<String>,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DocumentReview {
	pub review_id: Uuid,
	pub result_id: Uuid,
	pub user_id: Uuid,
	pub ai_assessment: String,
	pub ai_confidence: Option<f32>,
	pub ai_evidence: Option<String>,
	pub ai_relevant_pages: Option<String>,
	pub ai_quotes: Option<String>,
	pub ai_match_details: Value,
	pub ai_analyzed_at: Option<OffsetDateTime>,
	pub user_decision: Option<String>,
	pub user_notes: Option<String>,
	pub user_confirmed: bool,
	pub marked_for_download: bool,
	pub downloaded_at: Option<OffsetDateTime>,
	pub file_path: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Review joined with its result and the owner of the parent task.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ReviewedDocument {
	#[sqlx(flatten)]
	pub review: DocumentReview,
	pub task_id: Uuid,
	pub owner_id: Uuid,
	pub document_number: String,
	pub recording_date: Option<Date>,
	pub grantor: Option<String>,
	pub grantee: Option<String>,
	pub document_type: Option<String>,
	pub page_count: Option<i32>,
	pub portal_url: Option<String>,
}

pub struct AssessmentUpdate<'a> {
	pub assessment: &'a str,
	pub confidence: f32,
	pub evidence: &'a str,
	pub quotes: &'a str,
	pub relevant_pages: &'a str,
	pub match_details: &'a Value,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ReviewStats {
	pub total: i64,
	pub meets_criteria: i64,
	pub probable_match: i64,
	pub exclude: i64,
	pub pending: i64,
	pub user_reviewed: i64,
	pub marked_for_download: i64,
	pub downloaded: i64,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct PipelineJob {
	pub job_id: Uuid,
	pub kind: String,
	pub task_id: Option<Uuid>,
	pub user_id: Uuid,
	pub status: String,
	pub total_items: i32,
	pub succeeded_items: i32,
	pub failed_items: i32,
	pub last_error: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub finished_at: Option<OffsetDateTime>,
}
