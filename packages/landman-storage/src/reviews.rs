use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{AssessmentUpdate, DocumentReview, ReviewStats, ReviewedDocument},
};

const REVIEWED_DOCUMENT_SELECT: &str = "\
SELECT
\tdr.review_id,
\tdr.result_id,
\tdr.user_id,
\tdr.ai_assessment,
\tdr.ai_confidence,
\tdr.ai_evidence,
\tdr.ai_relevant_pages,
\tdr.ai_quotes,
\tdr.ai_match_details,
\tdr.ai_analyzed_at,
\tdr.user_decision,
\tdr.user_notes,
\tdr.user_confirmed,
\tdr.marked_for_download,
\tdr.downloaded_at,
\tdr.file_path,
\tdr.created_at,
\tdr.updated_at,
\tsr.task_id,
\tst.user_id AS owner_id,
\tsr.document_number,
\tsr.recording_date,
\tsr.grantor,
\tsr.grantee,
\tsr.document_type,
\tsr.page_count,
\tsr.portal_url
FROM document_reviews dr
JOIN search_results sr ON sr.result_id = dr.result_id
JOIN search_tasks st ON st.task_id = sr.task_id";

/// Creates the review for `(result, user)` or resets an existing one to a pending AI stage owned
/// by `job_id`.
///
/// Human decisions and download state on an existing review are kept.
pub async fn prepare_pending_review<'e, E>(
	executor: E,
	result_id: Uuid,
	user_id: Uuid,
	job_id: Uuid,
	now: OffsetDateTime,
) -> Result<DocumentReview>
where
	E: PgExecutor<'e>,
{
	let review = sqlx::query_as::<_, DocumentReview>(
		"\
INSERT INTO document_reviews (
\treview_id,
\tresult_id,
\tuser_id,
\tai_assessment,
\tai_job_id,
\tcreated_at,
\tupdated_at
)
VALUES ($1,$2,$3,'pending',$4,$5,$5)
ON CONFLICT (result_id, user_id) DO UPDATE
SET ai_assessment = 'pending',
\tai_analyzed_at = NULL,
\tai_job_id = EXCLUDED.ai_job_id,
\tupdated_at = EXCLUDED.updated_at
RETURNING
\treview_id,
\tresult_id,
\tuser_id,
\tai_assessment,
\tai_confidence,
\tai_evidence,
\tai_relevant_pages,
\tai_quotes,
\tai_match_details,
\tai_analyzed_at,
\tuser_decision,
\tuser_notes,
\tuser_confirmed,
\tmarked_for_download,
\tdownloaded_at,
\tfile_path,
\tcreated_at,
\tupdated_at",
	)
	.bind(Uuid::new_v4())
	.bind(result_id)
	.bind(user_id)
	.bind(job_id)
	.bind(now)
	.fetch_one(executor)
	.await?;

	Ok(review)
}

/// Writes the AI stage of a review. Human-stage and download fields are not touched.
///
/// Returns `false` when `job_id` no longer owns the AI stage because a later run reset it.
pub async fn write_assessment<'e, E>(
	executor: E,
	review_id: Uuid,
	job_id: Uuid,
	update: &AssessmentUpdate<'_>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE document_reviews
SET ai_assessment = $2,
\tai_confidence = $3,
\tai_evidence = $4,
\tai_quotes = $5,
\tai_relevant_pages = $6,
\tai_match_details = $7,
\tai_analyzed_at = $8,
\tupdated_at = $8
WHERE review_id = $1 AND ai_job_id = $9",
	)
	.bind(review_id)
	.bind(update.assessment)
	.bind(update.confidence)
	.bind(update.evidence)
	.bind(update.quotes)
	.bind(update.relevant_pages)
	.bind(update.match_details)
	.bind(now)
	.bind(job_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn get_reviewed_document<'e, E>(
	executor: E,
	review_id: Uuid,
) -> Result<Option<ReviewedDocument>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("{REVIEWED_DOCUMENT_SELECT}\nWHERE dr.review_id = $1");
	let row = sqlx::query_as::<_, ReviewedDocument>(&sql)
		.bind(review_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Lists one user's reviews for a task.
pub async fn list_task_reviews<'e, E>(
	executor: E,
	task_id: Uuid,
	user_id: Uuid,
) -> Result<Vec<ReviewedDocument>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"{REVIEWED_DOCUMENT_SELECT}
WHERE sr.task_id = $1 AND dr.user_id = $2
ORDER BY dr.ai_confidence DESC NULLS LAST, sr.document_number ASC"
	);
	let rows = sqlx::query_as::<_, ReviewedDocument>(&sql)
		.bind(task_id)
		.bind(user_id)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Lists reviews marked for download. With `pending_only`, reviews that already have a file are
/// left out.
pub async fn list_marked_reviews<'e, E>(
	executor: E,
	task_id: Uuid,
	user_id: Uuid,
	pending_only: bool,
) -> Result<Vec<ReviewedDocument>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"{REVIEWED_DOCUMENT_SELECT}
WHERE sr.task_id = $1
\tAND dr.user_id = $2
\tAND dr.marked_for_download
\tAND (NOT $3 OR dr.downloaded_at IS NULL)
ORDER BY sr.document_number ASC"
	);
	let rows = sqlx::query_as::<_, ReviewedDocument>(&sql)
		.bind(task_id)
		.bind(user_id)
		.bind(pending_only)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

pub async fn list_downloaded_reviews<'e, E>(
	executor: E,
	task_id: Uuid,
	user_id: Uuid,
) -> Result<Vec<ReviewedDocument>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"{REVIEWED_DOCUMENT_SELECT}
WHERE sr.task_id = $1 AND dr.user_id = $2 AND dr.downloaded_at IS NOT NULL
ORDER BY dr.downloaded_at ASC"
	);
	let rows = sqlx::query_as::<_, ReviewedDocument>(&sql)
		.bind(task_id)
		.bind(user_id)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

pub struct DecisionUpdate<'a> {
	pub review_id: Uuid,
	pub decision: &'a str,
	pub notes: Option<&'a str>,
	pub marked_for_download: bool,
	pub now: OffsetDateTime,
}

/// Writes the human stage of a review. A downloaded review stays marked so its file record is kept.
pub async fn record_decision<'e, E>(executor: E, update: DecisionUpdate<'_>) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE document_reviews
SET user_decision = $2,
\tuser_notes = $3,
\tuser_confirmed = true,
\tmarked_for_download = (downloaded_at IS NOT NULL OR $4),
\tupdated_at = $5
WHERE review_id = $1",
	)
	.bind(update.review_id)
	.bind(update.decision)
	.bind(update.notes)
	.bind(update.marked_for_download)
	.bind(update.now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Flags reviews for download, restricted to reviews under tasks owned by `owner_id`. Returns the
/// number of reviews flagged.
pub async fn mark_reviews_for_download<'e, E>(
	executor: E,
	review_ids: &[Uuid],
	owner_id: Uuid,
	now: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE document_reviews dr
SET marked_for_download = true,
\tupdated_at = $3
FROM search_results sr
JOIN search_tasks st ON st.task_id = sr.task_id
WHERE dr.review_id = ANY($1)
\tAND sr.result_id = dr.result_id
\tAND st.user_id = $2",
	)
	.bind(review_ids)
	.bind(owner_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Stamps a review as downloaded. Returns `false` when the review is not marked or was already
/// downloaded, so `downloaded_at` is written at most once.
pub async fn mark_review_downloaded<'e, E>(
	executor: E,
	review_id: Uuid,
	file_path: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE document_reviews
SET downloaded_at = $3,
\tfile_path = COALESCE($2, file_path),
\tupdated_at = $3
WHERE review_id = $1 AND marked_for_download AND downloaded_at IS NULL",
	)
	.bind(review_id)
	.bind(file_path)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn review_stats<'e, E>(executor: E, task_id: Uuid, user_id: Uuid) -> Result<ReviewStats>
where
	E: PgExecutor<'e>,
{
	let stats = sqlx::query_as::<_, ReviewStats>(
		"\
SELECT
\tCOUNT(*) AS total,
\tCOUNT(*) FILTER (WHERE dr.ai_assessment = 'meets_criteria') AS meets_criteria,
\tCOUNT(*) FILTER (WHERE dr.ai_assessment = 'probable_match') AS probable_match,
\tCOUNT(*) FILTER (WHERE dr.ai_assessment = 'exclude') AS exclude,
\tCOUNT(*) FILTER (WHERE dr.ai_assessment = 'pending') AS pending,
\tCOUNT(*) FILTER (WHERE dr.user_confirmed) AS user_reviewed,
\tCOUNT(*) FILTER (WHERE dr.marked_for_download) AS marked_for_download,
\tCOUNT(*) FILTER (WHERE dr.downloaded_at IS NOT NULL) AS downloaded
FROM document_reviews dr
JOIN search_results sr ON sr.result_id = dr.result_id
WHERE sr.task_id = $1 AND dr.user_id = $2",
	)
	.bind(task_id)
	.bind(user_id)
	.fetch_one(executor)
	.await?;

	Ok(stats)
}
