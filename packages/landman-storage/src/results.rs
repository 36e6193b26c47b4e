use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{NewSearchResult, OwnedSearchResult, SearchResult},
};

const SEARCH_RESULT_COLUMNS: &str = "\
\tsr.result_id,
\tsr.task_id,
\tsr.document_number,
\tsr.recording_date,
\tsr.grantor,
\tsr.grantee,
\tsr.document_type,
\tsr.legal_description,
\tsr.page_count,
\tsr.portal_url,
\tsr.status,
\tsr.review_notes,
\tsr.created_at,
\tsr.updated_at";

/// Inserts a discovered document, or only touches `updated_at` when the task already holds a
/// document with the same number. Returns `true` when a new row was created.
pub async fn upsert_search_result<'e, E>(
	executor: E,
	task_id: Uuid,
	doc: &NewSearchResult,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let inserted: bool = sqlx::query_scalar(
		"\
INSERT INTO search_results (
\tresult_id,
\ttask_id,
\tdocument_number,
\trecording_date,
\tgrantor,
\tgrantee,
\tdocument_type,
\tlegal_description,
\tpage_count,
\tportal_url,
\tstatus,
\tcreated_at,
\tupdated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,'new',$11,$11)
ON CONFLICT (task_id, document_number) DO UPDATE
SET updated_at = EXCLUDED.updated_at
RETURNING (xmax = 0) AS inserted",
	)
	.bind(Uuid::new_v4())
	.bind(task_id)
	.bind(doc.document_number.as_str())
	.bind(doc.recording_date)
	.bind(doc.grantor.as_deref())
	.bind(doc.grantee.as_deref())
	.bind(doc.document_type.as_deref())
	.bind(doc.legal_description.as_deref())
	.bind(doc.page_count)
	.bind(doc.portal_url.as_deref())
	.bind(now)
	.fetch_one(executor)
	.await?;

	Ok(inserted)
}

pub async fn get_owned_search_result<'e, E>(
	executor: E,
	result_id: Uuid,
) -> Result<Option<OwnedSearchResult>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
{SEARCH_RESULT_COLUMNS},
\tst.user_id AS owner_id
FROM search_results sr
JOIN search_tasks st ON st.task_id = sr.task_id
WHERE sr.result_id = $1"
	);
	let row = sqlx::query_as::<_, OwnedSearchResult>(&sql)
		.bind(result_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Loads the given results together with their owners. Unknown ids are absent from the output.
pub async fn list_owned_search_results<'e, E>(
	executor: E,
	result_ids: &[Uuid],
) -> Result<Vec<OwnedSearchResult>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
{SEARCH_RESULT_COLUMNS},
\tst.user_id AS owner_id
FROM search_results sr
JOIN search_tasks st ON st.task_id = sr.task_id
WHERE sr.result_id = ANY($1)
ORDER BY sr.created_at ASC, sr.document_number ASC"
	);
	let rows = sqlx::query_as::<_, OwnedSearchResult>(&sql)
		.bind(result_ids)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Lists a task's results, optionally restricted to a set of statuses.
pub async fn list_search_results<'e, E>(
	executor: E,
	task_id: Uuid,
	statuses: Option<&[String]>,
) -> Result<Vec<SearchResult>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
{SEARCH_RESULT_COLUMNS}
FROM search_results sr
WHERE sr.task_id = $1 AND ($2::text[] IS NULL OR sr.status = ANY($2))
ORDER BY sr.recording_date DESC NULLS LAST, sr.document_number ASC"
	);
	let rows = sqlx::query_as::<_, SearchResult>(&sql)
		.bind(task_id)
		.bind(statuses)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

pub async fn update_search_result_status<'e, E>(
	executor: E,
	result_id: Uuid,
	status: &str,
	review_notes: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE search_results
SET status = $2,
\treview_notes = COALESCE($3, review_notes),
\tupdated_at = $4
WHERE result_id = $1",
	)
	.bind(result_id)
	.bind(status)
	.bind(review_notes)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}
