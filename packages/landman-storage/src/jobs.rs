use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::PipelineJob};

pub async fn insert_pipeline_job<'e, E>(executor: E, job: &PipelineJob) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO pipeline_jobs (
\tjob_id,
\tkind,
\ttask_id,
\tuser_id,
\tstatus,
\ttotal_items,
\tsucceeded_items,
\tfailed_items,
\tlast_error,
\tcreated_at,
\tupdated_at,
\tfinished_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
	)
	.bind(job.job_id)
	.bind(job.kind.as_str())
	.bind(job.task_id)
	.bind(job.user_id)
	.bind(job.status.as_str())
	.bind(job.total_items)
	.bind(job.succeeded_items)
	.bind(job.failed_items)
	.bind(job.last_error.as_deref())
	.bind(job.created_at)
	.bind(job.updated_at)
	.bind(job.finished_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_pipeline_job<'e, E>(executor: E, job_id: Uuid) -> Result<Option<PipelineJob>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, PipelineJob>(
		"\
SELECT
\tjob_id,
\tkind,
\ttask_id,
\tuser_id,
\tstatus,
\ttotal_items,
\tsucceeded_items,
\tfailed_items,
\tlast_error,
\tcreated_at,
\tupdated_at,
\tfinished_at
FROM pipeline_jobs
WHERE job_id = $1",
	)
	.bind(job_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Counts one processed item. A failed item also records its error text.
pub async fn record_pipeline_job_item<'e, E>(
	executor: E,
	job_id: Uuid,
	error_text: Option<&str>,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE pipeline_jobs
SET succeeded_items = succeeded_items + CASE WHEN $2::text IS NULL THEN 1 ELSE 0 END,
\tfailed_items = failed_items + CASE WHEN $2::text IS NULL THEN 0 ELSE 1 END,
\tlast_error = COALESCE($2, last_error),
\tupdated_at = $3
WHERE job_id = $1",
	)
	.bind(job_id)
	.bind(error_text)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn finish_pipeline_job<'e, E>(
	executor: E,
	job_id: Uuid,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE pipeline_jobs
SET status = 'finished',
\tfinished_at = $2,
\tupdated_at = $2
WHERE job_id = $1",
	)
	.bind(job_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}
