use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{ClaimedSearchTask, QueueStats, SearchTask},
};

const SEARCH_TASK_COLUMNS: &str = "\
\ttask_id,
\torganization_id,
\tuser_id,
\tportal_id,
\tcounty_id,
\tparty_name,
\tparty_role,
\tdate_from,
\tdate_to,
\tlegal_description,
\tdocument_reference,
\tpriority,
\tstatus,
\tnotes,
\terror_message,
\tcreated_at,
\tupdated_at,
\tstarted_at,
\tcompleted_at";

pub struct TaskStatusChange<'a> {
	pub task_id: Uuid,
	/// Compare-and-swap guard; the update is a no-op unless the row still has this status.
	pub from: &'a str,
	pub to: &'a str,
	pub error_message: Option<&'a str>,
	pub now: OffsetDateTime,
}

pub async fn insert_search_task<'e, E>(executor: E, task: &SearchTask) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO search_tasks (
\ttask_id,
\torganization_id,
\tuser_id,
\tportal_id,
\tcounty_id,
\tparty_name,
\tparty_role,
\tdate_from,
\tdate_to,
\tlegal_description,
\tdocument_reference,
\tpriority,
\tstatus,
\tnotes,
\terror_message,
\tcreated_at,
\tupdated_at,
\tstarted_at,
\tcompleted_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)",
	)
	.bind(task.task_id)
	.bind(task.organization_id)
	.bind(task.user_id)
	.bind(task.portal_id)
	.bind(task.county_id)
	.bind(task.party_name.as_str())
	.bind(task.party_role.as_str())
	.bind(task.date_from)
	.bind(task.date_to)
	.bind(task.legal_description.as_deref())
	.bind(task.document_reference.as_deref())
	.bind(task.priority)
	.bind(task.status.as_str())
	.bind(task.notes.as_deref())
	.bind(task.error_message.as_deref())
	.bind(task.created_at)
	.bind(task.updated_at)
	.bind(task.started_at)
	.bind(task.completed_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_search_task<'e, E>(executor: E, task_id: Uuid) -> Result<Option<SearchTask>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT\n{SEARCH_TASK_COLUMNS}\nFROM search_tasks\nWHERE task_id = $1");
	let row =
		sqlx::query_as::<_, SearchTask>(&sql).bind(task_id).fetch_optional(executor).await?;

	Ok(row)
}

/// Same as [`get_search_task`] but row-locks the task for the surrounding transaction.
pub async fn lock_search_task<'e, E>(executor: E, task_id: Uuid) -> Result<Option<SearchTask>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT\n{SEARCH_TASK_COLUMNS}\nFROM search_tasks\nWHERE task_id = $1\nFOR UPDATE"
	);
	let row =
		sqlx::query_as::<_, SearchTask>(&sql).bind(task_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn list_search_tasks<'e, E>(
	executor: E,
	user_id: Uuid,
	status: Option<&str>,
	limit: i64,
	offset: i64,
) -> Result<Vec<SearchTask>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
{SEARCH_TASK_COLUMNS}
FROM search_tasks
WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
ORDER BY priority ASC, created_at ASC
LIMIT $3 OFFSET $4"
	);
	let rows = sqlx::query_as::<_, SearchTask>(&sql)
		.bind(user_id)
		.bind(status)
		.bind(limit)
		.bind(offset)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Persists the owner-editable fields of a task.
pub async fn update_search_task_fields<'e, E>(executor: E, task: &SearchTask) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE search_tasks
SET party_name = $2,
\tparty_role = $3,
\tdate_from = $4,
\tdate_to = $5,
\tlegal_description = $6,
\tdocument_reference = $7,
\tpriority = $8,
\tnotes = $9,
\tupdated_at = $10
WHERE task_id = $1",
	)
	.bind(task.task_id)
	.bind(task.party_name.as_str())
	.bind(task.party_role.as_str())
	.bind(task.date_from)
	.bind(task.date_to)
	.bind(task.legal_description.as_deref())
	.bind(task.document_reference.as_deref())
	.bind(task.priority)
	.bind(task.notes.as_deref())
	.bind(task.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn update_search_task_priority<'e, E>(
	executor: E,
	task_id: Uuid,
	priority: i32,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result =
		sqlx::query("UPDATE search_tasks SET priority = $2, updated_at = $3 WHERE task_id = $1")
			.bind(task_id)
			.bind(priority)
			.bind(now)
			.execute(executor)
			.await?;

	Ok(result.rows_affected() == 1)
}

/// Applies a status transition and its timestamp side effects.
///
/// Entering `running` stamps `started_at`. `completed_at` is non-null only while the task is
/// `completed`. Entering `failed` records the error message and re-queueing clears it.
pub async fn set_search_task_status<'e, E>(
	executor: E,
	change: TaskStatusChange<'_>,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE search_tasks
SET status = $3,
\tstarted_at = CASE WHEN $3 = 'running' THEN $5 ELSE started_at END,
\tcompleted_at = CASE WHEN $3 = 'completed' THEN $5 ELSE NULL END,
\terror_message = CASE
\t\tWHEN $3 = 'failed' THEN $4
\t\tWHEN $3 = 'queued' THEN NULL
\t\tELSE error_message
\tEND,
\tupdated_at = $5
WHERE task_id = $1 AND status = $2",
	)
	.bind(change.task_id)
	.bind(change.from)
	.bind(change.to)
	.bind(change.error_message)
	.bind(change.now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn delete_search_task<'e, E>(executor: E, task_id: Uuid, status: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM search_tasks WHERE task_id = $1 AND status = $2")
		.bind(task_id)
		.bind(status)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() == 1)
}

/// Claims the next runnable task and moves it to `running`.
///
/// A task is runnable when it is queued, its portal is active, and its owner has an active
/// credential for that portal. Lowest priority number wins, then the oldest task. Concurrent
/// claimers skip rows already locked by another transaction.
pub async fn claim_next_search_task(
	db: &Db,
	now: OffsetDateTime,
) -> Result<Option<ClaimedSearchTask>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, ClaimedSearchTask>(
		"\
SELECT
\tst.task_id,
\tst.organization_id,
\tst.user_id,
\tst.portal_id,
\tst.county_id,
\tst.party_name,
\tst.party_role,
\tst.date_from,
\tst.date_to,
\tst.legal_description,
\tst.document_reference,
\tst.priority,
\tst.status,
\tst.notes,
\tst.error_message,
\tst.created_at,
\tst.updated_at,
\tst.started_at,
\tst.completed_at,
\tp.base_url AS portal_base_url
FROM search_tasks st
JOIN portals p ON p.portal_id = st.portal_id
WHERE st.status = 'queued'
\tAND p.is_active
\tAND EXISTS (
\t\tSELECT 1
\t\tFROM portal_credentials pc
\t\tWHERE pc.user_id = st.user_id AND pc.portal_id = st.portal_id AND pc.is_active
\t)
ORDER BY st.priority ASC, st.created_at ASC
LIMIT 1
FOR UPDATE OF st SKIP LOCKED",
	)
	.fetch_optional(&mut *tx)
	.await?;
	let claimed = if let Some(mut claimed) = row {
		let moved = set_search_task_status(
			&mut *tx,
			TaskStatusChange {
				task_id: claimed.task.task_id,
				from: "queued",
				to: "running",
				error_message: None,
				now,
			},
		)
		.await?;

		if moved {
			claimed.task.status = "running".to_string();
			claimed.task.started_at = Some(now);
			claimed.task.updated_at = now;

			Some(claimed)
		} else {
			None
		}
	} else {
		None
	};

	tx.commit().await?;

	Ok(claimed)
}

pub async fn queue_stats<'e, E>(executor: E, user_id: Uuid) -> Result<QueueStats>
where
	E: PgExecutor<'e>,
{
	let stats = sqlx::query_as::<_, QueueStats>(
		"\
SELECT
\tCOUNT(*) FILTER (WHERE status = 'queued') AS queued,
\tCOUNT(*) FILTER (WHERE status = 'running') AS running,
\tCOUNT(*) FILTER (WHERE status = 'completed') AS completed,
\tCOUNT(*) FILTER (WHERE status = 'paused') AS paused,
\tCOUNT(*) FILTER (WHERE status = 'failed') AS failed,
\tCOUNT(*) AS total
FROM search_tasks
WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_one(executor)
	.await?;

	Ok(stats)
}
