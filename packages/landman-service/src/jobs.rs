use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, LandmanService, Result, ensure_owner};
use landman_storage::{jobs as job_store, models::PipelineJob};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobGetRequest {
	pub user_id: Uuid,
	pub job_id: Uuid,
}

/// Progress of a background assessment or download run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobView {
	pub job_id: Uuid,
	pub kind: String,
	pub task_id: Option<Uuid>,
	pub status: String,
	pub total_items: i32,
	pub succeeded_items: i32,
	pub failed_items: i32,
	pub last_error: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub finished_at: Option<OffsetDateTime>,
}
impl From<PipelineJob> for JobView {
	fn from(job: PipelineJob) -> Self {
		Self {
			job_id: job.job_id,
			kind: job.kind,
			task_id: job.task_id,
			status: job.status,
			total_items: job.total_items,
			succeeded_items: job.succeeded_items,
			failed_items: job.failed_items,
			last_error: job.last_error,
			created_at: job.created_at,
			updated_at: job.updated_at,
			finished_at: job.finished_at,
		}
	}
}

impl LandmanService {
	pub async fn get_pipeline_job(&self, req: JobGetRequest) -> Result<JobView> {
		let job = job_store::get_pipeline_job(&self.db.pool, req.job_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Pipeline job not found.".to_string() })?;

		ensure_owner(job.user_id, req.user_id, "Pipeline job")?;

		Ok(job.into())
	}
}
