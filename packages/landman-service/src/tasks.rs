use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, LandmanService, Result};
use landman_domain::task::{self as rules, DEFAULT_PRIORITY, PartyRole, TaskStatus};
use landman_storage::{
	models::{QueueStats, SearchTask},
	portals,
	tasks::{self as task_store, TaskStatusChange},
};

const DEFAULT_PAGE_LIMIT: u32 = 50;
const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTaskRequest {
	pub user_id: Uuid,
	pub organization_id: Option<Uuid>,
	pub portal_id: Uuid,
	pub county_id: Uuid,
	pub party_name: String,
	#[serde(default)]
	pub party_role: PartyRole,
	#[serde(with = "crate::time_serde::date")]
	pub date_from: Date,
	#[serde(with = "crate::time_serde::date")]
	pub date_to: Date,
	pub legal_description: Option<String>,
	pub document_reference: Option<String>,
	pub priority: Option<i32>,
	pub notes: Option<String>,
}

/// Partial edit of a task's search parameters. Absent fields are left unchanged and blank
/// strings clear optional text fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
	pub party_name: Option<String>,
	pub party_role: Option<PartyRole>,
	#[serde(default, with = "crate::time_serde::date::option")]
	pub date_from: Option<Date>,
	#[serde(default, with = "crate::time_serde::date::option")]
	pub date_to: Option<Date>,
	pub legal_description: Option<String>,
	pub document_reference: Option<String>,
	pub priority: Option<i32>,
	pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskGetRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskListRequest {
	pub user_id: Uuid,
	pub status: Option<TaskStatus>,
	pub page: Option<u32>,
	pub limit: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
	pub tasks: Vec<TaskView>,
	pub page: u32,
	pub limit: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskStatusRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
	pub status: TaskStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskPriorityRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
	pub priority: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDeleteRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDeleteResponse {
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStatsRequest {
	pub user_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStatsResponse {
	pub queued: i64,
	pub running: i64,
	pub completed: i64,
	pub paused: i64,
	pub failed: i64,
	pub total: i64,
}
impl From<QueueStats> for QueueStatsResponse {
	fn from(stats: QueueStats) -> Self {
		Self {
			queued: stats.queued,
			running: stats.running,
			completed: stats.completed,
			paused: stats.paused,
			failed: stats.failed,
			total: stats.total,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskView {
	pub task_id: Uuid,
	pub organization_id: Option<Uuid>,
	pub user_id: Uuid,
	pub portal_id: Uuid,
	pub county_id: Uuid,
	pub party_name: String,
	pub party_role: String,
	#[serde(with = "crate::time_serde::date")]
	pub date_from: Date,
	#[serde(with = "crate::time_serde::date")]
	pub date_to: Date,
	pub legal_description: Option<String>,
	pub document_reference: Option<String>,
	pub priority: i32,
	pub status: String,
	pub notes: Option<String>,
	pub error_message: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub completed_at: Option<OffsetDateTime>,
}
impl From<SearchTask> for TaskView {
	fn from(task: SearchTask) -> Self {
		Self {
			task_id: task.task_id,
			organization_id: task.organization_id,
			user_id: task.user_id,
			portal_id: task.portal_id,
			county_id: task.county_id,
			party_name: task.party_name,
			party_role: task.party_role,
			date_from: task.date_from,
			date_to: task.date_to,
			legal_description: task.legal_description,
			document_reference: task.document_reference,
			priority: task.priority,
			status: task.status,
			notes: task.notes,
			error_message: task.error_message,
			created_at: task.created_at,
			updated_at: task.updated_at,
			started_at: task.started_at,
			completed_at: task.completed_at,
		}
	}
}

impl LandmanService {
	pub async fn create_task(&self, req: CreateTaskRequest) -> Result<TaskView> {
		let party_name = req.party_name.trim();

		if party_name.is_empty() {
			return Err(Error::InvalidRequest { message: "party_name is required.".to_string() });
		}

		rules::validate_date_range(req.date_from, req.date_to)?;

		let priority = rules::validate_priority(req.priority.unwrap_or(DEFAULT_PRIORITY))?;

		portals::get_portal(&self.db.pool, req.portal_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Portal not found.".to_string() })?;

		let now = OffsetDateTime::now_utc();
		let task = SearchTask {
			task_id: Uuid::new_v4(),
			organization_id: req.organization_id,
			user_id: req.user_id,
			portal_id: req.portal_id,
			county_id: req.county_id,
			party_name: party_name.to_string(),
			party_role: req.party_role.as_str().to_string(),
			date_from: req.date_from,
			date_to: req.date_to,
			legal_description: non_blank(req.legal_description),
			document_reference: non_blank(req.document_reference),
			priority,
			status: TaskStatus::Queued.as_str().to_string(),
			notes: non_blank(req.notes),
			error_message: None,
			created_at: now,
			updated_at: now,
			started_at: None,
			completed_at: None,
		};

		task_store::insert_search_task(&self.db.pool, &task).await?;

		tracing::info!(task_id = %task.task_id, priority, "Search task queued.");

		Ok(task.into())
	}

	pub async fn get_task(&self, req: TaskGetRequest) -> Result<TaskView> {
		Ok(self.owned_task(req.user_id, req.task_id).await?.into())
	}

	pub async fn list_tasks(&self, req: TaskListRequest) -> Result<TaskListResponse> {
		let page = req.page.unwrap_or(1);

		if page == 0 {
			return Err(Error::InvalidRequest {
				message: "page must be greater than zero.".to_string(),
			});
		}

		let limit = req.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
		let offset = i64::from(page - 1) * i64::from(limit);
		let tasks = task_store::list_search_tasks(
			&self.db.pool,
			req.user_id,
			req.status.map(TaskStatus::as_str),
			i64::from(limit),
			offset,
		)
		.await?;

		Ok(TaskListResponse { tasks: tasks.into_iter().map(TaskView::from).collect(), page, limit })
	}

	/// Edits search parameters. Completed and failed tasks are frozen.
	pub async fn update_task(&self, req: UpdateTaskRequest) -> Result<TaskView> {
		let mut tx = self.db.pool.begin().await?;
		let mut task = task_store::lock_search_task(&mut *tx, req.task_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Search task not found.".to_string() })?;

		crate::ensure_owner(task.user_id, req.user_id, "Search task")?;
		rules::check_editable(crate::stored_task_status(&task)?)?;

		if let Some(party_name) = req.party_name {
			let party_name = party_name.trim();

			if party_name.is_empty() {
				return Err(Error::InvalidRequest {
					message: "party_name must not be blank.".to_string(),
				});
			}

			task.party_name = party_name.to_string();
		}
		if let Some(party_role) = req.party_role {
			task.party_role = party_role.as_str().to_string();
		}
		if let Some(date_from) = req.date_from {
			task.date_from = date_from;
		}
		if let Some(date_to) = req.date_to {
			task.date_to = date_to;
		}
		if let Some(priority) = req.priority {
			task.priority = rules::validate_priority(priority)?;
		}
		if req.legal_description.is_some() {
			task.legal_description = non_blank(req.legal_description);
		}
		if req.document_reference.is_some() {
			task.document_reference = non_blank(req.document_reference);
		}
		if req.notes.is_some() {
			task.notes = non_blank(req.notes);
		}

		rules::validate_date_range(task.date_from, task.date_to)?;

		task.updated_at = OffsetDateTime::now_utc();

		task_store::update_search_task_fields(&mut *tx, &task).await?;

		tx.commit().await?;

		Ok(task.into())
	}

	/// Owner override of a task's status. Only `queued` and `paused` can be requested.
	pub async fn set_task_status(&self, req: TaskStatusRequest) -> Result<TaskView> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let task = task_store::lock_search_task(&mut *tx, req.task_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Search task not found.".to_string() })?;

		crate::ensure_owner(task.user_id, req.user_id, "Search task")?;

		let from = crate::stored_task_status(&task)?;

		rules::check_user_override(from, req.status)?;

		let moved = task_store::set_search_task_status(
			&mut *tx,
			TaskStatusChange {
				task_id: task.task_id,
				from: from.as_str(),
				to: req.status.as_str(),
				error_message: None,
				now,
			},
		)
		.await?;

		if !moved {
			return Err(Error::Conflict {
				message: "Search task status changed concurrently.".to_string(),
			});
		}

		let updated = task_store::get_search_task(&mut *tx, task.task_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Search task not found.".to_string() })?;

		tx.commit().await?;

		tracing::info!(
			task_id = %task.task_id,
			from = %from,
			to = %req.status,
			"Search task status overridden."
		);

		Ok(updated.into())
	}

	pub async fn set_task_priority(&self, req: TaskPriorityRequest) -> Result<TaskView> {
		let priority = rules::validate_priority(req.priority)?;
		let task = self.owned_task(req.user_id, req.task_id).await?;

		task_store::update_search_task_priority(
			&self.db.pool,
			task.task_id,
			priority,
			OffsetDateTime::now_utc(),
		)
		.await?;

		Ok(self.owned_task(req.user_id, req.task_id).await?.into())
	}

	/// Deletes a task that has not started yet. Its results and reviews go with it.
	pub async fn delete_task(&self, req: TaskDeleteRequest) -> Result<TaskDeleteResponse> {
		let mut tx = self.db.pool.begin().await?;
		let task = task_store::lock_search_task(&mut *tx, req.task_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Search task not found.".to_string() })?;

		crate::ensure_owner(task.user_id, req.user_id, "Search task")?;

		let status = crate::stored_task_status(&task)?;

		rules::check_deletable(status)?;

		if !task_store::delete_search_task(&mut *tx, task.task_id, status.as_str()).await? {
			return Err(Error::Conflict {
				message: "Search task status changed concurrently.".to_string(),
			});
		}

		tx.commit().await?;

		Ok(TaskDeleteResponse { task_id: task.task_id })
	}

	pub async fn queue_stats(&self, req: QueueStatsRequest) -> Result<QueueStatsResponse> {
		Ok(task_store::queue_stats(&self.db.pool, req.user_id).await?.into())
	}
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
	value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_text_is_cleared() {
		assert_eq!(non_blank(Some("  ".to_string())), None);
		assert_eq!(non_blank(Some(" Lot 4 ".to_string())), Some("Lot 4".to_string()));
		assert_eq!(non_blank(None), None);
	}

	#[test]
	fn create_request_defaults_party_role_to_both() {
		let req: CreateTaskRequest = serde_json::from_value(serde_json::json!({
			"user_id": Uuid::nil(),
			"organization_id": null,
			"portal_id": Uuid::nil(),
			"county_id": Uuid::nil(),
			"party_name": "John Smith",
			"date_from": "2000-01-01",
			"date_to": "2020-12-31",
			"legal_description": null,
			"document_reference": null,
			"priority": null,
			"notes": null
		}))
		.expect("Failed to parse request.");

		assert_eq!(req.party_role, PartyRole::Both);
		assert_eq!(req.date_to, time::macros::date!(2020 - 12 - 31));
	}
}
