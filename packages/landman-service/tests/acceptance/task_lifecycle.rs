use std::sync::Arc;

use time::macros::date;
use uuid::Uuid;

use landman_domain::task::TaskStatus;
use landman_service::{
	Error, QueueStatsRequest, TaskDeleteRequest, TaskGetRequest, TaskListRequest,
	TaskPriorityRequest, TaskStatusRequest, UpdateTaskRequest,
};

use super::{SpyDownloader, StubAssessment};

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn task_edits_follow_lifecycle_rules() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping task_edits_follow_lifecycle_rules; set LANDMAN_PG_DSN to run.");

		return;
	};
	let providers = super::providers(
		StubAssessment::new(super::MEETS_CRITERIA),
		Arc::new(SpyDownloader::default()),
	);
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let portal_id = super::seed_portal(&service).await;
	let user_id = Uuid::new_v4();
	let task = service
		.create_task(super::create_request(user_id, portal_id))
		.await
		.expect("Failed to create task.");

	assert_eq!(task.status, "queued");
	assert_eq!(task.priority, 5);

	let updated = service
		.update_task(UpdateTaskRequest {
			user_id,
			task_id: task.task_id,
			party_name: Some("  Doe Minerals  ".to_string()),
			notes: Some("   ".to_string()),
			..UpdateTaskRequest::default()
		})
		.await
		.expect("Failed to update task.");

	assert_eq!(updated.party_name, "Doe Minerals");
	assert_eq!(updated.notes, None);

	let inverted = service
		.update_task(UpdateTaskRequest {
			user_id,
			task_id: task.task_id,
			date_from: Some(date!(2030 - 01 - 01)),
			..UpdateTaskRequest::default()
		})
		.await;

	assert!(matches!(inverted, Err(Error::InvalidRequest { .. })));

	let paused = service
		.set_task_status(TaskStatusRequest {
			user_id,
			task_id: task.task_id,
			status: TaskStatus::Paused,
		})
		.await
		.expect("Failed to pause task.");

	assert_eq!(paused.status, "paused");

	let forced = service
		.set_task_status(TaskStatusRequest {
			user_id,
			task_id: task.task_id,
			status: TaskStatus::Completed,
		})
		.await;

	assert!(matches!(forced, Err(Error::Conflict { .. })));

	let delete_paused =
		service.delete_task(TaskDeleteRequest { user_id, task_id: task.task_id }).await;

	assert!(matches!(delete_paused, Err(Error::Conflict { .. })));

	service
		.set_task_status(TaskStatusRequest {
			user_id,
			task_id: task.task_id,
			status: TaskStatus::Queued,
		})
		.await
		.expect("Failed to resume task.");

	let bumped = service
		.set_task_priority(TaskPriorityRequest { user_id, task_id: task.task_id, priority: 9 })
		.await
		.expect("Failed to set priority.");

	assert_eq!(bumped.priority, 9);

	let out_of_range = service
		.set_task_priority(TaskPriorityRequest { user_id, task_id: task.task_id, priority: 11 })
		.await;

	assert!(matches!(out_of_range, Err(Error::InvalidRequest { .. })));

	let stats = service
		.queue_stats(QueueStatsRequest { user_id })
		.await
		.expect("Failed to load queue stats.");

	assert_eq!(stats.queued, 1);
	assert_eq!(stats.total, 1);

	service
		.delete_task(TaskDeleteRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to delete queued task.");

	let gone = service.get_task(TaskGetRequest { user_id, task_id: task.task_id }).await;

	assert!(matches!(gone, Err(Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn tasks_are_scoped_to_their_owner() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping tasks_are_scoped_to_their_owner; set LANDMAN_PG_DSN to run.");

		return;
	};
	let providers = super::providers(
		StubAssessment::new(super::MEETS_CRITERIA),
		Arc::new(SpyDownloader::default()),
	);
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let portal_id = super::seed_portal(&service).await;
	let owner = Uuid::new_v4();
	let stranger = Uuid::new_v4();

	for _ in 0..3 {
		service
			.create_task(super::create_request(owner, portal_id))
			.await
			.expect("Failed to create task.");
	}

	let listed = service
		.list_tasks(TaskListRequest { user_id: owner, status: None, page: Some(2), limit: Some(2) })
		.await
		.expect("Failed to list tasks.");

	assert_eq!(listed.tasks.len(), 1);
	assert_eq!(listed.page, 2);

	let foreign = service
		.get_task(TaskGetRequest { user_id: stranger, task_id: listed.tasks[0].task_id })
		.await;

	assert!(matches!(foreign, Err(Error::Unauthorized { .. })));

	let page_zero = service
		.list_tasks(TaskListRequest { user_id: owner, status: None, page: Some(0), limit: None })
		.await;

	assert!(matches!(page_zero, Err(Error::InvalidRequest { .. })));

	let unknown_portal =
		service.create_task(super::create_request(owner, Uuid::new_v4())).await;

	assert!(matches!(unknown_portal, Err(Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
