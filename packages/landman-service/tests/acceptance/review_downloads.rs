use std::sync::Arc;

use uuid::Uuid;

use landman_domain::{
	assessment::AssessmentCriteria,
	review::{Decision, DownloadProgress},
};
use landman_service::{
	AnalysisPollRequest, DecisionRequest, DownloadStatusRequest, DownloadedDocumentsRequest, Error,
	ExecuteDownloadsRequest, LandmanService, MarkForDownloadRequest, ReviewView,
	StartAnalysisRequest,
};

use super::{SpyDownloader, StubAssessment};

async fn analyzed_reviews(
	service: &LandmanService,
	user_id: Uuid,
	task_id: Uuid,
	result_ids: Vec<Uuid>,
) -> Vec<ReviewView> {
	let started = service
		.start_analysis(StartAnalysisRequest {
			user_id,
			result_ids,
			criteria: AssessmentCriteria {
				party_name: "Smith Ranch LLC".to_string(),
				..AssessmentCriteria::default()
			},
		})
		.await
		.expect("Failed to start analysis.");

	super::wait_for_job(service, user_id, started.job_id).await;

	service
		.poll_analysis(AnalysisPollRequest { user_id, task_id })
		.await
		.expect("Failed to poll analysis.")
		.reviews
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn marking_only_counts_owned_reviews() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping marking_only_counts_owned_reviews; set LANDMAN_PG_DSN to run.");

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
	let (task, result_ids) = super::seed_task_with_results(&service, owner, portal_id, 2).await;
	let (other_task, other_ids) =
		super::seed_task_with_results(&service, stranger, portal_id, 1).await;
	let mine = analyzed_reviews(&service, owner, task.task_id, result_ids).await;
	let theirs = analyzed_reviews(&service, stranger, other_task.task_id, other_ids).await;
	let mut review_ids: Vec<_> = mine.iter().map(|review| review.review_id).collect();

	review_ids.push(theirs[0].review_id);

	let marked = service
		.mark_for_download(MarkForDownloadRequest { user_id: owner, review_ids })
		.await
		.expect("Failed to mark reviews.");

	assert_eq!(marked.marked, 2);

	let empty = service
		.mark_for_download(MarkForDownloadRequest { user_id: owner, review_ids: Vec::new() })
		.await;

	assert!(matches!(empty, Err(Error::InvalidRequest { .. })));

	let foreign_decision = service
		.record_decision(DecisionRequest {
			user_id: owner,
			review_id: theirs[0].review_id,
			decision: Decision::Approved,
			notes: None,
			mark_for_download: None,
		})
		.await;

	assert!(matches!(foreign_decision, Err(Error::Unauthorized { .. })));

	let rejected = service
		.record_decision(DecisionRequest {
			user_id: owner,
			review_id: mine[0].review_id,
			decision: Decision::Rejected,
			notes: None,
			mark_for_download: None,
		})
		.await
		.expect("Failed to record rejection.");

	assert!(!rejected.marked_for_download);

	let missing = service
		.record_decision(DecisionRequest {
			user_id: owner,
			review_id: Uuid::new_v4(),
			decision: Decision::NeedsReview,
			notes: None,
			mark_for_download: Some(true),
		})
		.await;

	assert!(matches!(missing, Err(Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn failed_downloads_stay_pending_until_retried() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping failed download retry test; set LANDMAN_PG_DSN to run.");

		return;
	};
	let downloader = Arc::new(SpyDownloader {
		fail_on: vec!["2019-00001".to_string()],
		..SpyDownloader::default()
	});
	let providers =
		super::providers(StubAssessment::new(super::MEETS_CRITERIA), downloader.clone());
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let portal_id = super::seed_portal(&service).await;
	let user_id = Uuid::new_v4();
	let (task, result_ids) = super::seed_task_with_results(&service, user_id, portal_id, 3).await;
	let nothing_marked = service
		.execute_downloads(ExecuteDownloadsRequest { user_id, task_id: task.task_id })
		.await;

	assert!(matches!(nothing_marked, Err(Error::Conflict { .. })));

	let reviews = analyzed_reviews(&service, user_id, task.task_id, result_ids).await;

	for review in &reviews {
		service
			.record_decision(DecisionRequest {
				user_id,
				review_id: review.review_id,
				decision: Decision::Approved,
				notes: None,
				mark_for_download: None,
			})
			.await
			.expect("Failed to approve review.");
	}

	let started = service
		.execute_downloads(ExecuteDownloadsRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to start downloads.");

	assert_eq!(started.queued, 3);

	let job = super::wait_for_job(&service, user_id, started.job_id).await;

	assert_eq!(job.succeeded_items, 2);
	assert_eq!(job.failed_items, 1);
	assert!(job.last_error.as_deref().is_some_and(|err| err.contains("404")));

	let status = service
		.download_status(DownloadStatusRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to load download status.");

	assert_eq!(status.downloaded_count, 2);
	assert_eq!(status.total_marked, 3);
	assert_eq!(status.status, DownloadProgress::InProgress);

	let documents = service
		.downloaded_documents(DownloadedDocumentsRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to list downloaded documents.");

	assert_eq!(documents.documents.len(), 2);
	assert!(documents.documents.iter().all(|doc| {
		doc.downloaded_at.is_some()
			&& doc.file_path.as_deref().is_some_and(|path| path.ends_with(".pdf"))
	}));

	let retry = service
		.execute_downloads(ExecuteDownloadsRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to retry downloads.");

	assert_eq!(retry.queued, 1);

	super::wait_for_job(&service, user_id, retry.job_id).await;

	let requested = downloader.requested.lock().expect("Downloader lock poisoned.").clone();

	assert_eq!(requested.len(), 4);
	assert_eq!(requested.iter().filter(|number| *number == "2019-00001").count(), 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn rejecting_a_downloaded_review_keeps_its_file() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping downloaded rejection test; set LANDMAN_PG_DSN to run.");

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
	let (task, result_ids) = super::seed_task_with_results(&service, user_id, portal_id, 1).await;
	let reviews = analyzed_reviews(&service, user_id, task.task_id, result_ids).await;
	let review_id = reviews[0].review_id;

	service
		.record_decision(DecisionRequest {
			user_id,
			review_id,
			decision: Decision::Approved,
			notes: None,
			mark_for_download: None,
		})
		.await
		.expect("Failed to approve review.");

	let started = service
		.execute_downloads(ExecuteDownloadsRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to start downloads.");
	let job = super::wait_for_job(&service, user_id, started.job_id).await;

	assert_eq!(job.succeeded_items, 1);

	for decision in [Decision::Rejected, Decision::NeedsReview] {
		let decided = service
			.record_decision(DecisionRequest {
				user_id,
				review_id,
				decision,
				notes: Some("Second look.".to_string()),
				mark_for_download: Some(false),
			})
			.await
			.expect("Failed to change decision on a downloaded review.");

		assert_eq!(decided.user_decision.as_deref(), Some(decision.as_str()));
		assert!(decided.marked_for_download);
		assert!(decided.downloaded_at.is_some());
		assert!(decided.file_path.is_some());
	}

	let status = service
		.download_status(DownloadStatusRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to load download status.");

	assert_eq!(status.downloaded_count, 1);
	assert_eq!(status.total_marked, 1);
	assert_eq!(status.status, DownloadProgress::Complete);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
