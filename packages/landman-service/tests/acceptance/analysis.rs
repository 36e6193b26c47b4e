use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use uuid::Uuid;

use landman_config::LlmProviderConfig;
use landman_domain::{assessment::AssessmentCriteria, review::Decision};
use landman_service::{
	AnalysisPollRequest, AssessmentProvider, BoxFuture, DecisionRequest, Error,
	ReviewStatsRequest, StartAnalysisRequest,
};

use super::{SpyDownloader, StubAssessment};

const EXCLUDE: &str = r#"{"assessment":"exclude","confidence":0.8,"evidence":"Different party."}"#;

/// Answers the first call slowly with a match and every later call at once with an exclusion.
#[derive(Default)]
struct SlowThenFast {
	calls: AtomicUsize,
}
impl AssessmentProvider for SlowThenFast {
	fn assess<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_prompt: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if call == 0 {
				tokio::time::sleep(Duration::from_millis(400)).await;

				return Ok(super::MEETS_CRITERIA.to_string());
			}

			Ok(EXCLUDE.to_string())
		})
	}
}

fn criteria() -> AssessmentCriteria {
	AssessmentCriteria {
		party_name: "Smith Ranch LLC".to_string(),
		..AssessmentCriteria::default()
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn analysis_writes_outcomes_and_reruns_reuse_the_review() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping analysis rerun test; set LANDMAN_PG_DSN to run.");

		return;
	};
	let assessment = StubAssessment::new(super::MEETS_CRITERIA);
	let providers = super::providers(assessment.clone(), Arc::new(SpyDownloader::default()));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let portal_id = super::seed_portal(&service).await;
	let user_id = Uuid::new_v4();
	let (task, result_ids) = super::seed_task_with_results(&service, user_id, portal_id, 3).await;
	let mut requested = result_ids.clone();

	requested.push(Uuid::new_v4());

	let started = service
		.start_analysis(StartAnalysisRequest {
			user_id,
			result_ids: requested,
			criteria: criteria(),
		})
		.await
		.expect("Failed to start analysis.");

	assert_eq!(started.queued, 3);

	let job = super::wait_for_job(&service, user_id, started.job_id).await;

	assert_eq!(job.kind, "assessment");
	assert_eq!(job.task_id, Some(task.task_id));
	assert_eq!(job.succeeded_items, 3);
	assert_eq!(assessment.calls.load(Ordering::SeqCst), 3);

	let polled = service
		.poll_analysis(AnalysisPollRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to poll analysis.");

	assert_eq!(polled.total, 3);
	assert_eq!(polled.analyzed, 3);
	assert!(polled.analysis_complete);
	assert!(polled.reviews.iter().all(|review| review.ai_assessment == "meets_criteria"));

	let first = polled.reviews[0].clone();
	let decided = service
		.record_decision(DecisionRequest {
			user_id,
			review_id: first.review_id,
			decision: Decision::Approved,
			notes: Some("Matches the chain of title.".to_string()),
			mark_for_download: None,
		})
		.await
		.expect("Failed to record decision.");

	assert!(decided.user_confirmed);
	assert!(decided.marked_for_download);

	let rerun = service
		.start_analysis(StartAnalysisRequest {
			user_id,
			result_ids: vec![first.result_id],
			criteria: criteria(),
		})
		.await
		.expect("Failed to restart analysis.");

	super::wait_for_job(&service, user_id, rerun.job_id).await;

	let polled = service
		.poll_analysis(AnalysisPollRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to poll analysis.");
	let again = polled
		.reviews
		.iter()
		.find(|review| review.result_id == first.result_id)
		.expect("Missing review after re-analysis.");

	assert_eq!(polled.total, 3);
	assert_eq!(again.review_id, first.review_id);
	assert_eq!(again.user_decision.as_deref(), Some("approved"));
	assert!(again.marked_for_download);

	let stats = service
		.review_stats(ReviewStatsRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to load review stats.");

	assert_eq!(stats.total, 3);
	assert_eq!(stats.meets_criteria, 3);
	assert_eq!(stats.user_reviewed, 1);
	assert_eq!(stats.marked_for_download, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn analysis_skips_foreign_results_and_handles_bad_replies() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping foreign analysis test; set LANDMAN_PG_DSN to run.");

		return;
	};
	let assessment = StubAssessment::new("The model rambled without JSON.");
	let providers = super::providers(assessment.clone(), Arc::new(SpyDownloader::default()));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let portal_id = super::seed_portal(&service).await;
	let owner = Uuid::new_v4();
	let stranger = Uuid::new_v4();
	let (task, result_ids) = super::seed_task_with_results(&service, owner, portal_id, 2).await;
	let foreign = service
		.start_analysis(StartAnalysisRequest {
			user_id: stranger,
			result_ids: result_ids.clone(),
			criteria: criteria(),
		})
		.await
		.expect("Failed to start foreign analysis.");

	assert_eq!(foreign.queued, 0);

	let job = super::wait_for_job(&service, stranger, foreign.job_id).await;

	assert_eq!(job.total_items, 0);
	assert_eq!(assessment.calls.load(Ordering::SeqCst), 0);

	let empty = service
		.start_analysis(StartAnalysisRequest {
			user_id: owner,
			result_ids: Vec::new(),
			criteria: criteria(),
		})
		.await;

	assert!(matches!(empty, Err(Error::InvalidRequest { .. })));

	let started = service
		.start_analysis(StartAnalysisRequest { user_id: owner, result_ids, criteria: criteria() })
		.await
		.expect("Failed to start analysis.");

	super::wait_for_job(&service, owner, started.job_id).await;

	let polled = service
		.poll_analysis(AnalysisPollRequest { user_id: owner, task_id: task.task_id })
		.await
		.expect("Failed to poll analysis.");

	assert_eq!(polled.analyzed, 0);
	assert!(!polled.analysis_complete);

	for review in &polled.reviews {
		assert_eq!(review.ai_assessment, "pending");
		assert_eq!(review.ai_confidence, Some(0.5));
		assert!(
			review
				.ai_evidence
				.as_deref()
				.is_some_and(|evidence| evidence.contains("The model rambled"))
		);
	}

	let foreign_poll = service
		.poll_analysis(AnalysisPollRequest { user_id: stranger, task_id: task.task_id })
		.await;

	assert!(matches!(foreign_poll, Err(Error::Unauthorized { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LANDMAN_PG_DSN to run."]
async fn overlapping_runs_keep_the_latest_outcome() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping overlapping analysis test; set LANDMAN_PG_DSN to run.");

		return;
	};
	let assessment = Arc::new(SlowThenFast::default());
	let providers = super::providers(assessment.clone(), Arc::new(SpyDownloader::default()));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let portal_id = super::seed_portal(&service).await;
	let user_id = Uuid::new_v4();
	let (task, result_ids) = super::seed_task_with_results(&service, user_id, portal_id, 1).await;
	let older = service
		.start_analysis(StartAnalysisRequest {
			user_id,
			result_ids: result_ids.clone(),
			criteria: criteria(),
		})
		.await
		.expect("Failed to start analysis.");

	for _ in 0..100 {
		if assessment.calls.load(Ordering::SeqCst) > 0 {
			break;
		}

		tokio::time::sleep(Duration::from_millis(5)).await;
	}

	assert_eq!(assessment.calls.load(Ordering::SeqCst), 1);

	let newer = service
		.start_analysis(StartAnalysisRequest { user_id, result_ids, criteria: criteria() })
		.await
		.expect("Failed to restart analysis.");
	let newer_job = super::wait_for_job(&service, user_id, newer.job_id).await;
	let older_job = super::wait_for_job(&service, user_id, older.job_id).await;

	assert_eq!(newer_job.succeeded_items, 1);
	assert_eq!(older_job.succeeded_items, 0);
	assert_eq!(older_job.failed_items, 1);
	assert!(older_job.last_error.as_deref().is_some_and(|err| err.contains("Superseded")));

	let polled = service
		.poll_analysis(AnalysisPollRequest { user_id, task_id: task.task_id })
		.await
		.expect("Failed to poll analysis.");

	assert_eq!(polled.reviews.len(), 1);
	assert_eq!(polled.reviews[0].ai_assessment, "exclude");
	assert!(polled.analysis_complete);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
