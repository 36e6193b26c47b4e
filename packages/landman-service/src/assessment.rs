//! Batch assessment: AI relevance review of discovered documents.
//!
//! A trigger prepares one pending review per accepted document, records a pipeline job, and hands
//! the work to a background coordinator. The coordinator calls the model for at most
//! `assessment.concurrency` documents at a time, pauses between batches, and writes each outcome
//! back to the AI stage of its review. Progress is observed by polling the job or the task.

use std::{future::Future, sync::Arc, time::Duration};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{AssessmentProvider, Error, LandmanService, Result};
use landman_config::LlmProviderConfig;
use landman_domain::{
	assessment::{self as assessment_rules, AssessmentCriteria, AssessmentOutcome, DocumentFacts},
	review::{self as review_rules, Assessment},
};
use landman_storage::{
	db::Db,
	jobs as job_store,
	models::{AssessmentUpdate, PipelineJob, ReviewStats, ReviewedDocument},
	results as result_store, reviews as review_store,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartAnalysisRequest {
	pub user_id: Uuid,
	pub result_ids: Vec<Uuid>,
	pub criteria: AssessmentCriteria,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartAnalysisResponse {
	pub job_id: Uuid,
	/// Documents accepted for analysis. Unknown and foreign ids are not counted.
	pub queued: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisPollRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisPollResponse {
	pub task_id: Uuid,
	pub total: i64,
	pub analyzed: i64,
	pub analysis_complete: bool,
	pub reviews: Vec<ReviewView>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewStatsRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewStatsResponse {
	pub total: i64,
	pub meets_criteria: i64,
	pub probable_match: i64,
	pub exclude: i64,
	pub pending: i64,
	pub user_reviewed: i64,
	pub marked_for_download: i64,
	pub downloaded: i64,
}
impl From<ReviewStats> for ReviewStatsResponse {
	fn from(stats: ReviewStats) -> Self {
		Self {
			total: stats.total,
			meets_criteria: stats.meets_criteria,
			probable_match: stats.probable_match,
			exclude: stats.exclude,
			pending: stats.pending,
			user_reviewed: stats.user_reviewed,
			marked_for_download: stats.marked_for_download,
			downloaded: stats.downloaded,
		}
	}
}

/// A review with the metadata of the document it covers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewView {
	pub review_id: Uuid,
	pub result_id: Uuid,
	pub task_id: Uuid,
	pub document_number: String,
	#[serde(with = "crate::time_serde::date::option")]
	pub recording_date: Option<Date>,
	pub grantor: Option<String>,
	pub grantee: Option<String>,
	pub document_type: Option<String>,
	pub page_count: Option<i32>,
	pub portal_url: Option<String>,
	pub ai_assessment: String,
	pub ai_confidence: Option<f32>,
	pub ai_evidence: Option<String>,
	pub ai_relevant_pages: Option<String>,
	pub ai_quotes: Option<String>,
	pub ai_match_details: Value,
	#[serde(with = "crate::time_serde::option")]
	pub ai_analyzed_at: Option<OffsetDateTime>,
	pub user_decision: Option<String>,
	pub user_notes: Option<String>,
	pub user_confirmed: bool,
	pub marked_for_download: bool,
	#[serde(with = "crate::time_serde::option")]
	pub downloaded_at: Option<OffsetDateTime>,
	pub file_path: Option<String>,
}
impl From<ReviewedDocument> for ReviewView {
	fn from(doc: ReviewedDocument) -> Self {
		let review = doc.review;

		Self {
			review_id: review.review_id,
			result_id: review.result_id,
			task_id: doc.task_id,
			document_number: doc.document_number,
			recording_date: doc.recording_date,
			grantor: doc.grantor,
			grantee: doc.grantee,
			document_type: doc.document_type,
			page_count: doc.page_count,
			portal_url: doc.portal_url,
			ai_assessment: review.ai_assessment,
			ai_confidence: review.ai_confidence,
			ai_evidence: review.ai_evidence,
			ai_relevant_pages: review.ai_relevant_pages,
			ai_quotes: review.ai_quotes,
			ai_match_details: review.ai_match_details,
			ai_analyzed_at: review.ai_analyzed_at,
			user_decision: review.user_decision,
			user_notes: review.user_notes,
			user_confirmed: review.user_confirmed,
			marked_for_download: review.marked_for_download,
			downloaded_at: review.downloaded_at,
			file_path: review.file_path,
		}
	}
}

/// Outcome for one document. `error` is set when the model call failed or timed out.
#[derive(Clone, Debug)]
pub struct AssessedDocument {
	pub outcome: AssessmentOutcome,
	pub error: Option<String>,
}

/// Calls the assessment model in bounded, paced batches.
#[derive(Clone)]
pub struct BatchAssessor {
	provider: Arc<dyn AssessmentProvider>,
	llm: LlmProviderConfig,
	settings: landman_config::Assessment,
}
impl BatchAssessor {
	pub fn new(
		provider: Arc<dyn AssessmentProvider>,
		llm: LlmProviderConfig,
		settings: landman_config::Assessment,
	) -> Self {
		Self { provider, llm, settings }
	}

	pub fn batch_size(&self) -> usize {
		(self.settings.concurrency as usize).max(1)
	}

	/// Assesses one document. Failures never escape; they become pending outcomes.
	pub async fn assess_one(
		&self,
		doc: &DocumentFacts,
		criteria: &AssessmentCriteria,
	) -> AssessedDocument {
		let prompt = assessment_rules::build_prompt(doc, criteria);
		let call = self.provider.assess(&self.llm, &prompt);
		let timeout = Duration::from_millis(self.settings.timeout_ms);
		let error = match tokio::time::timeout(timeout, call).await {
			Ok(Ok(text)) =>
				return AssessedDocument {
					outcome: AssessmentOutcome::from_response_text(&text),
					error: None,
				},
			Ok(Err(err)) => err.to_string(),
			Err(_) => format!("Assessment timed out after {} ms.", self.settings.timeout_ms),
		};

		tracing::warn!(
			document_number = %doc.document_number,
			error = %error,
			"Assessment call failed."
		);

		AssessedDocument { outcome: AssessmentOutcome::call_failed(&error), error: Some(error) }
	}

	/// Runs `docs` in batches of [`Self::batch_size`], waiting `batch_delay_ms` between batches.
	///
	/// `on_batch` receives the offset of the batch's first document and the batch outcomes in
	/// input order.
	pub async fn assess_in_batches<F, Fut>(
		&self,
		docs: &[DocumentFacts],
		criteria: &AssessmentCriteria,
		mut on_batch: F,
	) where
		F: FnMut(usize, Vec<AssessedDocument>) -> Fut,
		Fut: Future<Output = ()>,
	{
		let size = self.batch_size();
		let delay = Duration::from_millis(self.settings.batch_delay_ms);

		for (index, batch) in docs.chunks(size).enumerate() {
			if index > 0 && !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			let assessed = join_all(batch.iter().map(|doc| self.assess_one(doc, criteria))).await;

			on_batch(index * size, assessed).await;
		}
	}
}

const SUPERSEDED: &str = "Superseded by a newer analysis run.";

struct AssessmentItem {
	review_id: Uuid,
	facts: DocumentFacts,
}

struct AssessmentJob {
	db: Db,
	assessor: BatchAssessor,
	job_id: Uuid,
	criteria: AssessmentCriteria,
	items: Vec<AssessmentItem>,
}
impl AssessmentJob {
	async fn run(self) {
		let (review_ids, docs): (Vec<Uuid>, Vec<DocumentFacts>) =
			self.items.into_iter().map(|item| (item.review_id, item.facts)).unzip();
		let db = &self.db;
		let review_ids = &review_ids;
		let job_id = self.job_id;

		self.assessor
			.assess_in_batches(&docs, &self.criteria, move |offset, assessed| async move {
				for (review_id, doc) in review_ids[offset..].iter().zip(assessed) {
					if let Err(err) = write_outcome(db, job_id, *review_id, &doc).await {
						tracing::error!(
							error = %err,
							review_id = %review_id,
							"Failed to store assessment outcome."
						);
					}
				}
			})
			.await;

		let finished = job_store::finish_pipeline_job(&db.pool, job_id, OffsetDateTime::now_utc());

		if let Err(err) = finished.await {
			tracing::error!(error = %err, job_id = %job_id, "Failed to finish assessment job.");
		}

		tracing::info!(job_id = %job_id, documents = docs.len(), "Assessment job finished.");
	}
}

async fn write_outcome(
	db: &Db,
	job_id: Uuid,
	review_id: Uuid,
	doc: &AssessedDocument,
) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let outcome = &doc.outcome;
	let match_details = Value::Object(outcome.match_details.clone());
	let written = review_store::write_assessment(
		&db.pool,
		review_id,
		job_id,
		&AssessmentUpdate {
			assessment: outcome.assessment.as_str(),
			confidence: outcome.confidence,
			evidence: &outcome.evidence,
			quotes: &outcome.quotes,
			relevant_pages: &outcome.relevant_pages,
			match_details: &match_details,
		},
		now,
	)
	.await?;
	let error = if written {
		doc.error.as_deref()
	} else {
		tracing::info!(
			job_id = %job_id,
			review_id = %review_id,
			"Assessment outcome dropped; a newer run owns the review."
		);

		Some(SUPERSEDED)
	};

	job_store::record_pipeline_job_item(&db.pool, job_id, error, now).await?;

	Ok(())
}

impl LandmanService {
	/// Queues AI review of the given results and returns without waiting for the model.
	///
	/// Re-running analysis resets the AI stage of the existing review to pending and keeps the
	/// human decision and download state.
	pub async fn start_analysis(&self, req: StartAnalysisRequest) -> Result<StartAnalysisResponse> {
		if req.result_ids.is_empty() {
			return Err(Error::InvalidRequest {
				message: "result_ids must not be empty.".to_string(),
			});
		}
		if req.criteria.party_name.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "criteria.party_name is required.".to_string(),
			});
		}
		if let (Some(from), Some(to)) = (req.criteria.date_from, req.criteria.date_to) {
			landman_domain::task::validate_date_range(from, to)?;
		}

		let now = OffsetDateTime::now_utc();
		let owned = result_store::list_owned_search_results(&self.db.pool, &req.result_ids).await?;
		let accepted: Vec<_> =
			owned.into_iter().filter(|row| row.owner_id == req.user_id).collect();
		let single_task = accepted
			.first()
			.map(|row| row.result.task_id)
			.filter(|task_id| accepted.iter().all(|row| row.result.task_id == *task_id));
		let job_id = Uuid::new_v4();
		let mut tx = self.db.pool.begin().await?;
		let mut items = Vec::with_capacity(accepted.len());

		for row in accepted {
			let review = review_store::prepare_pending_review(
				&mut *tx,
				row.result.result_id,
				req.user_id,
				job_id,
				now,
			)
			.await?;
			let result = row.result;

			items.push(AssessmentItem {
				review_id: review.review_id,
				facts: DocumentFacts {
					document_number: result.document_number,
					document_type: result.document_type,
					recording_date: result.recording_date,
					grantor: result.grantor,
					grantee: result.grantee,
					legal_description: result.legal_description,
					page_count: result.page_count,
				},
			});
		}

		let status = if items.is_empty() { "finished" } else { "running" };
		let job = PipelineJob {
			job_id,
			kind: "assessment".to_string(),
			task_id: single_task,
			user_id: req.user_id,
			status: status.to_string(),
			total_items: items.len() as i32,
			succeeded_items: 0,
			failed_items: 0,
			last_error: None,
			created_at: now,
			updated_at: now,
			finished_at: items.is_empty().then_some(now),
		};

		job_store::insert_pipeline_job(&mut *tx, &job).await?;

		tx.commit().await?;

		let queued = items.len();

		tracing::info!(job_id = %job.job_id, queued, "Assessment job queued.");

		if !items.is_empty() {
			let run = AssessmentJob {
				db: self.db.clone(),
				assessor: self.batch_assessor(),
				job_id: job.job_id,
				criteria: req.criteria,
				items,
			};

			tokio::spawn(run.run());
		}

		Ok(StartAnalysisResponse { job_id: job.job_id, queued })
	}

	pub async fn poll_analysis(&self, req: AnalysisPollRequest) -> Result<AnalysisPollResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;
		let reviews =
			review_store::list_task_reviews(&self.db.pool, task.task_id, req.user_id).await?;
		let total = reviews.len() as i64;
		let analyzed = reviews
			.iter()
			.filter(|doc| {
				doc.review.ai_assessment.parse::<Assessment>().is_ok_and(Assessment::is_analyzed)
			})
			.count() as i64;

		Ok(AnalysisPollResponse {
			task_id: task.task_id,
			total,
			analyzed,
			analysis_complete: review_rules::analysis_complete(analyzed, total),
			reviews: reviews.into_iter().map(ReviewView::from).collect(),
		})
	}

	pub async fn review_stats(&self, req: ReviewStatsRequest) -> Result<ReviewStatsResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;

		Ok(review_store::review_stats(&self.db.pool, task.task_id, req.user_id).await?.into())
	}

	pub fn batch_assessor(&self) -> BatchAssessor {
		BatchAssessor::new(
			self.providers.assessment.clone(),
			self.cfg.providers.assessment.clone(),
			self.cfg.assessment.clone(),
		)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use serde_json::Map;

	use super::*;
	use crate::BoxFuture;

	const MEETS: &str = concat!(
		r#"{"assessment":"meets_criteria","confidence":0.9,"#,
		r#""evidence":"Grantor matches."}"#
	);

	/// Replies after `delay_ms`, tracking how many calls overlap.
	struct SpyProvider {
		delay_ms: u64,
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
		calls: AtomicUsize,
		fail_on: Option<String>,
	}
	impl SpyProvider {
		fn new(delay_ms: u64) -> Self {
			Self {
				delay_ms,
				in_flight: AtomicUsize::new(0),
				max_in_flight: AtomicUsize::new(0),
				calls: AtomicUsize::new(0),
				fail_on: None,
			}
		}
	}
	impl AssessmentProvider for SpyProvider {
		fn assess<'a>(
			&'a self,
			_cfg: &'a LlmProviderConfig,
			prompt: &'a str,
		) -> BoxFuture<'a, color_eyre::Result<String>> {
			Box::pin(async move {
				let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

				self.max_in_flight.fetch_max(now, Ordering::SeqCst);
				self.calls.fetch_add(1, Ordering::SeqCst);

				tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

				self.in_flight.fetch_sub(1, Ordering::SeqCst);

				if let Some(marker) = &self.fail_on
					&& prompt.contains(marker.as_str())
				{
					return Err(color_eyre::eyre::eyre!("upstream returned 503"));
				}

				Ok(MEETS.to_string())
			})
		}
	}

	fn llm() -> LlmProviderConfig {
		LlmProviderConfig {
			provider_id: "test".to_string(),
			api_base: "http://127.0.0.1:1".to_string(),
			api_key: "key".to_string(),
			path: "/v1/chat/completions".to_string(),
			model: "test-model".to_string(),
			temperature: 0.0,
			max_tokens: 256,
			timeout_ms: 1_000,
			default_headers: Map::new(),
		}
	}

	fn settings(concurrency: u32, timeout_ms: u64) -> landman_config::Assessment {
		landman_config::Assessment { concurrency, batch_delay_ms: 0, timeout_ms }
	}

	fn docs(count: usize) -> Vec<DocumentFacts> {
		(0..count)
			.map(|idx| DocumentFacts {
				document_number: format!("DOC-{idx:03}"),
				..DocumentFacts::default()
			})
			.collect()
	}

	fn criteria() -> AssessmentCriteria {
		AssessmentCriteria { party_name: "Smith Ranch LLC".to_string(), ..Default::default() }
	}

	#[tokio::test]
	async fn batches_never_exceed_configured_concurrency() {
		let provider = Arc::new(SpyProvider::new(20));
		let assessor = BatchAssessor::new(provider.clone(), llm(), settings(3, 1_000));
		let mut offsets = Vec::new();
		let mut seen = 0;

		assessor
			.assess_in_batches(&docs(7), &criteria(), |offset, assessed| {
				offsets.push(offset);
				seen += assessed.len();

				async {}
			})
			.await;

		assert_eq!(offsets, vec![0, 3, 6]);
		assert_eq!(seen, 7);
		assert_eq!(provider.calls.load(Ordering::SeqCst), 7);
		assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 3);
	}

	#[tokio::test]
	async fn zero_concurrency_still_makes_progress() {
		let provider = Arc::new(SpyProvider::new(0));
		let assessor = BatchAssessor::new(provider.clone(), llm(), settings(0, 1_000));
		let mut batches = 0;

		assessor
			.assess_in_batches(&docs(2), &criteria(), |_, _| {
				batches += 1;

				async {}
			})
			.await;

		assert_eq!(batches, 2);
		assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn failed_calls_become_pending_in_input_order() {
		let mut provider = SpyProvider::new(0);

		provider.fail_on = Some("DOC-001".to_string());

		let assessor = BatchAssessor::new(Arc::new(provider), llm(), settings(5, 1_000));
		let mut outcomes = Vec::new();

		assessor
			.assess_in_batches(&docs(3), &criteria(), |_, assessed| {
				outcomes.extend(assessed);

				async {}
			})
			.await;

		assert_eq!(outcomes.len(), 3);
		assert_eq!(outcomes[0].outcome.assessment, Assessment::MeetsCriteria);
		assert!(outcomes[0].error.is_none());
		assert_eq!(outcomes[1].outcome.assessment, Assessment::Pending);
		assert_eq!(outcomes[1].outcome.confidence, 0.0);
		assert!(outcomes[1].outcome.evidence.starts_with("Analysis failed"));
		assert!(outcomes[1].error.as_deref().is_some_and(|err| err.contains("503")));
		assert_eq!(outcomes[2].outcome.assessment, Assessment::MeetsCriteria);
	}

	#[tokio::test]
	async fn slow_calls_time_out_as_pending() {
		let assessor =
			BatchAssessor::new(Arc::new(SpyProvider::new(200)), llm(), settings(1, 10));
		let assessed = assessor.assess_one(&docs(1)[0], &criteria()).await;

		assert_eq!(assessed.outcome.assessment, Assessment::Pending);
		assert!(assessed.error.as_deref().is_some_and(|err| err.contains("timed out")));
	}
}
