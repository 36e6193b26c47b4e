//! Download coordination for reviewed documents.
//!
//! Marked documents are fetched one at a time with a pause between items so the county portal is
//! not flooded. Each success stamps `downloaded_at` exactly once; failures are logged, counted on
//! the pipeline job, and left marked so a later run retries them.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{DocumentDownloader, Error, LandmanService, Result, ReviewView};
use landman_config::{DownloadProviderConfig, Downloads};
use landman_domain::review::{self as review_rules, DownloadProgress};
use landman_providers::download::DownloadRequest;
use landman_storage::{
	db::Db,
	jobs as job_store,
	models::{PipelineJob, ReviewedDocument},
	reviews as review_store,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecuteDownloadsRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecuteDownloadsResponse {
	pub job_id: Uuid,
	/// Marked documents not yet downloaded.
	pub queued: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadStatusRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadStatusResponse {
	pub task_id: Uuid,
	pub downloaded_count: i64,
	pub total_marked: i64,
	pub status: DownloadProgress,
	pub reviews: Vec<ReviewView>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadedDocumentsRequest {
	pub user_id: Uuid,
	pub task_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadedDocumentsResponse {
	pub task_id: Uuid,
	pub documents: Vec<ReviewView>,
}

struct DownloadJob {
	db: Db,
	downloader: Arc<dyn DocumentDownloader>,
	provider: DownloadProviderConfig,
	settings: Downloads,
	job_id: Uuid,
	task_id: Uuid,
	items: Vec<ReviewedDocument>,
}
impl DownloadJob {
	async fn run(self) {
		let delay = Duration::from_millis(self.settings.item_delay_ms);
		let mut downloaded = 0_usize;

		for (index, item) in self.items.iter().enumerate() {
			if index > 0 && !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			let error = match self.download_one(item).await {
				Ok(path) => match self.stamp(item, &path).await {
					Ok(()) => {
						downloaded += 1;

						None
					},
					Err(err) => Some(err.to_string()),
				},
				Err(err) => Some(err.to_string()),
			};

			if let Some(error) = &error {
				tracing::warn!(
					review_id = %item.review.review_id,
					document_number = %item.document_number,
					error = %error,
					"Document download failed."
				);
			}

			let recorded = job_store::record_pipeline_job_item(
				&self.db.pool,
				self.job_id,
				error.as_deref(),
				OffsetDateTime::now_utc(),
			)
			.await;

			if let Err(err) = recorded {
				tracing::error!(error = %err, job_id = %self.job_id, "Failed to record job item.");
			}
		}

		let finished =
			job_store::finish_pipeline_job(&self.db.pool, self.job_id, OffsetDateTime::now_utc());

		if let Err(err) = finished.await {
			tracing::error!(error = %err, job_id = %self.job_id, "Failed to finish download job.");
		}

		tracing::info!(
			job_id = %self.job_id,
			task_id = %self.task_id,
			downloaded,
			attempted = self.items.len(),
			"Download job finished."
		);
	}

	async fn download_one(&self, item: &ReviewedDocument) -> Result<PathBuf> {
		let url = item.portal_url.as_deref().filter(|url| !url.trim().is_empty()).ok_or_else(|| {
			Error::InvalidRequest { message: "Document has no portal URL.".to_string() }
		})?;
		let request = DownloadRequest {
			url,
			output_dir: &self.settings.output_dir,
			task_id: self.task_id,
			review_id: item.review.review_id,
			document_number: &item.document_number,
		};
		let timeout = Duration::from_millis(self.settings.timeout_ms);

		match tokio::time::timeout(timeout, self.downloader.download(&self.provider, &request))
			.await
		{
			Ok(result) => Ok(result?),
			Err(_) => Err(Error::Provider {
				message: format!("Download timed out after {} ms.", self.settings.timeout_ms),
			}),
		}
	}

	async fn stamp(&self, item: &ReviewedDocument, path: &std::path::Path) -> Result<()> {
		let file_path = path.display().to_string();
		let stamped = review_store::mark_review_downloaded(
			&self.db.pool,
			item.review.review_id,
			Some(&file_path),
			OffsetDateTime::now_utc(),
		)
		.await?;

		if !stamped {
			return Err(Error::Conflict {
				message: "Document was already downloaded or is no longer marked.".to_string(),
			});
		}

		Ok(())
	}
}

impl LandmanService {
	/// Queues every marked, not yet downloaded document of a task for download.
	pub async fn execute_downloads(
		&self,
		req: ExecuteDownloadsRequest,
	) -> Result<ExecuteDownloadsResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;
		let items =
			review_store::list_marked_reviews(&self.db.pool, task.task_id, req.user_id, true)
				.await?;

		if items.is_empty() {
			return Err(Error::Conflict {
				message: "No documents are marked for download.".to_string(),
			});
		}

		let now = OffsetDateTime::now_utc();
		let job = PipelineJob {
			job_id: Uuid::new_v4(),
			kind: "download".to_string(),
			task_id: Some(task.task_id),
			user_id: req.user_id,
			status: "running".to_string(),
			total_items: items.len() as i32,
			succeeded_items: 0,
			failed_items: 0,
			last_error: None,
			created_at: now,
			updated_at: now,
			finished_at: None,
		};

		job_store::insert_pipeline_job(&self.db.pool, &job).await?;

		let queued = items.len();

		tracing::info!(
			job_id = %job.job_id,
			task_id = %task.task_id,
			queued,
			"Download job queued."
		);

		let run = DownloadJob {
			db: self.db.clone(),
			downloader: self.providers.downloader.clone(),
			provider: self.cfg.providers.download.clone(),
			settings: self.cfg.downloads.clone(),
			job_id: job.job_id,
			task_id: task.task_id,
			items,
		};

		tokio::spawn(run.run());

		Ok(ExecuteDownloadsResponse { job_id: job.job_id, queued })
	}

	pub async fn download_status(
		&self,
		req: DownloadStatusRequest,
	) -> Result<DownloadStatusResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;
		let marked =
			review_store::list_marked_reviews(&self.db.pool, task.task_id, req.user_id, false)
				.await?;
		let total_marked = marked.len() as i64;
		let downloaded_count =
			marked.iter().filter(|doc| doc.review.downloaded_at.is_some()).count() as i64;

		Ok(DownloadStatusResponse {
			task_id: task.task_id,
			downloaded_count,
			total_marked,
			status: review_rules::download_progress(downloaded_count, total_marked),
			reviews: marked.into_iter().map(ReviewView::from).collect(),
		})
	}

	pub async fn downloaded_documents(
		&self,
		req: DownloadedDocumentsRequest,
	) -> Result<DownloadedDocumentsResponse> {
		let task = self.owned_task(req.user_id, req.task_id).await?;
		let documents =
			review_store::list_downloaded_reviews(&self.db.pool, task.task_id, req.user_id).await?;

		Ok(DownloadedDocumentsResponse {
			task_id: task.task_id,
			documents: documents.into_iter().map(ReviewView::from).collect(),
		})
	}
}
