//! Human review decisions and download marking.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, LandmanService, Result, ReviewView, ensure_owner, tasks::non_blank};
use landman_domain::review::{self as review_rules, Decision};
use landman_storage::{
	models::ReviewedDocument,
	reviews::{self as review_store, DecisionUpdate},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionRequest {
	pub user_id: Uuid,
	pub review_id: Uuid,
	pub decision: Decision,
	pub notes: Option<String>,
	/// Overrides the default, which marks approved documents for download.
	pub mark_for_download: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarkForDownloadRequest {
	pub user_id: Uuid,
	pub review_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarkForDownloadResponse {
	/// Reviews flagged. Ids the caller does not own are skipped, not rejected.
	pub marked: u64,
}

impl LandmanService {
	pub async fn record_decision(&self, req: DecisionRequest) -> Result<ReviewView> {
		let review = self.owned_review(req.user_id, req.review_id).await?;
		let notes = non_blank(req.notes);
		let marked_for_download =
			review_rules::resolve_download_mark(req.decision, req.mark_for_download);
		let updated = review_store::record_decision(
			&self.db.pool,
			DecisionUpdate {
				review_id: review.review.review_id,
				decision: req.decision.as_str(),
				notes: notes.as_deref(),
				marked_for_download,
				now: OffsetDateTime::now_utc(),
			},
		)
		.await?;

		if !updated {
			return Err(Error::NotFound { message: "Document review not found.".to_string() });
		}

		let review = self.owned_review(req.user_id, req.review_id).await?;

		tracing::info!(
			review_id = %req.review_id,
			decision = %req.decision,
			marked_for_download = review.review.marked_for_download,
			"Recorded review decision."
		);

		Ok(review.into())
	}

	pub async fn mark_for_download(
		&self,
		req: MarkForDownloadRequest,
	) -> Result<MarkForDownloadResponse> {
		if req.review_ids.is_empty() {
			return Err(Error::InvalidRequest {
				message: "review_ids must not be empty.".to_string(),
			});
		}

		let marked = review_store::mark_reviews_for_download(
			&self.db.pool,
			&req.review_ids,
			req.user_id,
			OffsetDateTime::now_utc(),
		)
		.await?;

		Ok(MarkForDownloadResponse { marked })
	}

	async fn owned_review(&self, user_id: Uuid, review_id: Uuid) -> Result<ReviewedDocument> {
		let review = review_store::get_reviewed_document(&self.db.pool, review_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Document review not found.".to_string() })?;

		ensure_owner(review.owner_id, user_id, "Document review")?;

		Ok(review)
	}
}
