use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct DownloadRequest<'a> {
	pub url: &'a str,
	pub output_dir: &'a Path,
	pub task_id: Uuid,
	pub review_id: Uuid,
	pub document_number: &'a str,
}

/// Fetches a document and stores it under `{output_dir}/{task_id}/`, named by
/// [`document_file_name`].
pub async fn download(
	cfg: &landman_config::DownloadProviderConfig,
	request: &DownloadRequest<'_>,
) -> Result<PathBuf> {
	crate::with_timeout(cfg.timeout_ms, fetch_to_file(cfg, request)).await
}

/// File name for a document number. Anything outside `[A-Za-z0-9_-]` becomes `_`.
///
/// When cleaning changed the number, the review id is appended so distinct numbers never share
/// a file within a task.
pub fn document_file_name(document_number: &str, review_id: Uuid) -> String {
	let stem: String = document_number
		.chars()
		.map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
		.collect();

	if !stem.is_empty() && stem == document_number {
		format!("{stem}.pdf")
	} else {
		let stem = stem.trim_matches('_');
		let stem = if stem.is_empty() { "document" } else { stem };

		format!("{stem}-{}.pdf", review_id.simple())
	}
}

async fn fetch_to_file(
	cfg: &landman_config::DownloadProviderConfig,
	request: &DownloadRequest<'_>,
) -> Result<PathBuf> {
	let client = crate::client(cfg.timeout_ms)?;
	let res = client
		.get(request.url)
		.headers(crate::optional_auth_headers(None, &cfg.default_headers)?)
		.send()
		.await?;
	let bytes = res.error_for_status()?.bytes().await?;

	if bytes.is_empty() {
		return Err(Error::InvalidResponse {
			message: format!("Document {} downloaded as an empty body.", request.document_number),
		});
	}

	let dir = request.output_dir.join(request.task_id.to_string());

	tokio::fs::create_dir_all(&dir).await?;

	let path = dir.join(document_file_name(request.document_number, request.review_id));

	tokio::fs::write(&path, &bytes).await?;

	Ok(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_names_cannot_escape_the_task_directory() {
		let review_id = Uuid::nil();

		assert_eq!(document_file_name("2019-004411", review_id), "2019-004411.pdf");
		assert_eq!(
			document_file_name("../../etc/passwd", review_id),
			format!("etc_passwd-{}.pdf", review_id.simple())
		);
		assert_eq!(
			document_file_name("   ", review_id),
			format!("document-{}.pdf", review_id.simple())
		);
	}

	#[test]
	fn cleaned_numbers_do_not_share_a_file() {
		let spaced = Uuid::new_v4();
		let underscored = Uuid::new_v4();

		assert_ne!(
			document_file_name("Vol 12/Pg 7", spaced),
			document_file_name("Vol_12_Pg_7", underscored)
		);
		assert_eq!(document_file_name("Vol_12_Pg_7", underscored), "Vol_12_Pg_7.pdf");
		assert_eq!(
			document_file_name("Vol 12/Pg 7", spaced),
			format!("Vol_12_Pg_7-{}.pdf", spaced.simple())
		);
	}
}
