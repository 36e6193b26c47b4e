use std::{future::Future, time::Duration};

use secrecy::ExposeSecret;
use time::OffsetDateTime;
use tokio::{sync::watch, time as tokio_time};
use uuid::Uuid;

use crate::{Error, Result};
use landman_config::PortalSearchProviderConfig;
use landman_domain::task::{self as rules, TaskStatus};
use landman_providers::portal::{PortalDocument, PortalSearchRequest};
use landman_service::{Providers, ResultInput, results::to_new_result};
use landman_storage::{
	db::Db,
	models::ClaimedSearchTask,
	results as result_store,
	tasks::{self as task_store, TaskStatusChange},
};

const MAX_TASK_ERROR_CHARS: usize = 1_024;
const FINISH_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct WorkerState {
	pub db: Db,
	pub providers: Providers,
	pub portal_search: PortalSearchProviderConfig,
	pub settings: landman_config::Worker,
}

/// What one executed search stored.
#[derive(Debug, Default, PartialEq, Eq)]
struct SearchOutcome {
	found: usize,
	inserted: usize,
}

/// Runs cycles on a fixed interval until `stop` turns true or its sender is dropped.
pub async fn run_worker(state: WorkerState, mut stop: watch::Receiver<bool>) {
	let interval = Duration::from_millis(state.settings.poll_interval_ms);

	tracing::info!(poll_interval_ms = state.settings.poll_interval_ms, "Search worker started.");

	loop {
		if *stop.borrow() {
			break;
		}
		if let Err(err) = run_cycle(&state).await {
			tracing::error!(error = %err, "Search task cycle failed.");
		}

		tokio::select! {
			_ = tokio_time::sleep(interval) => {},
			changed = stop.changed() => {
				if changed.is_err() {
					break;
				}
			},
		}
	}

	tracing::info!("Search worker stopped.");
}

/// Claims and executes at most one queued task. Returns the id of the task it ran.
pub async fn run_cycle(state: &WorkerState) -> Result<Option<Uuid>> {
	let Some(claimed) =
		task_store::claim_next_search_task(&state.db, OffsetDateTime::now_utc()).await?
	else {
		return Ok(None);
	};
	let task_id = claimed.task.task_id;

	tracing::info!(task_id = %task_id, priority = claimed.task.priority, "Claimed search task.");

	let (to, message) = match execute_search(state, &claimed).await {
		Ok(outcome) => {
			tracing::info!(
				task_id = %task_id,
				found = outcome.found,
				inserted = outcome.inserted,
				"Search task completed."
			);

			(TaskStatus::Completed, None)
		},
		Err(err) => {
			let message = sanitize_task_error(&err.to_string());

			tracing::warn!(task_id = %task_id, error = %message, "Search task failed.");

			(TaskStatus::Failed, Some(message))
		},
	};
	let finished = retry_once(|| finish_task(&state.db, task_id, to, message.as_deref())).await;

	if let Err(err) = &finished {
		tracing::error!(
			task_id = %task_id,
			status = %to,
			error = %err,
			"Task is stuck in running; its final status could not be stored."
		);
	}

	finished?;

	Ok(Some(task_id))
}

async fn execute_search(
	state: &WorkerState,
	claimed: &ClaimedSearchTask,
) -> Result<SearchOutcome> {
	let task = &claimed.task;
	let login = state
		.providers
		.credentials
		.resolve(&state.db, task.user_id, task.portal_id)
		.await?
		.ok_or_else(|| Error::Message("No active credential for this portal.".to_string()))?;
	let request = PortalSearchRequest {
		portal_url: &claimed.portal_base_url,
		username: &login.username,
		password: login.password.expose_secret(),
		party_name: &task.party_name,
		party_role: &task.party_role,
		date_from: task.date_from,
		date_to: task.date_to,
		legal_description: task.legal_description.as_deref(),
		document_reference: task.document_reference.as_deref(),
	};
	let timeout = Duration::from_millis(state.settings.search_timeout_ms);
	let search = state.providers.portal_search.search(&state.portal_search, &request);
	let documents = match tokio_time::timeout(timeout, search).await {
		Ok(Ok(documents)) => documents,
		Ok(Err(err)) => return Err(Error::Provider(err.to_string())),
		Err(_) =>
			return Err(Error::Provider(format!(
				"Portal search timed out after {} ms.",
				state.settings.search_timeout_ms
			))),
	};

	store_documents(&state.db, task.task_id, documents).await
}

/// Inserts found documents, ignoring ones already recorded for the task.
async fn store_documents(
	db: &Db,
	task_id: Uuid,
	documents: Vec<PortalDocument>,
) -> Result<SearchOutcome> {
	let now = OffsetDateTime::now_utc();
	let mut outcome = SearchOutcome { found: documents.len(), inserted: 0 };
	let mut tx = db.pool.begin().await?;

	for doc in documents {
		let Some(result) = to_new_result(ResultInput::from(doc)) else {
			continue;
		};

		if result_store::upsert_search_result(&mut *tx, task_id, &result, now).await? {
			outcome.inserted += 1;
		}
	}

	tx.commit().await?;

	Ok(outcome)
}

async fn finish_task(
	db: &Db,
	task_id: Uuid,
	to: TaskStatus,
	error_message: Option<&str>,
) -> Result<()> {
	rules::check_scheduler_transition(TaskStatus::Running, to)?;

	let moved = task_store::set_search_task_status(
		&db.pool,
		TaskStatusChange {
			task_id,
			from: TaskStatus::Running.as_str(),
			to: to.as_str(),
			error_message,
			now: OffsetDateTime::now_utc(),
		},
	)
	.await?;

	if !moved {
		tracing::warn!(task_id = %task_id, status = %to, "Task left running before it finished.");
	}

	Ok(())
}

/// Runs `op` again once when the first attempt fails.
async fn retry_once<T, F, Fut>(mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	match op().await {
		Ok(value) => Ok(value),
		Err(err) => {
			tracing::warn!(error = %err, "Attempt failed; retrying once.");
			tokio_time::sleep(FINISH_RETRY_DELAY).await;

			op().await
		},
	}
}

fn sanitize_task_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "passwd", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_TASK_ERROR_CHARS {
		out = out.chars().take(MAX_TASK_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
