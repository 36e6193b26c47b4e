pub mod assessment;
pub mod credentials;
pub mod decisions;
pub mod downloads;
pub mod jobs;
pub mod results;
pub mod tasks;
pub mod time_serde;

mod error;

pub use assessment::{
	AnalysisPollRequest, AnalysisPollResponse, AssessedDocument, BatchAssessor, ReviewStatsRequest,
	ReviewStatsResponse, ReviewView, StartAnalysisRequest, StartAnalysisResponse,
};
pub use credentials::{CredentialVault, PortalLogin, StoreCredentialRequest};
pub use decisions::{DecisionRequest, MarkForDownloadRequest, MarkForDownloadResponse};
pub use downloads::{
	DownloadStatusRequest, DownloadStatusResponse, DownloadedDocumentsRequest,
	DownloadedDocumentsResponse, ExecuteDownloadsRequest, ExecuteDownloadsResponse,
};
pub use error::{Error, Result};
pub use jobs::{JobGetRequest, JobView};
pub use results::{
	IngestResponse, ResultInput, ResultListRequest, ResultListResponse, ResultStatusRequest,
	ResultView, SubmitResultsRequest, UploadResultsRequest,
};
pub use tasks::{
	CreateTaskRequest, QueueStatsRequest, QueueStatsResponse, TaskDeleteRequest,
	TaskDeleteResponse, TaskGetRequest, TaskListRequest, TaskListResponse, TaskPriorityRequest,
	TaskStatusRequest, TaskView, UpdateTaskRequest,
};

use std::{future::Future, path::PathBuf, pin::Pin, sync::Arc};

use uuid::Uuid;

use landman_config::{Config, DownloadProviderConfig, LlmProviderConfig, PortalSearchProviderConfig};
use landman_domain::task::TaskStatus;
use landman_providers::{
	assessment as assessment_client,
	download::{self as download_client, DownloadRequest},
	portal::{self, PortalDocument, PortalSearchRequest},
};
use landman_storage::{db::Db, models::SearchTask, tasks as task_store};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs one search against a county portal through the automation service.
pub trait PortalSearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a PortalSearchProviderConfig,
		request: &'a PortalSearchRequest<'a>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<PortalDocument>>>;
}

/// Sends an assessment prompt to the model and returns its raw reply.
pub trait AssessmentProvider
where
	Self: Send + Sync,
{
	fn assess<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

pub trait DocumentDownloader
where
	Self: Send + Sync,
{
	fn download<'a>(
		&'a self,
		cfg: &'a DownloadProviderConfig,
		request: &'a DownloadRequest<'a>,
	) -> BoxFuture<'a, color_eyre::Result<PathBuf>>;
}

/// Looks up the login a user stored for a portal.
pub trait CredentialResolver
where
	Self: Send + Sync,
{
	fn resolve<'a>(
		&'a self,
		db: &'a Db,
		user_id: Uuid,
		portal_id: Uuid,
	) -> BoxFuture<'a, Result<Option<PortalLogin>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub portal_search: Arc<dyn PortalSearchProvider>,
	pub assessment: Arc<dyn AssessmentProvider>,
	pub downloader: Arc<dyn DocumentDownloader>,
	pub credentials: Arc<dyn CredentialResolver>,
}
impl Providers {
	pub fn new(
		portal_search: Arc<dyn PortalSearchProvider>,
		assessment: Arc<dyn AssessmentProvider>,
		downloader: Arc<dyn DocumentDownloader>,
		credentials: Arc<dyn CredentialResolver>,
	) -> Self {
		Self { portal_search, assessment, downloader, credentials }
	}

	/// HTTP providers from `landman-providers`, with credentials read through `vault`.
	pub fn with_vault(vault: CredentialVault) -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			portal_search: provider.clone(),
			assessment: provider.clone(),
			downloader: provider,
			credentials: Arc::new(vault),
		}
	}
}

pub struct LandmanService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
	pub vault: CredentialVault,
}
impl LandmanService {
	pub fn new(cfg: Config, db: Db) -> Result<Self> {
		let vault = CredentialVault::from_config(&cfg.security)?;
		let providers = Providers::with_vault(vault.clone());

		Ok(Self { cfg, db, providers, vault })
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Result<Self> {
		let vault = CredentialVault::from_config(&cfg.security)?;

		Ok(Self { cfg, db, providers, vault })
	}

	/// Loads a task and checks that `user_id` owns it.
	pub(crate) async fn owned_task(&self, user_id: Uuid, task_id: Uuid) -> Result<SearchTask> {
		let task = task_store::get_search_task(&self.db.pool, task_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Search task not found.".to_string() })?;

		ensure_owner(task.user_id, user_id, "Search task")?;

		Ok(task)
	}
}

struct DefaultProviders;
impl PortalSearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a PortalSearchProviderConfig,
		request: &'a PortalSearchRequest<'a>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<PortalDocument>>> {
		Box::pin(async move { Ok(portal::search(cfg, request).await?.into_documents()?) })
	}
}
impl AssessmentProvider for DefaultProviders {
	fn assess<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move { Ok(assessment_client::complete(cfg, prompt).await?) })
	}
}
impl DocumentDownloader for DefaultProviders {
	fn download<'a>(
		&'a self,
		cfg: &'a DownloadProviderConfig,
		request: &'a DownloadRequest<'a>,
	) -> BoxFuture<'a, color_eyre::Result<PathBuf>> {
		Box::pin(async move { Ok(download_client::download(cfg, request).await?) })
	}
}

pub(crate) fn ensure_owner(owner_id: Uuid, user_id: Uuid, label: &str) -> Result<()> {
	if owner_id != user_id {
		return Err(Error::Unauthorized { message: format!("{label} belongs to another user.") });
	}

	Ok(())
}

pub(crate) fn stored_task_status(task: &SearchTask) -> Result<TaskStatus> {
	task.status
		.parse()
		.map_err(|err: landman_domain::UnknownVariant| Error::Storage { message: err.to_string() })
}
