pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),
	#[error("{0}")]
	Provider(String),
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Storage(#[from] landman_storage::Error),
	#[error(transparent)]
	Service(#[from] landman_service::Error),
	#[error(transparent)]
	Rule(#[from] landman_domain::task::TaskRuleError),
}
