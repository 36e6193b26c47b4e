use landman_domain::task::TaskRuleError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Unauthorized: {message}")]
	Unauthorized { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Credential error: {message}")]
	Credential { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<landman_storage::Error> for Error {
	fn from(err: landman_storage::Error) -> Self {
		match err {
			landman_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}

impl From<landman_providers::Error> for Error {
	fn from(err: landman_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<TaskRuleError> for Error {
	fn from(err: TaskRuleError) -> Self {
		if err.is_conflict() {
			Self::Conflict { message: err.to_string() }
		} else {
			Self::InvalidRequest { message: err.to_string() }
		}
	}
}
