mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Assessment, Config, DownloadProviderConfig, Downloads, LlmProviderConfig,
	PortalSearchProviderConfig, Postgres, Providers, Security, Service, Storage, Worker,
};

use std::{fs, path::Path};

use base64::{Engine as _, engine::general_purpose::STANDARD};

pub const CREDENTIAL_KEY_BYTES: usize = 32;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	for (label, api_base) in [
		("providers.portal_search.api_base", &cfg.providers.portal_search.api_base),
		("providers.assessment.api_base", &cfg.providers.assessment.api_base),
	] {
		if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
			return Err(Error::Validation {
				message: format!("{label} must be an http or https URL."),
			});
		}
	}

	if cfg.providers.assessment.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.assessment.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.assessment.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.assessment.model must be non-empty.".to_string(),
		});
	}
	if !cfg.providers.assessment.temperature.is_finite()
		|| !(0.0..=2.0).contains(&cfg.providers.assessment.temperature)
	{
		return Err(Error::Validation {
			message: "providers.assessment.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if cfg.providers.assessment.max_tokens == 0 {
		return Err(Error::Validation {
			message: "providers.assessment.max_tokens must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("providers.portal_search.timeout_ms", cfg.providers.portal_search.timeout_ms),
		("providers.assessment.timeout_ms", cfg.providers.assessment.timeout_ms),
		("providers.download.timeout_ms", cfg.providers.download.timeout_ms),
		("worker.poll_interval_ms", cfg.worker.poll_interval_ms),
		("worker.search_timeout_ms", cfg.worker.search_timeout_ms),
		("assessment.timeout_ms", cfg.assessment.timeout_ms),
		("downloads.timeout_ms", cfg.downloads.timeout_ms),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if cfg.assessment.concurrency == 0 {
		return Err(Error::Validation {
			message: "assessment.concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.downloads.output_dir.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "downloads.output_dir must be non-empty.".to_string(),
		});
	}

	decode_credential_key(&cfg.security.credential_key)?;

	Ok(())
}

/// Decodes `security.credential_key` into raw AES-256 key bytes.
pub fn decode_credential_key(encoded: &str) -> Result<[u8; CREDENTIAL_KEY_BYTES]> {
	let bytes = STANDARD.decode(encoded.trim()).map_err(|_| Error::Validation {
		message: "security.credential_key must be valid base64.".to_string(),
	})?;

	<[u8; CREDENTIAL_KEY_BYTES]>::try_from(bytes.as_slice()).map_err(|_| Error::Validation {
		message: format!("security.credential_key must decode to {CREDENTIAL_KEY_BYTES} bytes."),
	})
}

fn normalize(cfg: &mut Config) {
	if cfg
		.providers
		.portal_search
		.api_key
		.as_deref()
		.map(|key| key.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.providers.portal_search.api_key = None;
	}

	cfg.providers.portal_search.api_base =
		cfg.providers.portal_search.api_base.trim_end_matches('/').to_string();
	cfg.providers.assessment.api_base =
		cfg.providers.assessment.api_base.trim_end_matches('/').to_string();
}
