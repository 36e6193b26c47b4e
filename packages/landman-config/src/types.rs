use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub worker: Worker,
	#[serde(default)]
	pub assessment: Assessment,
	pub downloads: Downloads,
	pub security: Security,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub portal_search: PortalSearchProviderConfig,
	pub assessment: LlmProviderConfig,
	#[serde(default)]
	pub download: DownloadProviderConfig,
}

/// Remote browser-automation service that runs county portal searches.
#[derive(Clone, Debug, Deserialize)]
pub struct PortalSearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	/// Optional. Blank values are treated as absent.
	pub api_key: Option<String>,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DownloadProviderConfig {
	#[serde(default = "default_download_http_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}
impl Default for DownloadProviderConfig {
	fn default() -> Self {
		Self { timeout_ms: default_download_http_timeout_ms(), default_headers: Map::new() }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Worker {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Upper bound for one portal search, on top of the HTTP client timeout.
	#[serde(default = "default_search_timeout_ms")]
	pub search_timeout_ms: u64,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			search_timeout_ms: default_search_timeout_ms(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Assessment {
	#[serde(default = "default_assessment_concurrency")]
	pub concurrency: u32,
	#[serde(default = "default_batch_delay_ms")]
	pub batch_delay_ms: u64,
	#[serde(default = "default_assessment_timeout_ms")]
	pub timeout_ms: u64,
}
impl Default for Assessment {
	fn default() -> Self {
		Self {
			concurrency: default_assessment_concurrency(),
			batch_delay_ms: default_batch_delay_ms(),
			timeout_ms: default_assessment_timeout_ms(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Downloads {
	pub output_dir: PathBuf,
	#[serde(default = "default_item_delay_ms")]
	pub item_delay_ms: u64,
	#[serde(default = "default_download_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Security {
	/// Base64 encoded 32-byte AES-256-GCM key for stored portal passwords.
	pub credential_key: String,
}

fn default_max_tokens() -> u32 {
	1_500
}

fn default_download_http_timeout_ms() -> u64 {
	60_000
}

fn default_poll_interval_ms() -> u64 {
	30_000
}

fn default_search_timeout_ms() -> u64 {
	300_000
}

fn default_assessment_concurrency() -> u32 {
	3
}

fn default_batch_delay_ms() -> u64 {
	500
}

fn default_assessment_timeout_ms() -> u64 {
	60_000
}

fn default_item_delay_ms() -> u64 {
	1_000
}

fn default_download_timeout_ms() -> u64 {
	120_000
}
