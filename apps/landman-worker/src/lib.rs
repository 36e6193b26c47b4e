pub mod worker;

mod error;

pub use error::{Error, Result};

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use landman_service::{CredentialVault, Providers};
use landman_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = landman_cli::VERSION,
	rename_all = "kebab",
	styles = landman_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = landman_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let vault = CredentialVault::from_config(&config.security)?;
	let state = worker::WorkerState {
		db,
		providers: Providers::with_vault(vault),
		portal_search: config.providers.portal_search,
		settings: config.worker,
	};
	let (stop_tx, stop_rx) = watch::channel(false);

	tokio::spawn(async move {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %err, "Failed to listen for shutdown signal.");

			return;
		}

		tracing::info!("Shutdown requested.");

		let _ = stop_tx.send(true);
	});

	worker::run_worker(state, stop_rx).await;

	Ok(())
}
