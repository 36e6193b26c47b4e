use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	landman_worker::run(landman_worker::Args::parse()).await
}
