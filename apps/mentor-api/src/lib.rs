pub mod middleware;
pub mod routes;
pub mod state;

use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use color_eyre::eyre;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing_subscriber::EnvFilter;

use mentor_cli::ConfigArgs;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = mentor_cli::VERSION,
	rename_all = "kebab",
	styles = mentor_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub common: ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = mentor_config::load(&args.common.config)?;

	init_tracing(&config)?;

	let http_addr: SocketAddr = config.service.http_bind.parse()?;

	if config.security.bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"http_bind must be a loopback address when bind_localhost_only is true."
		));
	}

	let state = AppState::new(config).await?;
	let alert_task = spawn_alert_loop(&state);
	let app = routes::router(state);
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	let served = axum::serve(http_listener, app).await;

	if let Some(task) = alert_task {
		task.abort();
	}

	served?;

	Ok(())
}

/// Starts background alert evaluation when `monitoring.alerts_enabled` is set.
pub fn spawn_alert_loop(state: &AppState) -> Option<JoinHandle<()>> {
	let monitoring = &state.service.cfg.monitoring;

	if !monitoring.alerts_enabled {
		tracing::info!("Alert evaluation is disabled.");

		return None;
	}

	let task = tokio::spawn(mentor_service::alerts::run_alert_loop(
		state.service.alerts.clone(),
		state.service.monitoring.clone(),
		Duration::from_secs(monitoring.check_interval_secs),
		Duration::from_secs(monitoring.error_backoff_secs),
	));

	Some(task)
}

fn init_tracing(config: &mentor_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
