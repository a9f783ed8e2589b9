//! Example server guarded by the Warden rate limiter
//!
//! Configured from environment variables, see [`config::Config`].

mod config;
mod error;
mod handler;
mod prelude;

use std::net::SocketAddr;
use std::sync::Arc;

use warden_core::rate_limit::migrate_fallback;
use warden_core::RateLimitManager;
use warden_window_adapter_fs::WindowAdapterFs;
use warden_window_adapter_sqlite::WindowAdapterSqlite;

use crate::config::Config;
use crate::handler::AppState;
use crate::prelude::*;

const FALLBACK_FILE: &str = "rate_limits.json";

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	if let Err(err) = run().await {
		error!("FATAL: {}", err);
		std::process::exit(1);
	}
}

async fn run() -> WdResult<()> {
	let config = Config::from_env()?;

	let fallback = Arc::new(WindowAdapterFs::new(config.db_dir.join(FALLBACK_FILE)).await?);
	let durable = match WindowAdapterSqlite::new(&config.db_dir).await {
		Ok(adapter) => Some(Arc::new(adapter)),
		Err(err) => {
			warn!("Durable store unavailable, starting on fallback only: {}", err);
			None
		}
	};

	if let (Some(durable), true) = (&durable, config.migrate_fallback) {
		migrate_fallback(fallback.as_ref(), durable.as_ref(), Timestamp::now()).await?;
	}

	let manager = RateLimitManager::new(
		config.rate_limit,
		durable.map(|d| d as Arc<dyn WindowAdapter>),
		fallback,
	);
	let state = AppState {
		manager: Arc::new(manager),
		admin_token: config.admin_token.map(Into::into),
	};
	if state.admin_token.is_none() {
		info!("ADMIN_TOKEN not set, admin endpoints disabled");
	}

	let listener = tokio::net::TcpListener::bind(config.listen.as_ref()).await?;
	info!("Listening on {}", config.listen);
	axum::serve(
		listener,
		handler::router(state).into_make_service_with_connect_info::<SocketAddr>(),
	)
	.await?;

	Ok(())
}

// vim: ts=4
