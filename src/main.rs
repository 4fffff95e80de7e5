mod config;
mod db;
mod explorer;
mod site;
#[cfg(test)]
mod testing;
mod utils;
mod wallet;

use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::site::SiteRegistry;
use crate::site::btc::BTC_DECIMALS;
use crate::wallet::sync::events::LoggingEventHandler;
use crate::wallet::sync::gap_scanner::GapLimitScanner;
use crate::wallet::{AddressType, NewWallet, SiteId, SyncCoordinator};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Keeps a local crypto ledger in sync with the on-chain activity of registered wallets.
#[derive(Parser, Debug)]
#[command(name = "folio-sync", version, about)]
struct Cli {
	/// Configuration file, defaults to config/default.{toml,yaml,json} when present
	#[arg(long, env = "FOLIO_CONFIG")]
	config: Option<PathBuf>,

	/// Keep running and sync again after every interval
	#[arg(long)]
	watch: bool,

	/// Seconds between passes in watch mode
	#[arg(long)]
	interval: Option<u64>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Sync all enabled wallets (the default)
	Sync,
	/// Create a profile
	AddProfile { name: String },
	/// Register an asset so transactions in it can be stored
	AddAsset {
		name: String,
		symbol: String,
		decimals: u8,
	},
	/// Register a wallet address or master public key
	AddWallet {
		#[arg(long)]
		profile: String,
		#[arg(long, default_value_t = site::btc::BITCOIN_SITE_ID)]
		site: SiteId,
		#[arg(long)]
		name: Option<String>,
		/// Track the address as a counterpart that the profile does not own
		#[arg(long)]
		not_owned: bool,
		address: String,
	},
	/// Include the wallets of a site in sync passes again
	EnableSite { id: SiteId },
	/// Exclude the wallets of a site from sync passes
	DisableSite { id: SiteId },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let mut filter = tracing_subscriber::EnvFilter::from_default_env()
		.add_directive(tracing::Level::INFO.into());
	if let Ok(directive) = "folio_sync=debug".parse() {
		filter = filter.add_directive(directive);
	}
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let cli = Cli::parse();

	let config = match AppConfig::load(cli.config.as_deref()) {
		Ok(config) => config,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let pool = match db::create_pool(&config.db.url).await {
		Ok(pool) => pool,
		Err(e) => {
			error!("Failed to open database {}: {}", config.db.url, e);
			return ExitCode::FAILURE;
		}
	};
	if let Err(e) = db::run_migrations(&pool).await {
		error!("Failed to migrate database: {}", e);
		return ExitCode::FAILURE;
	}

	let registry = match SiteRegistry::from_config(&config) {
		Ok(registry) => registry,
		Err(e) => {
			error!("Failed to set up site adapters: {}", e);
			return ExitCode::FAILURE;
		}
	};
	if let Err(e) = registry.register_sites(&pool).await {
		error!("Failed to register sites: {}", e);
		return ExitCode::FAILURE;
	}

	match cli.command.unwrap_or(Command::Sync) {
		Command::Sync => {
			// a configured poll interval implies watch mode
			let watch = cli.watch || config.runtime.poll_interval_secs.is_some();
			let interval = watch.then(|| {
				Duration::from_secs(
					cli.interval
						.or(config.runtime.poll_interval_secs)
						.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
				)
			});
			run_sync(pool, registry, &config, interval).await
		}
		command => match setup(&pool, &registry, command).await {
			Ok(()) => ExitCode::SUCCESS,
			Err(e) => {
				error!("{}", e);
				ExitCode::FAILURE
			}
		},
	}
}

/// Sync passes until done (no interval) or interrupted. Wallet failures never change the exit code.
async fn run_sync(
	pool: SqlitePool,
	registry: SiteRegistry,
	config: &AppConfig,
	interval: Option<Duration>,
) -> ExitCode {
	if registry.is_empty() {
		warn!("No site adapters registered, nothing to sync");
		return ExitCode::SUCCESS;
	}

	let scanner = GapLimitScanner::new(config.scanner.clone());
	let mut coordinator = SyncCoordinator::new(pool, registry, scanner);
	coordinator.register_handler(Box::new(LoggingEventHandler::new(BTC_DECIMALS)));

	info!("Starting wallet sync service");
	loop {
		tokio::select! {
			result = coordinator.run_all() => {
				if let Err(e) = result {
					error!("Sync pass failed: {}", e);
				}
			}
			_ = tokio::signal::ctrl_c() => {
				info!("Interrupted, abandoning the current pass");
				break;
			}
		}

		let Some(interval) = interval else {
			break;
		};
		info!("Next pass in {:?}", interval);
		tokio::select! {
			_ = tokio::time::sleep(interval) => {}
			_ = tokio::signal::ctrl_c() => {
				info!("Shutting down");
				break;
			}
		}
	}

	ExitCode::SUCCESS
}

async fn setup(
	pool: &SqlitePool,
	registry: &SiteRegistry,
	command: Command,
) -> Result<(), wallet::WalletSyncError> {
	match command {
		Command::Sync => {}
		Command::AddProfile { name } => {
			let id = db::profile::insert_profile(pool, &name).await?;
			info!("Created profile {} ({})", name, id);
		}
		Command::AddAsset {
			name,
			symbol,
			decimals,
		} => {
			let id = db::asset::insert_asset(pool, &name, &symbol, decimals).await?;
			info!("Asset {} registered as {}", symbol, id);
		}
		Command::AddWallet {
			profile,
			site,
			name,
			not_owned,
			address,
		} => {
			let adapter = registry
				.get(site)
				.ok_or(wallet::WalletSyncError::UnsupportedSite(site))?;
			let address_type = adapter.validate_address(&address);
			if address_type == AddressType::Invalid {
				return Err(wallet::WalletSyncError::InvalidWallet(format!(
					"{} is not a valid {} address",
					address,
					adapter.name()
				)));
			}
			let profile_id = db::profile::find_profile_id(pool, &profile)
				.await?
				.ok_or_else(|| db::DbError::NotFound(format!("profile {}", profile)))?;

			let id = db::wallet::insert_wallet(
				pool,
				&NewWallet {
					site_id: site,
					profile_id,
					name: name.unwrap_or_else(|| address.clone()),
					address: address.clone(),
					address_type,
					owned: !not_owned,
					enabled: !not_owned,
				},
			)
			.await?;
			info!(
				"Registered {} wallet {} as {}",
				address_type.as_str(),
				address,
				id
			);
		}
		Command::EnableSite { id } => db::site::set_site_enabled(pool, id, true).await?,
		Command::DisableSite { id } => db::site::set_site_enabled(pool, id, false).await?,
	}
	Ok(())
}
