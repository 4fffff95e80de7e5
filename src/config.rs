//! Application configuration.
//!
//! Values come from an optional file (`config/default.{toml,yaml,json}` or the path given on
//! the command line) overridden by `FOLIO__<SECTION>__<KEY>` environment variables.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
	pub url: String,
}

impl Default for DbConfig {
	fn default() -> Self {
		Self {
			url: "sqlite://folio.db?mode=rwc".to_string(),
		}
	}
}

/// Settings of the remote ledger client
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
	pub base_url: String,
	pub request_timeout_secs: u64,
	/// Retries after the first attempt before a `RemoteError` is raised.
	pub max_retries: u32,
	/// Wait after a 429 response without `Retry-After` header.
	pub rate_limit_backoff_secs: u64,
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
	/// Transactions requested per `rawaddr` page.
	pub page_size: usize,
}

impl RemoteConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn rate_limit_backoff(&self) -> Duration {
		Duration::from_secs(self.rate_limit_backoff_secs)
	}

	pub fn initial_backoff(&self) -> Duration {
		Duration::from_millis(self.initial_backoff_ms)
	}

	pub fn max_backoff(&self) -> Duration {
		Duration::from_millis(self.max_backoff_ms)
	}
}

impl Default for RemoteConfig {
	fn default() -> Self {
		Self {
			base_url: "https://blockchain.info".to_string(),
			request_timeout_secs: 20,
			max_retries: 5,
			rate_limit_backoff_secs: 15,
			initial_backoff_ms: 1500,
			max_backoff_ms: 30_000,
			page_size: 50,
		}
	}
}

/// Settings of the gap limit scanner
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
	/// Addresses derived and looked up per batch; one fully unused batch ends the scan.
	pub batch_size: u32,
}

impl Default for ScannerConfig {
	fn default() -> Self {
		Self { batch_size: 10 }
	}
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
	/// Seconds between passes in watch mode.
	pub poll_interval_secs: Option<u64>,
	/// Bitcoin network name as understood by `bitcoin::Network` ("bitcoin", "testnet", ...).
	pub network: String,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			poll_interval_secs: None,
			network: "bitcoin".to_string(),
		}
	}
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
	pub db: DbConfig,
	pub remote: RemoteConfig,
	pub scanner: ScannerConfig,
	pub runtime: RuntimeConfig,
}

impl AppConfig {
	pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
		let file = match path {
			Some(path) => config::File::from(path).required(true),
			None => config::File::with_name("config/default").required(false),
		};

		let settings = config::Config::builder()
			.add_source(file)
			.add_source(
				config::Environment::with_prefix("FOLIO")
					.separator("__")
					.try_parsing(true),
			)
			.build()?;

		settings.try_deserialize()
	}

	pub fn network(&self) -> Result<bitcoin::Network, config::ConfigError> {
		self.runtime
			.network
			.parse()
			.map_err(|e| config::ConfigError::Message(format!("invalid network: {}", e)))
	}
}
