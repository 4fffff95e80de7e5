//!
//! HTTP client for blockchain.info style explorers with retry and rate limit handling.
//!
//! Every request goes through `get_json`, which retries transient failures (transport errors and
//! 5xx responses) with exponential backoff, honors `Retry-After` on 429 responses (falling back
//! to a fixed wait), and gives up with a `RemoteError` once the retry budget is spent.

use super::types::*;
use crate::config::RemoteConfig;
use crate::wallet::Timestamp;

use backoff::{ExponentialBackoff, future::retry};
use itertools::Itertools;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// A source of address usage and transaction history.
#[async_trait::async_trait]
pub trait RemoteLedger: Send + Sync {
	/// One page of transactions of `address`, newest first, starting at `offset`.
	async fn address_page(&self, address: &str, offset: usize)
	-> Result<RawAddrResponse, RemoteError>;

	/// Cheap usage summary for a batch of addresses. Unused addresses may be missing.
	async fn address_usage(
		&self,
		addresses: &[String],
	) -> Result<HashMap<String, AddressSummary>, RemoteError>;

	/// All transactions of `address` with `time >= since`, newest first.
	///
	/// Pages are requested until every transaction of the address was seen, or until a page
	/// reaches back before `since`.
	async fn transactions_since(
		&self,
		address: &str,
		since: Timestamp,
	) -> Result<Vec<ApiTransaction>, RemoteError> {
		let mut offset = 0usize;
		let mut collected = Vec::new();

		loop {
			let page = self.address_page(address, offset).await?;
			if page.txs.is_empty() {
				break;
			}

			offset += page.txs.len();
			let reached_watermark = page.txs.iter().any(|tx| tx.time < since);
			collected.extend(page.txs.into_iter().filter(|tx| tx.time >= since));

			if offset as u64 >= page.n_tx || reached_watermark {
				break;
			}
		}

		debug!(
			"Fetched {} transactions for {} since {}",
			collected.len(),
			address,
			since
		);
		Ok(collected)
	}
}

/// Client for the blockchain.info API
#[derive(Clone)]
pub struct BlockchainInfoClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Retry, paging and endpoint settings.
	config: RemoteConfig,
}

impl BlockchainInfoClient {
	/// Create a new explorer client.
	///
	/// # Errors
	/// Returns `RemoteError` if the HTTP client can not be built.
	pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
		let http_client = Client::builder()
			.timeout(config.request_timeout())
			.build()
			.map_err(|e| RemoteError::new(format!("Failed to create HTTP client: {}", e), None))?;

		Ok(Self {
			http_client,
			config,
		})
	}

	fn base_url(&self) -> &str {
		self.config.base_url.trim_end_matches('/')
	}

	fn rawaddr_url(&self, address: &str, offset: usize) -> String {
		format!(
			"{}/rawaddr/{}?offset={}&limit={}",
			self.base_url(),
			address,
			offset,
			self.config.page_size
		)
	}

	fn balance_url(&self, addresses: &[String]) -> String {
		format!(
			"{}/balance?active={}",
			self.base_url(),
			addresses.iter().join("|")
		)
	}

	/// GET `url` and decode the JSON body, retrying as configured.
	async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
		let attempts = AtomicU32::new(0);
		let policy = ExponentialBackoff {
			initial_interval: self.config.initial_backoff(),
			max_interval: self.config.max_backoff(),
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		};

		let body = retry(policy, || async {
			let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
			let exhausted = attempt > self.config.max_retries;
			debug!("Querying {} (attempt {})", url, attempt);

			let response = match self.http_client.get(url).send().await {
				Ok(response) => response,
				Err(e) => {
					warn!("Request to {} failed: {}", url, e);
					return Err(give_up_or(exhausted, RemoteError::transport(url, &e), None));
				}
			};

			let status = response.status();
			if status == StatusCode::TOO_MANY_REQUESTS {
				let wait = retry_after(response.headers())
					.unwrap_or_else(|| self.config.rate_limit_backoff());
				warn!("{} answered 429, retrying after {:?}", url, wait);
				return Err(give_up_or(
					exhausted,
					RemoteError::status(url, status),
					Some(wait),
				));
			}
			if status.is_server_error() {
				warn!("{} answered {}", url, status);
				return Err(give_up_or(exhausted, RemoteError::status(url, status), None));
			}
			if !status.is_success() {
				return Err(backoff::Error::permanent(RemoteError::status(url, status)));
			}

			response
				.text()
				.await
				.map_err(|e| give_up_or(exhausted, RemoteError::transport(url, &e), None))
		})
		.await?;

		serde_json::from_str(&body).map_err(|e| RemoteError::malformed(url, &e))
	}
}

#[async_trait::async_trait]
impl RemoteLedger for BlockchainInfoClient {
	async fn address_page(
		&self,
		address: &str,
		offset: usize,
	) -> Result<RawAddrResponse, RemoteError> {
		self.get_json(&self.rawaddr_url(address, offset)).await
	}

	async fn address_usage(
		&self,
		addresses: &[String],
	) -> Result<HashMap<String, AddressSummary>, RemoteError> {
		if addresses.is_empty() {
			return Ok(HashMap::new());
		}
		self.get_json(&self.balance_url(addresses)).await
	}
}

/// Wrap an error as transient (optionally with a fixed wait), or permanent once retries are spent.
fn give_up_or(
	exhausted: bool,
	err: RemoteError,
	wait: Option<Duration>,
) -> backoff::Error<RemoteError> {
	match (exhausted, wait) {
		(true, _) => backoff::Error::permanent(err),
		(false, Some(wait)) => backoff::Error::retry_after(err, wait),
		(false, None) => backoff::Error::transient(err),
	}
}

/// Seconds from a `Retry-After` header, plus one second of slack.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
	let seconds = headers
		.get(RETRY_AFTER)?
		.to_str()
		.ok()?
		.trim()
		.parse::<u64>()
		.ok()?;
	Some(Duration::from_secs(seconds + 1))
}
