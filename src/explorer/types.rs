//! Types for the blockchain explorer API

use serde::{Deserialize, Serialize};

/// Response of `GET <base>/rawaddr/<address>?offset=<n>`.
///
/// Transactions are ordered newest first; `n_tx` is the total for the address, not the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAddrResponse {
    /// Total number of transactions of the address.
    pub n_tx: u64,
    /// Final balance in satoshi.
    #[serde(default)]
    pub final_balance: i64,
    /// One page of transactions, newest first.
    #[serde(default)]
    pub txs: Vec<ApiTransaction>,
}

/// A transaction as returned by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTransaction {
    /// Unix timestamp in seconds.
    pub time: i64,
    /// Transaction id.
    pub hash: String,
    /// Fee in satoshi.
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub inputs: Vec<ApiInput>,
    #[serde(default)]
    pub out: Vec<ApiOutput>,
}

/// Input spending a previous output. Coinbase inputs carry no `prev_out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInput {
    #[serde(default)]
    pub prev_out: Option<ApiOutput>,
}

/// Transaction output; `addr` is missing for non standard scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiOutput {
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub value: i64,
}

/// Entry of `GET <base>/balance?active=<a>|<b>`, keyed by address in the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSummary {
    pub n_tx: u64,
    #[serde(default)]
    pub final_balance: i64,
    #[serde(default)]
    pub total_received: i64,
}

/// Transport, HTTP or payload failure of a remote API, after retries are exhausted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    /// HTTP status of the last response, when there was one.
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    pub(crate) fn transport(url: &str, err: &reqwest::Error) -> Self {
        Self::new(
            format!("{} request failed: {}", url, err),
            err.status().map(|s| s.as_u16()),
        )
    }

    pub(crate) fn status(url: &str, status: reqwest::StatusCode) -> Self {
        Self::new(
            format!("{} returned status: {}", url, status),
            Some(status.as_u16()),
        )
    }

    pub(crate) fn malformed(url: &str, err: &serde_json::Error) -> Self {
        Self::new(format!("{} returned malformed json: {}", url, err), None)
    }
}
