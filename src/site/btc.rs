//! Bitcoin on-chain wallets backed by a blockchain.info style explorer.

use super::{HdSupport, SiteAdapter};
use crate::explorer::{BlockchainInfoClient, RemoteLedger};
use crate::wallet::derivation::{
	AddressDeriver, ChildDeriver, DerivationError, extended_key_type, is_electrum_key,
};
use crate::wallet::sync::transaction_processor::{BitcoinClassifier, TransactionClassifier};
use crate::wallet::{AddressType, RawTransaction, SiteId, Timestamp, WalletSyncError};

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network};
use std::collections::HashMap;
use tracing::debug;

pub const BITCOIN_SITE_ID: SiteId = 1;
pub const BTC_SYMBOL: &str = "BTC";
pub const BTC_DECIMALS: u32 = 8;

pub struct Bitcoin<R: RemoteLedger = BlockchainInfoClient> {
	ledger: R,
	classifier: BitcoinClassifier,
	network: Network,
}

impl<R: RemoteLedger> Bitcoin<R> {
	pub fn new(ledger: R, network: Network) -> Self {
		Self {
			ledger,
			classifier: BitcoinClassifier::new(BTC_SYMBOL),
			network,
		}
	}
}

#[async_trait::async_trait]
impl<R: RemoteLedger> SiteAdapter for Bitcoin<R> {
	fn site_id(&self) -> SiteId {
		BITCOIN_SITE_ID
	}

	fn name(&self) -> &'static str {
		"Bitcoin"
	}

	fn validate_address(&self, address: &str) -> AddressType {
		let address = address.trim();

		if let Some(kind) = extended_key_type(address) {
			return match AddressDeriver::new(address, kind, self.network) {
				Ok(_) => kind,
				Err(e) => {
					debug!("Rejected extended key {}: {}", address, e);
					AddressType::Invalid
				}
			};
		}

		if is_electrum_key(address) {
			return match AddressDeriver::new(address, AddressType::Electrum, self.network) {
				Ok(_) => AddressType::Electrum,
				Err(_) => AddressType::Invalid,
			};
		}

		match address.parse::<Address<NetworkUnchecked>>() {
			Ok(parsed) if parsed.is_valid_for_network(self.network) => AddressType::Normal,
			_ => AddressType::Invalid,
		}
	}

	async fn fetch_transactions(
		&self,
		address: &str,
		since: Timestamp,
	) -> Result<Vec<RawTransaction>, WalletSyncError> {
		let payloads = self.ledger.transactions_since(address, since).await?;
		Ok(self.classifier.classify_batch(address, &payloads))
	}

	fn hd_support(&self) -> Option<&dyn HdSupport> {
		Some(self)
	}
}

#[async_trait::async_trait]
impl<R: RemoteLedger> HdSupport for Bitcoin<R> {
	fn deriver(
		&self,
		key: &str,
		address_type: AddressType,
	) -> Result<Box<dyn ChildDeriver>, DerivationError> {
		let deriver = AddressDeriver::new(key, address_type, self.network)?;
		Ok(Box::new(deriver))
	}

	async fn lookup_usage(&self, addresses: &[String]) -> Result<HashMap<String, u64>, WalletSyncError> {
		let usage = self.ledger.address_usage(addresses).await?;
		Ok(usage
			.into_iter()
			.map(|(address, summary)| (address, summary.n_tx))
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{ELECTRUM_MPK, FakeLedger, TEST_XPUB, api_tx};
	use crate::wallet::{BranchType, RawTxType};

	fn site() -> Bitcoin<FakeLedger> {
		Bitcoin::new(FakeLedger::new(), Network::Bitcoin)
	}

	#[test]
	fn validates_plain_addresses() {
		let site = site();
		assert_eq!(
			site.validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"),
			AddressType::Normal
		);
		assert_eq!(
			site.validate_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"),
			AddressType::Normal
		);
		assert_eq!(
			site.validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"),
			AddressType::Normal
		);
		assert_eq!(site.validate_address("not-an-address"), AddressType::Invalid);
		assert_eq!(site.validate_address(""), AddressType::Invalid);
	}

	#[test]
	fn validates_master_keys() {
		let site = site();
		assert_eq!(site.validate_address(TEST_XPUB), AddressType::Xpub);
		assert_eq!(site.validate_address(ELECTRUM_MPK), AddressType::Electrum);
		// right prefix, broken checksum
		assert_eq!(site.validate_address("xpub1234"), AddressType::Invalid);
	}

	#[test]
	fn derives_children_through_capability() {
		let site = site();
		let hd = site.hd_support().unwrap();
		let deriver = hd.deriver(TEST_XPUB, AddressType::Xpub).unwrap();
		let first = deriver.derive(BranchType::Receiving, 0).unwrap();
		assert!(first.starts_with('1'));
		assert_eq!(site.validate_address(&first), AddressType::Normal);
		assert!(hd.deriver("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", AddressType::Normal).is_err());
	}

	#[tokio::test]
	async fn fetches_and_classifies_history() {
		let me = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
		let other = "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy";
		let ledger = FakeLedger::new();
		ledger.add_history(
			me,
			vec![
				api_tx("out", 200, 100, &[(me, 5_000)], &[(other, 4_900)]),
				api_tx("in", 100, 100, &[(other, 8_000)], &[(me, 7_900)]),
			],
		);
		let site = Bitcoin::new(ledger, Network::Bitcoin);

		let txs = site.fetch_transactions(me, 0).await.unwrap();
		assert_eq!(txs.len(), 2);
		assert_eq!(txs[0].kind, RawTxType::OutgoingUndetermined);
		assert_eq!(txs[1].kind, RawTxType::IncomingUndetermined);

		let usage = site.lookup_usage(&[me.to_string(), other.to_string()]).await.unwrap();
		assert_eq!(usage.get(me), Some(&2));
		assert_eq!(usage.get(other), None);
	}
}
