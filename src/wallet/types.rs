use crate::db::DbError;
use crate::explorer::RemoteError;
use crate::wallet::derivation::DerivationError;

use serde::{Deserialize, Serialize};

pub type WalletId = i64;
pub type ChildId = i64;
pub type SiteId = i64;
pub type ProfileId = i64;
pub type AssetId = i64;
/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// How the address string of a wallet has to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
	/// A single on-chain address.
	Normal,
	/// Extended public key deriving legacy P2PKH addresses.
	Xpub,
	/// Extended public key deriving nested segwit addresses.
	Ypub,
	/// Extended public key deriving native segwit addresses.
	Zpub,
	/// Old style Electrum master public key.
	Electrum,
	Invalid,
	/// The per (site, profile) bucket parking counterpart addresses.
	Unknown,
}

impl AddressType {
	pub fn as_str(&self) -> &'static str {
		match self {
			AddressType::Normal => "normal",
			AddressType::Xpub => "xpub",
			AddressType::Ypub => "ypub",
			AddressType::Zpub => "zpub",
			AddressType::Electrum => "electrum",
			AddressType::Invalid => "invalid",
			AddressType::Unknown => "unknown",
		}
	}

	/// Column values that are not recognised are treated as invalid, never synced.
	pub fn from_db(value: &str) -> Self {
		match value {
			"normal" => AddressType::Normal,
			"xpub" => AddressType::Xpub,
			"ypub" => AddressType::Ypub,
			"zpub" => AddressType::Zpub,
			"electrum" => AddressType::Electrum,
			"unknown" => AddressType::Unknown,
			_ => AddressType::Invalid,
		}
	}

	/// Whether child addresses can be derived from an address of this type.
	pub fn is_master_key(&self) -> bool {
		matches!(
			self,
			AddressType::Xpub | AddressType::Ypub | AddressType::Zpub | AddressType::Electrum
		)
	}
}

/// HD derivation branch of a child address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
	Receiving,
	Change,
	/// Children without a derivation path, e.g. counterparts in the unknown bucket.
	Undifferentiated,
}

impl BranchType {
	pub const DERIVABLE: [BranchType; 2] = [BranchType::Receiving, BranchType::Change];

	pub fn as_str(&self) -> &'static str {
		match self {
			BranchType::Receiving => "receiving",
			BranchType::Change => "change",
			BranchType::Undifferentiated => "undifferentiated",
		}
	}

	pub fn from_db(value: &str) -> Self {
		match value {
			"receiving" => BranchType::Receiving,
			"change" => BranchType::Change,
			_ => BranchType::Undifferentiated,
		}
	}

	/// Branch selector used in the derivation path (0 = receiving, 1 = change).
	pub fn selector(&self) -> Option<u32> {
		match self {
			BranchType::Receiving => Some(0),
			BranchType::Change => Some(1),
			BranchType::Undifferentiated => None,
		}
	}
}

/// A tracked or counterpart address as persisted in the `wallet` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
	pub id: WalletId,
	pub site_id: SiteId,
	pub profile_id: ProfileId,
	pub name: Option<String>,
	/// Absent only for the unknown bucket.
	pub address: Option<String>,
	pub address_type: AddressType,
	pub owned: bool,
	pub enabled: bool,
	pub has_children: bool,
}

/// Values for registering a new wallet.
#[derive(Debug, Clone)]
pub struct NewWallet {
	pub site_id: SiteId,
	pub profile_id: ProfileId,
	pub name: String,
	pub address: String,
	pub address_type: AddressType,
	pub owned: bool,
	pub enabled: bool,
}

/// A derived address below a master key wallet, or a counterpart address below the unknown bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletChild {
	pub id: ChildId,
	pub parent_id: WalletId,
	pub address: String,
	pub branch: BranchType,
	pub used: bool,
}

/// Resolved persisted identity of one side of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletRef {
	Wallet(WalletId),
	Child { wallet: WalletId, child: ChildId },
}

impl WalletRef {
	pub fn wallet_id(&self) -> WalletId {
		match self {
			WalletRef::Wallet(id) => *id,
			WalletRef::Child { wallet, .. } => *wallet,
		}
	}

	pub fn child_id(&self) -> Option<ChildId> {
		match self {
			WalletRef::Wallet(_) => None,
			WalletRef::Child { child, .. } => Some(*child),
		}
	}
}

/// Direction of a raw transaction as seen from the queried address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RawTxType {
	IncomingUndetermined,
	OutgoingUndetermined,
}

impl RawTxType {
	pub fn as_str(&self) -> &'static str {
		match self {
			RawTxType::IncomingUndetermined => "incoming-undetermined",
			RawTxType::OutgoingUndetermined => "outgoing-undetermined",
		}
	}
}

/// Provider neutral transaction, only lives between classification and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
	pub timestamp: Timestamp,
	pub kind: RawTxType,
	pub txid: String,
	/// Minor units (satoshi for bitcoin).
	pub quantity: i64,
	pub fee: i64,
	pub from: String,
	pub to: String,
	pub quote_asset: String,
	pub fee_asset: String,
	/// Every addressed input of the transaction, so direction can be settled for a whole wallet.
	pub inputs: Vec<TransferLeg>,
	pub outputs: Vec<TransferLeg>,
}

/// One addressed input or output of a transaction, in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLeg {
	pub address: String,
	pub value: i64,
}

impl TransferLeg {
	pub fn new(address: impl Into<String>, value: i64) -> Self {
		Self {
			address: address.into(),
			value,
		}
	}
}

/// Classified ledger entry type, matching the seeded `transactiontype` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
	MoveDeposit = 200,
	MoveWithdrawal = 201,
	MoveInternal = 202,
}

impl TransactionType {
	pub fn id(&self) -> i64 {
		*self as i64
	}
}

/// A reconciled transaction ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
	pub profile_id: ProfileId,
	pub site_id: SiteId,
	pub kind: TransactionType,
	pub timestamp: Timestamp,
	pub txid: String,
	pub from: WalletRef,
	pub to: WalletRef,
	pub quote_asset: AssetId,
	pub base_asset: Option<AssetId>,
	pub fee_asset: AssetId,
	pub quantity: i64,
	pub fee: i64,
	pub note: String,
}

/// Result of a deduplicated insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
	Inserted(i64),
	Duplicate,
}

/// Error types for the wallet synchronization engine
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Remote error: {0}")]
	Remote(#[from] RemoteError),

	#[error("Derivation error: {0}")]
	Derivation(#[from] DerivationError),

	#[error("Database error: {0}")]
	Db(#[from] DbError),

	#[error("Invalid wallet: {0}")]
	InvalidWallet(String),

	#[error("Unknown asset: {0}")]
	UnknownAsset(String),

	#[error("No site adapter registered for site {0}")]
	UnsupportedSite(SiteId),

	#[error("Configuration error: {0}")]
	Config(#[from] config::ConfigError),
}
