//! Child address derivation from master public keys.
//!
//! Extended public keys (xpub/ypub/zpub and their testnet counterparts) derive along
//! `<branch>/<index>` with BIP32, Electrum master public keys use the old Electrum
//! scheme of tweaking the master point with `sha256d("<index>:<branch>:" || mpk)`.
//! Derivation is a pure function of (key, type, branch, index).

use crate::wallet::types::{AddressType, BranchType};

use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::hashes::{Hash, sha256d};
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::{self, Scalar, Secp256k1, VerifyOnly};
use bitcoin::{Address, Network, PublicKey, base58};
use std::str::FromStr;
use thiserror::Error;

const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];
const YPUB_VERSION: [u8; 4] = [0x04, 0x9d, 0x7c, 0xb2];
const ZPUB_VERSION: [u8; 4] = [0x04, 0xb2, 0x47, 0x46];
const TPUB_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xcf];
const UPUB_VERSION: [u8; 4] = [0x04, 0x4a, 0x52, 0x62];
const VPUB_VERSION: [u8; 4] = [0x04, 0x5f, 0x1c, 0xf6];

/// Length in hex characters of an Electrum master public key (64 byte point without prefix).
pub const ELECTRUM_MPK_HEX_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum DerivationError {
	#[error("address type {0:?} does not support child derivation")]
	WalletAddressType(AddressType),
	#[error("branch {0:?} can not be derived")]
	ChildAddressType(BranchType),
	#[error("invalid master key: {0}")]
	InvalidKey(String),
}

/// Produces child addresses for a branch and index.
pub trait ChildDeriver: Send + Sync {
	fn derive(&self, branch: BranchType, index: u32) -> Result<String, DerivationError>;

	/// Derive `count` consecutive addresses starting at `start`.
	fn derive_range(
		&self,
		branch: BranchType,
		start: u32,
		count: u32,
	) -> Result<Vec<String>, DerivationError> {
		(start..start.saturating_add(count))
			.map(|index| self.derive(branch, index))
			.collect()
	}
}

#[derive(Debug, Clone, Copy)]
enum ScriptKind {
	P2pkh,
	P2shP2wpkh,
	P2wpkh,
}

#[derive(Debug, Clone)]
enum MasterKey {
	Extended { xpub: Xpub, script: ScriptKind },
	Electrum { point: secp256k1::PublicKey, raw: Vec<u8> },
}

/// Deterministic deriver for one master public key.
pub struct AddressDeriver {
	key: MasterKey,
	network: Network,
	secp: Secp256k1<VerifyOnly>,
}

impl AddressDeriver {
	pub fn new(key: &str, address_type: AddressType, network: Network) -> Result<Self, DerivationError> {
		let key = match address_type {
			AddressType::Xpub => MasterKey::Extended {
				xpub: parse_extended_key(key)?,
				script: ScriptKind::P2pkh,
			},
			AddressType::Ypub => MasterKey::Extended {
				xpub: parse_extended_key(key)?,
				script: ScriptKind::P2shP2wpkh,
			},
			AddressType::Zpub => MasterKey::Extended {
				xpub: parse_extended_key(key)?,
				script: ScriptKind::P2wpkh,
			},
			AddressType::Electrum => parse_electrum_key(key)?,
			other => return Err(DerivationError::WalletAddressType(other)),
		};

		Ok(Self {
			key,
			network,
			secp: Secp256k1::verification_only(),
		})
	}

	fn derive_extended(
		&self,
		xpub: &Xpub,
		script: ScriptKind,
		selector: u32,
		index: u32,
	) -> Result<Address, DerivationError> {
		let path = [
			ChildNumber::from_normal_idx(selector)
				.map_err(|e| DerivationError::InvalidKey(e.to_string()))?,
			ChildNumber::from_normal_idx(index)
				.map_err(|e| DerivationError::InvalidKey(e.to_string()))?,
		];
		let child = xpub
			.derive_pub(&self.secp, &path)
			.map_err(|e| DerivationError::InvalidKey(e.to_string()))?;
		let compressed = CompressedPublicKey(child.public_key);

		Ok(match script {
			ScriptKind::P2pkh => Address::p2pkh(compressed.pubkey_hash(), self.network),
			ScriptKind::P2shP2wpkh => Address::p2shwpkh(&compressed, self.network),
			ScriptKind::P2wpkh => Address::p2wpkh(&compressed, self.network),
		})
	}

	fn derive_electrum(
		&self,
		point: &secp256k1::PublicKey,
		raw: &[u8],
		selector: u32,
		index: u32,
	) -> Result<Address, DerivationError> {
		let mut preimage = format!("{}:{}:", index, selector).into_bytes();
		preimage.extend_from_slice(raw);
		let digest = sha256d::Hash::hash(&preimage).to_byte_array();

		let tweak = Scalar::from_be_bytes(digest)
			.map_err(|e| DerivationError::InvalidKey(e.to_string()))?;
		let child = point
			.add_exp_tweak(&self.secp, &tweak)
			.map_err(|e| DerivationError::InvalidKey(e.to_string()))?;

		let pubkey = PublicKey::new_uncompressed(child);
		Ok(Address::p2pkh(pubkey.pubkey_hash(), self.network))
	}
}

impl ChildDeriver for AddressDeriver {
	fn derive(&self, branch: BranchType, index: u32) -> Result<String, DerivationError> {
		let selector = branch
			.selector()
			.ok_or(DerivationError::ChildAddressType(branch))?;

		let address = match &self.key {
			MasterKey::Extended { xpub, script } => {
				self.derive_extended(xpub, *script, selector, index)?
			}
			MasterKey::Electrum { point, raw } => self.derive_electrum(point, raw, selector, index)?,
		};
		Ok(address.to_string())
	}
}

/// Detect the extended key family from its prefix.
pub fn extended_key_type(key: &str) -> Option<AddressType> {
	match key.get(..4)? {
		"xpub" | "tpub" => Some(AddressType::Xpub),
		"ypub" | "upub" => Some(AddressType::Ypub),
		"zpub" | "vpub" => Some(AddressType::Zpub),
		_ => None,
	}
}

/// Whether the string looks like an Electrum master public key.
pub fn is_electrum_key(key: &str) -> bool {
	key.len() == ELECTRUM_MPK_HEX_LEN && key.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse any supported extended public key by rewriting its version bytes to xpub/tpub.
fn parse_extended_key(key: &str) -> Result<Xpub, DerivationError> {
	let mut data =
		base58::decode_check(key).map_err(|e| DerivationError::InvalidKey(e.to_string()))?;
	if data.len() < 4 {
		return Err(DerivationError::InvalidKey("extended key too short".to_string()));
	}

	let version: [u8; 4] = [data[0], data[1], data[2], data[3]];
	let normalized = match version {
		XPUB_VERSION | YPUB_VERSION | ZPUB_VERSION => XPUB_VERSION,
		TPUB_VERSION | UPUB_VERSION | VPUB_VERSION => TPUB_VERSION,
		_ => {
			return Err(DerivationError::InvalidKey(format!(
				"unsupported extended key version {}",
				hex::encode(version)
			)));
		}
	};
	data[..4].copy_from_slice(&normalized);

	Xpub::from_str(&base58::encode_check(&data))
		.map_err(|e| DerivationError::InvalidKey(e.to_string()))
}

fn parse_electrum_key(key: &str) -> Result<MasterKey, DerivationError> {
	if !is_electrum_key(key) {
		return Err(DerivationError::InvalidKey(
			"electrum master public key must be 128 hex characters".to_string(),
		));
	}
	let raw = hex::decode(key).map_err(|e| DerivationError::InvalidKey(e.to_string()))?;

	let mut uncompressed = Vec::with_capacity(raw.len() + 1);
	uncompressed.push(0x04);
	uncompressed.extend_from_slice(&raw);
	let point = secp256k1::PublicKey::from_slice(&uncompressed)
		.map_err(|e| DerivationError::InvalidKey(e.to_string()))?;

	Ok(MasterKey::Electrum { point, raw })
}

#[cfg(test)]
mod tests {
	use super::*;

	// BIP32 test vector 1, chain m
	const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
	// Uncompressed secp256k1 generator point without the 0x04 prefix
	const ELECTRUM_MPK: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

	fn with_version(key: &str, version: [u8; 4]) -> String {
		let mut data = base58::decode_check(key).unwrap();
		data[..4].copy_from_slice(&version);
		base58::encode_check(&data)
	}

	#[test]
	fn xpub_matches_known_addresses() {
		let deriver = AddressDeriver::new(XPUB, AddressType::Xpub, Network::Bitcoin).unwrap();
		assert_eq!(
			deriver.derive(BranchType::Receiving, 0).unwrap(),
			"12CL4K2eVqj7hQTix7dM7CVHCkpP17Pry3"
		);
		assert_eq!(
			deriver.derive(BranchType::Receiving, 1).unwrap(),
			"13Q3u97PKtyERBpXg31MLoJbQsECgJiMMw"
		);
		assert_eq!(
			deriver.derive(BranchType::Change, 0).unwrap(),
			"1NwEtFZ6Td7cpKaJtYoeryS6avP2TUkSMh"
		);
	}

	#[test]
	fn electrum_matches_known_addresses() {
		let deriver =
			AddressDeriver::new(ELECTRUM_MPK, AddressType::Electrum, Network::Bitcoin).unwrap();
		assert_eq!(
			deriver.derive(BranchType::Receiving, 0).unwrap(),
			"1AYPdHLna6bKFUbeXoAEVbaXUxifUwCMay"
		);
		assert_eq!(
			deriver.derive(BranchType::Change, 0).unwrap(),
			"1JVYsmjrqSy1BKvo1gYpNjX7AYea74nQYe"
		);
	}

	#[test]
	fn xpub_derivation_is_deterministic() {
		let deriver = AddressDeriver::new(XPUB, AddressType::Xpub, Network::Bitcoin).unwrap();
		let first = deriver.derive(BranchType::Receiving, 0).unwrap();
		let again = deriver.derive(BranchType::Receiving, 0).unwrap();
		assert_eq!(first, again);
		assert!(first.starts_with('1'));

		let next = deriver.derive(BranchType::Receiving, 1).unwrap();
		let change = deriver.derive(BranchType::Change, 0).unwrap();
		assert_ne!(first, next);
		assert_ne!(first, change);
	}

	#[test]
	fn ypub_and_zpub_use_segwit_scripts() {
		let ypub = with_version(XPUB, YPUB_VERSION);
		let zpub = with_version(XPUB, ZPUB_VERSION);
		assert!(ypub.starts_with("ypub"));
		assert!(zpub.starts_with("zpub"));

		let nested = AddressDeriver::new(&ypub, AddressType::Ypub, Network::Bitcoin)
			.unwrap()
			.derive(BranchType::Receiving, 0)
			.unwrap();
		let native = AddressDeriver::new(&zpub, AddressType::Zpub, Network::Bitcoin)
			.unwrap()
			.derive(BranchType::Receiving, 0)
			.unwrap();
		assert!(nested.starts_with('3'));
		assert!(native.starts_with("bc1q"));
	}

	#[test]
	fn derive_range_yields_consecutive_indices() {
		let deriver = AddressDeriver::new(XPUB, AddressType::Xpub, Network::Bitcoin).unwrap();
		let batch = deriver.derive_range(BranchType::Change, 3, 4).unwrap();
		assert_eq!(batch.len(), 4);
		assert_eq!(batch[0], deriver.derive(BranchType::Change, 3).unwrap());
		assert_eq!(batch[3], deriver.derive(BranchType::Change, 6).unwrap());
	}

	#[test]
	fn electrum_master_key_derives_legacy_addresses() {
		let deriver =
			AddressDeriver::new(ELECTRUM_MPK, AddressType::Electrum, Network::Bitcoin).unwrap();
		let receiving = deriver.derive(BranchType::Receiving, 0).unwrap();
		let change = deriver.derive(BranchType::Change, 0).unwrap();
		assert!(receiving.starts_with('1'));
		assert_ne!(receiving, change);
		assert_eq!(receiving, deriver.derive(BranchType::Receiving, 0).unwrap());
	}

	#[test]
	fn plain_addresses_can_not_derive() {
		let err = AddressDeriver::new(
			"1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
			AddressType::Normal,
			Network::Bitcoin,
		)
		.err()
		.unwrap();
		assert!(matches!(err, DerivationError::WalletAddressType(AddressType::Normal)));
	}

	#[test]
	fn undifferentiated_branch_is_rejected() {
		let deriver = AddressDeriver::new(XPUB, AddressType::Xpub, Network::Bitcoin).unwrap();
		let err = deriver.derive(BranchType::Undifferentiated, 0).unwrap_err();
		assert!(matches!(
			err,
			DerivationError::ChildAddressType(BranchType::Undifferentiated)
		));
	}

	#[test]
	fn detects_key_families() {
		assert_eq!(extended_key_type(XPUB), Some(AddressType::Xpub));
		assert_eq!(
			extended_key_type(&with_version(XPUB, ZPUB_VERSION)),
			Some(AddressType::Zpub)
		);
		assert_eq!(extended_key_type("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"), None);
		assert!(is_electrum_key(ELECTRUM_MPK));
		assert!(!is_electrum_key(&ELECTRUM_MPK[1..]));
	}
}
