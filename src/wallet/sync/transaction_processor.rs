use crate::explorer::ApiTransaction;
use crate::wallet::{RawTransaction, RawTxType, TransferLeg};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Stand-in sender of transactions without a resolvable input address (coinbase).
pub const UNKNOWN_COUNTERPART: &str = "unknown";

/// Turns one provider payload, seen from a queried address, into a `RawTransaction`.
///
/// One implementation exists per provider; everything downstream only sees `RawTransaction`.
pub trait TransactionClassifier: Send + Sync {
	type Payload;

	/// `None` when the queried address takes no part in the payload.
	fn classify(&self, queried: &str, payload: &Self::Payload) -> Option<RawTransaction>;

	fn classify_batch(&self, queried: &str, payloads: &[Self::Payload]) -> Vec<RawTransaction> {
		payloads
			.iter()
			.filter_map(|payload| self.classify(queried, payload))
			.collect()
	}
}

/// Classifier for blockchain.info transactions
#[derive(Clone, Debug)]
pub struct BitcoinClassifier {
	asset: String,
}

impl BitcoinClassifier {
	pub fn new(asset: impl Into<String>) -> Self {
		Self {
			asset: asset.into(),
		}
	}
}

impl TransactionClassifier for BitcoinClassifier {
	type Payload = ApiTransaction;

	fn classify(&self, queried: &str, tx: &ApiTransaction) -> Option<RawTransaction> {
		let spent: i64 = tx
			.inputs
			.iter()
			.filter_map(|input| input.prev_out.as_ref())
			.filter(|prev| prev.addr.as_deref() == Some(queried))
			.map(|prev| prev.value)
			.sum();
		let is_sender = tx
			.inputs
			.iter()
			.filter_map(|input| input.prev_out.as_ref())
			.any(|prev| prev.addr.as_deref() == Some(queried));

		let received: i64 = tx
			.out
			.iter()
			.filter(|out| out.addr.as_deref() == Some(queried))
			.map(|out| out.value)
			.sum();
		let is_receiver = tx.out.iter().any(|out| out.addr.as_deref() == Some(queried));

		let (kind, quantity, fee, from, to) = if is_sender {
			// change returning to the queried address is not moved
			let destination = tx
				.out
				.iter()
				.filter_map(|out| out.addr.as_deref())
				.find(|addr| *addr != queried)
				.unwrap_or(queried);
			(
				RawTxType::OutgoingUndetermined,
				(spent - received).max(0),
				tx.fee,
				queried.to_string(),
				destination.to_string(),
			)
		} else if is_receiver {
			let source = tx
				.inputs
				.iter()
				.filter_map(|input| input.prev_out.as_ref())
				.find_map(|prev| prev.addr.as_deref())
				.unwrap_or(UNKNOWN_COUNTERPART);
			(
				RawTxType::IncomingUndetermined,
				received,
				0,
				source.to_string(),
				queried.to_string(),
			)
		} else {
			warn!("Transaction {} does not involve {}", tx.hash, queried);
			return None;
		};

		debug!(
			"Classified {} for {} as {} ({} sat, fee {})",
			tx.hash,
			queried,
			kind.as_str(),
			quantity,
			fee
		);

		Some(RawTransaction {
			timestamp: tx.time,
			kind,
			txid: tx.hash.clone(),
			quantity,
			fee,
			from,
			to,
			quote_asset: self.asset.clone(),
			fee_asset: self.asset.clone(),
			inputs: tx
				.inputs
				.iter()
				.filter_map(|input| input.prev_out.as_ref())
				.filter_map(|prev| Some(TransferLeg::new(prev.addr.clone()?, prev.value)))
				.collect(),
			outputs: tx
				.out
				.iter()
				.filter_map(|out| Some(TransferLeg::new(out.addr.clone()?, out.value)))
				.collect(),
		})
	}
}

/// Collapse the views of several queried addresses into one transaction per txid, oldest first.
///
/// A transaction spending from one address of a wallet and paying change to another shows up in
/// the history of both. The spending view is kept because only it carries the fee.
pub fn merge_views(mut raw: Vec<RawTransaction>) -> Vec<RawTransaction> {
	raw.sort_by(|a, b| {
		a.timestamp
			.cmp(&b.timestamp)
			.then_with(|| a.txid.cmp(&b.txid))
			.then_with(|| is_outgoing(b).cmp(&is_outgoing(a)))
	});
	raw.dedup_by(|later, kept| later.txid == kept.txid);
	raw
}

fn is_outgoing(raw: &RawTransaction) -> bool {
	raw.kind == RawTxType::OutgoingUndetermined
}

/// Direction and amounts of a transaction relative to all addresses of a tracked wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
	pub kind: RawTxType,
	/// Address of the wallet taking part: the first spending one, or the first receiving one.
	pub owned: String,
	pub counterpart: String,
	pub quantity: i64,
	pub fee: i64,
}

/// Settle `raw` for a wallet owning `own`.
///
/// Outgoing when any input belongs to the wallet. The quantity is what left the wallet (inputs
/// from it minus outputs back to it) and the counterpart is the first output outside of it. A
/// transaction paying only the wallet itself moves the value of the first output that is not one
/// of the spending addresses. Incoming transactions carry the value received by the wallet and no
/// fee. `None` when no leg belongs to the wallet.
pub fn settle(raw: &RawTransaction, own: &HashSet<String>) -> Option<Settlement> {
	let is_own = |leg: &&TransferLeg| own.contains(&leg.address);
	let spent: i64 = raw.inputs.iter().filter(is_own).map(|leg| leg.value).sum();
	let received: i64 = raw.outputs.iter().filter(is_own).map(|leg| leg.value).sum();

	if let Some(source) = raw.inputs.iter().find(is_own) {
		let external = raw.outputs.iter().find(|leg| !own.contains(&leg.address));
		let (counterpart, quantity) = match external {
			Some(leg) => (leg.address.clone(), (spent - received).max(0)),
			None => {
				let moved = raw
					.outputs
					.iter()
					.find(|leg| !raw.inputs.iter().any(|input| input.address == leg.address))
					.or(raw.outputs.first());
				match moved {
					Some(leg) => (leg.address.clone(), leg.value),
					None => (source.address.clone(), 0),
				}
			}
		};
		let fee = if is_outgoing(raw) { raw.fee } else { 0 };

		return Some(Settlement {
			kind: RawTxType::OutgoingUndetermined,
			owned: source.address.clone(),
			counterpart,
			quantity,
			fee,
		});
	}

	let target = raw.outputs.iter().find(is_own)?;
	let counterpart = raw
		.inputs
		.first()
		.map(|leg| leg.address.as_str())
		.unwrap_or(UNKNOWN_COUNTERPART);

	Some(Settlement {
		kind: RawTxType::IncomingUndetermined,
		owned: target.address.clone(),
		counterpart: counterpart.to_string(),
		quantity: received,
		fee: 0,
	})
}
