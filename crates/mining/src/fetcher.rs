//! Retrieval of a transaction's mining context (previous transaction, unspent
//! outputs) from this node's own embedded chain storage, within a bounded
//! time budget. Every elected chain-storage node runs this fetcher against
//! its local `ChainIndex`; a node that does not hold the previous chain
//! degrades to an empty context, which cross-validation then reports as a
//! proof-of-integrity inconsistency.

use archethic_crypto::{Crypto, DefaultCrypto};
use archethic_storage::ChainIndex;
use archethic_types::keys::PublicKey;
use archethic_types::transaction::{Transaction, UnspentOutput};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FetchedContext {
    pub previous_tx: Option<Transaction>,
    pub unspent_outputs: Vec<UnspentOutput>,
    pub chain_storage_view: Vec<bool>,
    pub beacon_storage_view: Vec<bool>,
}

pub struct TransactionContextFetcher {
    index: Arc<ChainIndex>,
    budget: Duration,
}

impl TransactionContextFetcher {
    pub fn new(index: Arc<ChainIndex>, budget: Duration) -> Self {
        Self { index, budget }
    }

    /// Resolves `transaction`'s previous address (the hash of its
    /// `previous_public_key` under the same hash algorithm as its own
    /// address) and fetches that transaction plus its unspent outputs.
    /// Returns an empty context if nothing is found or `budget` elapses first.
    pub async fn fetch(&self, transaction: &Transaction) -> FetchedContext {
        let index = self.index.clone();
        let previous_public_key = transaction.previous_public_key.clone();
        let hash_algo_id = transaction.address.hash_algo_id();

        let result = tokio::time::timeout(
            self.budget,
            tokio::task::spawn_blocking(move || fetch_previous(&index, &previous_public_key, hash_algo_id)),
        )
        .await;

        match result {
            Ok(Ok(context)) => context,
            Ok(Err(join_error)) => {
                tracing::warn!(target: "mining", error = %join_error, "context fetch task panicked");
                FetchedContext::default()
            }
            Err(_elapsed) => {
                tracing::warn!(target: "mining", "context fetch exceeded time budget");
                FetchedContext::default()
            }
        }
    }
}

fn fetch_previous(index: &ChainIndex, previous_public_key: &PublicKey, hash_algo_id: u8) -> FetchedContext {
    let crypto = DefaultCrypto;
    let previous_address = match crypto.derive_address(previous_public_key, hash_algo_id) {
        Ok(addr) => addr,
        Err(_) => return FetchedContext::default(),
    };

    let previous_tx = index.read_transaction(&previous_address).ok();
    let unspent_outputs = previous_tx
        .as_ref()
        .and_then(|tx| tx.validation_stamp.as_ref())
        .map(|stamp| stamp.ledger_operations.unspent_outputs.clone())
        .unwrap_or_default();

    FetchedContext {
        previous_tx,
        unspent_outputs,
        chain_storage_view: Vec::new(),
        beacon_storage_view: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archethic_storage::ChainWriter;
    use archethic_types::keys::{Address, CurveId, HashAlgoId};
    use archethic_types::transaction::{LedgerOperations, TransactionData, TransactionType, ValidationStamp};

    fn key(fill: u8) -> PublicKey {
        PublicKey::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn address(fill: u8) -> Address {
        Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn plain_tx(addr: Address, previous_public_key: PublicKey) -> Transaction {
        Transaction {
            address: addr,
            previous_public_key,
            tx_type: TransactionType::Transfer,
            data: TransactionData::default(),
            previous_signature: vec![1],
            origin_signature: vec![2],
            validation_stamp: None,
            cross_validation_stamps: vec![],
        }
    }

    #[tokio::test]
    async fn fetch_returns_empty_context_when_previous_transaction_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(ChainIndex::open(dir.path()).unwrap());
        let fetcher = TransactionContextFetcher::new(index, Duration::from_millis(200));

        let tx = plain_tx(address(0x02), key(0x99));
        let context = fetcher.fetch(&tx).await;
        assert!(context.previous_tx.is_none());
        assert!(context.unspent_outputs.is_empty());
    }

    #[tokio::test]
    async fn fetch_finds_previous_transaction_stored_under_the_derived_address() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(ChainIndex::open(dir.path()).unwrap());
        let writer = ChainWriter::spawn(index.clone(), Some(2));

        let crypto = DefaultCrypto;
        let previous_keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let previous_address = crypto
            .derive_address(previous_keypair.public_key(), HashAlgoId::Sha256.id())
            .unwrap();

        let mut previous_tx = plain_tx(previous_address.clone(), key(0x01));
        previous_tx.validation_stamp = Some(ValidationStamp {
            timestamp: 1,
            proof_of_work: key(0x01),
            proof_of_integrity: vec![],
            proof_of_election: vec![],
            ledger_operations: LedgerOperations {
                fee: 0,
                transaction_movements: vec![],
                unspent_outputs: vec![UnspentOutput {
                    from: previous_address.clone(),
                    amount: 10,
                    token_address: None,
                    timestamp: 1,
                }],
                node_movements: vec![],
            },
            signature: vec![],
        });

        writer
            .append_transaction(previous_address.clone(), previous_address.clone(), 1, previous_tx.clone())
            .await
            .unwrap();
        writer.shutdown().await;

        let fetcher = TransactionContextFetcher::new(index, Duration::from_millis(200));
        let current_tx = plain_tx(address(0x02), previous_keypair.public_key().clone());
        let context = fetcher.fetch(&current_tx).await;

        assert_eq!(context.previous_tx.unwrap().address, previous_address);
        assert_eq!(context.unspent_outputs.len(), 1);
    }
}
