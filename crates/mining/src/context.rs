//! `ValidationContext`: a pure, functionally-updated accumulator of one
//! transaction's mining state. Worker -> context ownership is one-way; the
//! context never references the worker back.

use crate::error::MiningError;
use archethic_crypto::{Crypto, Keypair};
use archethic_types::keys::{Address, PublicKey};
use archethic_types::transaction::{
    CrossValidationStamp, Inconsistency, LedgerOperations, Transaction, TransactionMovement,
    UnspentOutput, ValidationStamp,
};

/// How many chain-storage acknowledgements are required before replication is
/// considered complete. Defaults to `All`, matching the source behavior this
/// was distilled from (see the open question on `enough_storage_confirmations?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageQuorum {
    All,
    Threshold(usize),
}

impl Default for StorageQuorum {
    fn default() -> Self {
        StorageQuorum::All
    }
}

/// Assignment of storage replicas to the three replication fan-outs the
/// coordinator triggers once consensus is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationTree {
    pub chain_nodes: Vec<PublicKey>,
    pub beacon_nodes: Vec<PublicKey>,
    pub io_nodes: Vec<PublicKey>,
}

#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub transaction: Transaction,
    pub welcome_node: PublicKey,
    pub validation_nodes: Vec<PublicKey>,
    pub chain_storage_nodes: Vec<PublicKey>,
    pub beacon_storage_nodes: Vec<PublicKey>,
    pub previous_tx: Option<Transaction>,
    pub unspent_outputs: Vec<UnspentOutput>,
    pub chain_storage_view: Vec<bool>,
    pub beacon_storage_view: Vec<bool>,
    /// Parallel to `validation_nodes[1..]` (the cross-validators): whether
    /// that cross-validator has contributed its context.
    pub cross_validation_nodes_confirmation: Vec<bool>,
    pub validation_stamp: Option<ValidationStamp>,
    pub cross_validation_stamps: Vec<CrossValidationStamp>,
    pub replication_tree: ReplicationTree,
    pub storage_nodes_confirmations: Vec<(PublicKey, Vec<u8>)>,
    pub storage_quorum: StorageQuorum,
}

impl ValidationContext {
    pub fn new(
        transaction: Transaction,
        welcome_node: PublicKey,
        validation_nodes: Vec<PublicKey>,
        chain_storage_nodes: Vec<PublicKey>,
        beacon_storage_nodes: Vec<PublicKey>,
        storage_quorum: StorageQuorum,
    ) -> Self {
        let cross_validator_count = validation_nodes.len().saturating_sub(1);
        ValidationContext {
            transaction,
            welcome_node,
            validation_nodes,
            chain_storage_nodes,
            beacon_storage_nodes,
            previous_tx: None,
            unspent_outputs: Vec::new(),
            chain_storage_view: Vec::new(),
            beacon_storage_view: Vec::new(),
            cross_validation_nodes_confirmation: vec![false; cross_validator_count],
            validation_stamp: None,
            cross_validation_stamps: Vec::new(),
            replication_tree: ReplicationTree::default(),
            storage_nodes_confirmations: Vec::new(),
            storage_quorum,
        }
    }

    /// The coordinator is always the first node in election order.
    pub fn coordinator(&self) -> Option<&PublicKey> {
        self.validation_nodes.first()
    }

    pub fn cross_validators(&self) -> &[PublicKey] {
        self.validation_nodes.get(1..).unwrap_or(&[])
    }

    fn cross_validator_index(&self, node: &PublicKey) -> Option<usize> {
        self.cross_validators().iter().position(|n| n == node)
    }

    /// Records a cross-validator's reported context (previous transaction,
    /// unspent outputs, storage-node views). The first reporter's view of the
    /// previous transaction/unspent-outputs is kept as the coordinator's own
    /// (subsequent reports only mark confirmation).
    pub fn add_mining_context(
        mut self,
        from: &PublicKey,
        previous_tx: Option<Transaction>,
        unspent_outputs: Vec<UnspentOutput>,
        chain_storage_view: Vec<bool>,
        beacon_storage_view: Vec<bool>,
    ) -> Self {
        if let Some(idx) = self.cross_validator_index(from) {
            if !self.cross_validation_nodes_confirmation[idx] {
                if self.previous_tx.is_none() && previous_tx.is_some() {
                    self.previous_tx = previous_tx;
                }
                if self.unspent_outputs.is_empty() {
                    self.unspent_outputs = unspent_outputs;
                }
                if self.chain_storage_view.is_empty() {
                    self.chain_storage_view = chain_storage_view;
                }
                if self.beacon_storage_view.is_empty() {
                    self.beacon_storage_view = beacon_storage_view;
                }
                self.cross_validation_nodes_confirmation[idx] = true;
            }
        }
        self
    }

    pub fn confirmed_cross_validators(&self) -> Vec<PublicKey> {
        self.cross_validators()
            .iter()
            .zip(self.cross_validation_nodes_confirmation.iter())
            .filter(|(_, confirmed)| **confirmed)
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// True once every cross-validator has reported its context.
    pub fn enough_confirmations(&self) -> bool {
        !self.cross_validation_nodes_confirmation.is_empty()
            && self.cross_validation_nodes_confirmation.iter().all(|c| *c)
    }

    /// Builds and signs the validation stamp: fee, ledger movements derived
    /// from the submitted transfers, proof of work (the first known origin key
    /// whose signature verifies against the transaction), proof of integrity
    /// (hash chaining this transaction to its predecessor), and proof of
    /// election (the election seed).
    pub fn create_validation_stamp(
        mut self,
        crypto: &dyn Crypto,
        coordinator_keypair: &Keypair,
        known_origin_keys: &[PublicKey],
        election_seed: Vec<u8>,
        timestamp: u64,
    ) -> Result<Self, MiningError> {
        let payload = self.transaction.origin_signed_payload();
        let proof_of_work = known_origin_keys
            .iter()
            .find(|key| {
                crypto
                    .verify(key, &payload, &self.transaction.origin_signature)
                    .is_ok()
            })
            .cloned()
            .ok_or(MiningError::UnknownProofOfWork)?;

        let mut integrity_payload = Vec::new();
        if let Some(prev) = &self.previous_tx {
            integrity_payload.extend_from_slice(&prev.origin_signature);
        }
        integrity_payload.extend_from_slice(&payload);
        let proof_of_integrity = crypto
            .hash(archethic_types::keys::HashAlgoId::Sha256.id(), &integrity_payload)
            .map_err(|e| MiningError::Crypto(e.to_string()))?;

        let transaction_movements: Vec<TransactionMovement> = self
            .transaction
            .data
            .ledger
            .transfers
            .iter()
            .map(|t| TransactionMovement {
                to: t.to.clone(),
                amount: t.amount,
                token_address: t.token_address.clone(),
            })
            .collect();

        let ledger_operations = LedgerOperations {
            fee: transaction_movements.len() as u64,
            transaction_movements,
            unspent_outputs: self.unspent_outputs.clone(),
            node_movements: Vec::new(),
        };

        let mut stamp = ValidationStamp {
            timestamp,
            proof_of_work,
            proof_of_integrity,
            proof_of_election: election_seed,
            ledger_operations,
            signature: Vec::new(),
        };
        let to_sign = stamp.signed_payload();
        stamp.signature = crypto
            .sign(coordinator_keypair, &to_sign)
            .map_err(|e| MiningError::Crypto(e.to_string()))?;

        self.validation_stamp = Some(stamp);
        Ok(self)
    }

    pub fn create_replication_tree(mut self) -> Self {
        self.replication_tree = ReplicationTree {
            chain_nodes: self.chain_storage_nodes.clone(),
            beacon_nodes: self.beacon_storage_nodes.clone(),
            io_nodes: self.chain_storage_nodes.clone(),
        };
        self
    }

    pub fn cross_validate(mut self, stamp: CrossValidationStamp) -> Self {
        self.cross_validation_stamps.push(stamp);
        self
    }

    /// True once every confirmed cross-validator has returned a stamp.
    pub fn enough_cross_validation_stamps(&self) -> bool {
        let confirmed = self.cross_validation_nodes_confirmation.iter().filter(|c| **c).count();
        confirmed > 0 && self.cross_validation_stamps.len() >= confirmed
    }

    /// True iff every collected cross-validation stamp reports the exact same
    /// (possibly empty) set of inconsistencies.
    pub fn atomic_commitment(&self) -> bool {
        match self.cross_validation_stamps.split_first() {
            None => false,
            Some((first, rest)) => {
                let baseline = sorted_inconsistencies(&first.inconsistencies);
                rest.iter()
                    .all(|s| sorted_inconsistencies(&s.inconsistencies) == baseline)
            }
        }
    }

    pub fn add_storage_confirmation(mut self, node: PublicKey, signature: Vec<u8>) -> Self {
        if !self.storage_nodes_confirmations.iter().any(|(n, _)| n == &node) {
            self.storage_nodes_confirmations.push((node, signature));
        }
        self
    }

    pub fn enough_storage_confirmations(&self) -> bool {
        let required = match self.storage_quorum {
            StorageQuorum::All => self.chain_storage_nodes.len(),
            StorageQuorum::Threshold(n) => n.min(self.chain_storage_nodes.len()),
        };
        required > 0 && self.storage_nodes_confirmations.len() >= required
    }

    pub fn address(&self) -> &Address {
        &self.transaction.address
    }
}

fn sorted_inconsistencies(inconsistencies: &[Inconsistency]) -> Vec<u8> {
    let mut ids: Vec<u8> = inconsistencies.iter().map(|i| i.id()).collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use archethic_crypto::DefaultCrypto;
    use archethic_types::transaction::TransactionData;

    fn key(fill: u8) -> PublicKey {
        PublicKey::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn address(fill: u8) -> Address {
        Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn sample_tx() -> Transaction {
        Transaction {
            address: address(0x07),
            previous_public_key: key(0x01),
            tx_type: archethic_types::transaction::TransactionType::Transfer,
            data: TransactionData::default(),
            previous_signature: vec![1, 2, 3],
            origin_signature: vec![],
            validation_stamp: None,
            cross_validation_stamps: vec![],
        }
    }

    fn base_context() -> ValidationContext {
        ValidationContext::new(
            sample_tx(),
            key(0x99),
            vec![key(1), key(2), key(3)],
            vec![key(10), key(11)],
            vec![key(20)],
            StorageQuorum::All,
        )
    }

    #[test]
    fn enough_confirmations_requires_every_cross_validator() {
        let ctx = base_context();
        assert!(!ctx.enough_confirmations());
        let ctx = ctx.add_mining_context(&key(2), None, vec![], vec![], vec![]);
        assert!(!ctx.enough_confirmations());
        let ctx = ctx.add_mining_context(&key(3), None, vec![], vec![], vec![]);
        assert!(ctx.enough_confirmations());
    }

    #[test]
    fn atomic_commitment_requires_identical_inconsistencies() {
        let ctx = base_context();
        let ctx = ctx.cross_validate(CrossValidationStamp {
            node_public_key: key(2),
            signature: vec![],
            inconsistencies: vec![],
        });
        assert!(ctx.atomic_commitment());
        let ctx = ctx.cross_validate(CrossValidationStamp {
            node_public_key: key(3),
            signature: vec![],
            inconsistencies: vec![Inconsistency::ProofOfWork],
        });
        assert!(!ctx.atomic_commitment());
    }

    #[test]
    fn enough_storage_confirmations_defaults_to_all_replicas() {
        let ctx = base_context();
        assert!(!ctx.enough_storage_confirmations());
        let ctx = ctx.add_storage_confirmation(key(10), vec![1]);
        assert!(!ctx.enough_storage_confirmations());
        let ctx = ctx.add_storage_confirmation(key(11), vec![2]);
        assert!(ctx.enough_storage_confirmations());
    }

    #[test]
    fn create_validation_stamp_finds_matching_origin_key() {
        let crypto = DefaultCrypto;
        let keypair = crypto.generate_keypair(0).unwrap();
        let mut tx = sample_tx();
        let payload = tx.origin_signed_payload();
        tx.origin_signature = crypto.sign(&keypair, &payload).unwrap();

        let ctx = ValidationContext::new(
            tx,
            key(0x99),
            vec![key(1)],
            vec![key(10)],
            vec![key(20)],
            StorageQuorum::All,
        );
        let known_keys = vec![keypair.public_key().clone()];
        let ctx = ctx
            .create_validation_stamp(&crypto, &keypair, &known_keys, vec![0xAA], 1_700_000_000)
            .unwrap();
        assert_eq!(ctx.validation_stamp.unwrap().proof_of_work, *keypair.public_key());
    }
}
