//! Broadcasts a validated transaction to its elected chain-storage replicas
//! and, on the replica side, persists it and signs a storage acknowledgement.
//! Concurrency: one send per target node, bounded by a hard deadline, so a
//! single unreachable replica cannot stall the others.

use archethic_crypto::{Crypto, Keypair};
use archethic_networking::{Message, P2P};
use archethic_storage::{ChainIndex, ChainWriter};
use archethic_types::keys::PublicKey;
use archethic_types::transaction::{Transaction, TransactionSummary};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

pub struct ReplicationDriver {
    p2p: Arc<dyn P2P>,
    deadline: Duration,
}

impl ReplicationDriver {
    pub fn new(p2p: Arc<dyn P2P>, deadline: Duration) -> Self {
        Self { p2p, deadline }
    }

    /// Sends `ReplicateTransactionChain` to every target, independently
    /// bounded by `deadline`. Returns the targets that could not be reached
    /// in time; storage acknowledgements themselves arrive later as separate
    /// messages back to the issuing worker's mailbox.
    pub async fn broadcast_chain_replication(
        &self,
        targets: &[PublicKey],
        transaction: Transaction,
        from: PublicKey,
    ) -> Vec<PublicKey> {
        let sends = targets.iter().map(|target| {
            let p2p = self.p2p.clone();
            let target = target.clone();
            let message = Message::ReplicateTransactionChain {
                transaction: transaction.clone(),
                from: from.clone(),
            };
            async move {
                let result = tokio::time::timeout(self.deadline, p2p.send_message(&target, message)).await;
                match result {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        tracing::warn!(target: "mining", node = %target, error = %e, "replication send failed");
                        Some(target)
                    }
                    Err(_) => {
                        tracing::warn!(target: "mining", node = %target, "replication send exceeded deadline");
                        Some(target)
                    }
                }
            }
        });
        join_all(sends).await.into_iter().flatten().collect()
    }

    /// Sends `ReplicateTransaction` (non-chain, single-record) to I/O
    /// replicas and `ReplicationAttestation` to the welcome node and beacon
    /// storage nodes once quorum is reached.
    pub async fn notify_attestation(
        &self,
        welcome_node: &PublicKey,
        beacon_storage_nodes: &[PublicKey],
        io_nodes: &[PublicKey],
        summary: TransactionSummary,
        confirmations: Vec<(PublicKey, Vec<u8>)>,
        transaction: Transaction,
        from: PublicKey,
    ) {
        let attestation = Message::ReplicationAttestation {
            summary,
            confirmations,
            from: from.clone(),
        };
        let mut attestation_targets = beacon_storage_nodes.to_vec();
        attestation_targets.push(welcome_node.clone());
        if let Err(e) = self.p2p.broadcast_message(&attestation_targets, attestation).await {
            tracing::warn!(target: "mining", error = %e, "failed to deliver replication attestation to every target");
        }

        let replicate = Message::ReplicateTransaction { transaction, from };
        if let Err(e) = self.p2p.broadcast_message(io_nodes, replicate).await {
            tracing::warn!(target: "mining", error = %e, "failed to deliver transaction to every i/o replica");
        }
    }
}

/// Verifies a storage node's acknowledgement signature against the canonical
/// summary bytes, using the node's own public key (not the coordinator's).
pub fn verify_storage_signature(
    crypto: &dyn Crypto,
    summary: &TransactionSummary,
    node: &PublicKey,
    signature: &[u8],
) -> bool {
    crypto.verify(node, &summary.serialize(), signature).is_ok()
}

/// Replica-side handling of an incoming `ReplicateTransactionChain` or
/// `ReplicateTransaction`: persists the transaction then replies with a
/// signed `AcknowledgeStorage`, or an `Error` if persistence failed.
pub async fn handle_incoming_replication(
    index: Arc<ChainIndex>,
    writer: Arc<ChainWriter>,
    crypto: &dyn Crypto,
    local_keypair: &Keypair,
    p2p: &dyn P2P,
    transaction: Transaction,
    coordinator: PublicKey,
) {
    let address = transaction.address.clone();
    let Some(summary) = TransactionSummary::from_transaction(&transaction) else {
        let _ = p2p
            .send_message(
                &coordinator,
                Message::Error {
                    address,
                    reason: "transaction has no validation stamp to replicate".to_string(),
                    from: local_keypair.public_key().clone(),
                },
            )
            .await;
        return;
    };

    let hash_algo_id = transaction.address.hash_algo_id();
    let previous_address = crypto.derive_address(&transaction.previous_public_key, hash_algo_id).ok();
    let genesis = match &previous_address {
        Some(prev) => index
            .get_tx_entry(prev)
            .map(|e| e.genesis_address)
            .unwrap_or_else(|_| prev.clone()),
        None => transaction.address.clone(),
    };
    let previous_for_append = previous_address.unwrap_or_else(|| genesis.clone());
    let timestamp = summary.timestamp as u32;

    let append_result = writer
        .append_transaction(genesis, previous_for_append, timestamp, transaction)
        .await;

    match append_result {
        Ok(()) => {
            let signature = match crypto.sign(local_keypair, &summary.serialize()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::warn!(target: "mining", %address, error = %e, "failed to sign storage acknowledgement");
                    return;
                }
            };
            let _ = p2p
                .send_message(
                    &coordinator,
                    Message::AcknowledgeStorage {
                        summary,
                        signature,
                        from: local_keypair.public_key().clone(),
                    },
                )
                .await;
        }
        Err(e) => {
            let _ = p2p
                .send_message(
                    &coordinator,
                    Message::Error {
                        address,
                        reason: e.to_string(),
                        from: local_keypair.public_key().clone(),
                    },
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archethic_crypto::DefaultCrypto;
    use archethic_types::transaction::TransactionType;

    #[test]
    fn verify_storage_signature_accepts_a_genuine_signature_and_rejects_a_forged_one() {
        let crypto = DefaultCrypto;
        let keypair = crypto.generate_keypair(0).unwrap();
        let summary = TransactionSummary {
            address: archethic_types::keys::Address::new(0, 0, vec![0x01; 32]).unwrap(),
            tx_type: TransactionType::Transfer,
            timestamp: 1,
            validation_stamp_signature: vec![1, 2, 3],
            fee: 0,
        };
        let signature = crypto.sign(&keypair, &summary.serialize()).unwrap();
        assert!(verify_storage_signature(&crypto, &summary, keypair.public_key(), &signature));

        let other = crypto.generate_keypair(0).unwrap();
        assert!(!verify_storage_signature(&crypto, &summary, other.public_key(), &signature));
    }
}
