//! Wire messages exchanged between mining workers on different nodes.

use archethic_types::keys::{Address, PublicKey};
use archethic_types::transaction::{CrossValidationStamp, Transaction, TransactionSummary, ValidationStamp};

/// A mining protocol message, addressed to a specific transaction's worker on
/// the receiving node (via `address()`), carrying the sender's public key so
/// the receiver can route a reply.
#[derive(Debug, Clone)]
pub enum Message {
    /// Cross-validator to coordinator: this node's view of the previous
    /// transaction's storage replicas and its local availability of the
    /// elected chain/beacon storage sets, once it has fetched its own context.
    AddMiningContext {
        transaction: Transaction,
        validation_nodes: Vec<PublicKey>,
        previous_storage_nodes: Vec<PublicKey>,
        chain_storage_view: Vec<bool>,
        beacon_storage_view: Vec<bool>,
        from: PublicKey,
    },
    /// Coordinator to cross-validators: the computed validation stamp, to be
    /// cross-validated, along with the replication tree and which
    /// cross-validators were confirmed.
    CrossValidate {
        address: Address,
        validation_stamp: ValidationStamp,
        chain_replication_nodes: Vec<PublicKey>,
        beacon_replication_nodes: Vec<PublicKey>,
        io_replication_nodes: Vec<PublicKey>,
        confirmed_cross_validators: Vec<PublicKey>,
        from: PublicKey,
    },
    /// Cross-validator to coordinator: this node's cross-validation stamp.
    CrossValidationDone {
        address: Address,
        stamp: CrossValidationStamp,
        from: PublicKey,
    },
    /// Coordinator to storage nodes: replicate this fully-validated transaction
    /// as part of its chain (the tip of a genesis chain).
    ReplicateTransactionChain {
        transaction: Transaction,
        from: PublicKey,
    },
    /// Coordinator to storage nodes: replicate this fully-validated transaction
    /// (a single record, not necessarily the chain tip).
    ReplicateTransaction {
        transaction: Transaction,
        from: PublicKey,
    },
    /// Storage node to coordinator: this node stored the transaction and
    /// signs off on its summary.
    AcknowledgeStorage {
        summary: TransactionSummary,
        signature: Vec<u8>,
        from: PublicKey,
    },
    /// Coordinator to replication-confirmation subscribers: quorum storage
    /// acknowledgements were collected for this transaction.
    ReplicationAttestation {
        summary: TransactionSummary,
        confirmations: Vec<(PublicKey, Vec<u8>)>,
        from: PublicKey,
    },
    /// Any participant to the coordinator: mining failed for this address.
    Error {
        address: Address,
        reason: String,
        from: PublicKey,
    },
}

impl Message {
    /// The transaction address this message concerns, used to route it to the
    /// right `MiningWorker` mailbox.
    pub fn address(&self) -> &Address {
        match self {
            Message::AddMiningContext { transaction, .. } => &transaction.address,
            Message::CrossValidate { address, .. } => address,
            Message::CrossValidationDone { address, .. } => address,
            Message::ReplicateTransactionChain { transaction, .. } => &transaction.address,
            Message::ReplicateTransaction { transaction, .. } => &transaction.address,
            Message::AcknowledgeStorage { summary, .. } => &summary.address,
            Message::ReplicationAttestation { summary, .. } => &summary.address,
            Message::Error { address, .. } => address,
        }
    }

    pub fn from(&self) -> &PublicKey {
        match self {
            Message::AddMiningContext { from, .. }
            | Message::CrossValidate { from, .. }
            | Message::CrossValidationDone { from, .. }
            | Message::ReplicateTransactionChain { from, .. }
            | Message::ReplicateTransaction { from, .. }
            | Message::AcknowledgeStorage { from, .. }
            | Message::ReplicationAttestation { from, .. }
            | Message::Error { from, .. } => from,
        }
    }
}
