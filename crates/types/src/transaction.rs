//! Transaction, validation stamp and cross-validation stamp data model.

use crate::keys::{Address, PublicKey};

/// The kind of chain a transaction belongs to, per the Archethic transaction taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Transfer,
    Node,
    NodeSharedSecrets,
    Beacon,
    CodeApproval,
    Token,
    Data,
    Contract,
    Oracle,
}

impl TransactionType {
    pub fn id(self) -> u8 {
        match self {
            TransactionType::Transfer => 0,
            TransactionType::Node => 1,
            TransactionType::NodeSharedSecrets => 2,
            TransactionType::Beacon => 3,
            TransactionType::CodeApproval => 4,
            TransactionType::Token => 5,
            TransactionType::Data => 6,
            TransactionType::Contract => 7,
            TransactionType::Oracle => 8,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => TransactionType::Transfer,
            1 => TransactionType::Node,
            2 => TransactionType::NodeSharedSecrets,
            3 => TransactionType::Beacon,
            4 => TransactionType::CodeApproval,
            5 => TransactionType::Token,
            6 => TransactionType::Data,
            7 => TransactionType::Contract,
            8 => TransactionType::Oracle,
            _ => return None,
        })
    }

    /// All variants, for iterating type indices at startup recovery.
    pub fn all() -> &'static [TransactionType] {
        &[
            TransactionType::Transfer,
            TransactionType::Node,
            TransactionType::NodeSharedSecrets,
            TransactionType::Beacon,
            TransactionType::CodeApproval,
            TransactionType::Token,
            TransactionType::Data,
            TransactionType::Contract,
            TransactionType::Oracle,
        ]
    }

    pub fn as_file_name(self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Node => "node",
            TransactionType::NodeSharedSecrets => "node_shared_secrets",
            TransactionType::Beacon => "beacon",
            TransactionType::CodeApproval => "code_approval",
            TransactionType::Token => "token",
            TransactionType::Data => "data",
            TransactionType::Contract => "contract",
            TransactionType::Oracle => "oracle",
        }
    }
}

/// A single movement of UCO or a token to a destination address, as recorded either
/// in the submitted transaction's ledger or in the coordinator's computed ledger
/// operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransfer {
    pub to: Address,
    pub amount: u64,
    pub token_address: Option<Address>,
}

/// The transfers a transaction requests, before validation computes the actual
/// ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionLedger {
    pub transfers: Vec<LedgerTransfer>,
}

/// Content carried by a transaction: arbitrary payload, optional smart contract
/// code, the requested ledger movements, and opaque ownership/secret-sharing
/// entries (whose internal structure is a named-but-out-of-scope collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionData {
    pub content: Vec<u8>,
    pub code: Option<Vec<u8>>,
    pub ledger: TransactionLedger,
    pub ownerships: Vec<Vec<u8>>,
}

/// A transaction as it travels through mining: user-submitted fields plus the
/// stamps mining attaches once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub address: Address,
    pub previous_public_key: PublicKey,
    pub tx_type: TransactionType,
    pub data: TransactionData,
    pub previous_signature: Vec<u8>,
    pub origin_signature: Vec<u8>,
    pub validation_stamp: Option<ValidationStamp>,
    pub cross_validation_stamps: Vec<CrossValidationStamp>,
}

impl Transaction {
    /// Bytes the coordinator's `origin_signature` was computed over: every
    /// submission field, excluding signatures and stamps.
    pub fn origin_signed_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.address.as_bytes());
        out.extend_from_slice(self.previous_public_key.as_bytes());
        out.push(self.tx_type.id());
        out.extend_from_slice(&self.data.content);
        out.extend_from_slice(&self.previous_signature);
        out
    }
}

/// A single ledger movement attributed to a destination address, as computed by
/// the coordinator while building the validation stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMovement {
    pub to: Address,
    pub amount: u64,
    pub token_address: Option<Address>,
}

/// An unspent output remaining at an address after a transaction settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub from: Address,
    pub amount: u64,
    pub token_address: Option<Address>,
    pub timestamp: u64,
}

/// A movement of fees/rewards to a validator node, keyed by its public key
/// rather than a chain address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMovement {
    pub to: PublicKey,
    pub amount: u64,
}

/// The ledger effects a validation stamp commits to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerOperations {
    pub fee: u64,
    pub transaction_movements: Vec<TransactionMovement>,
    pub unspent_outputs: Vec<UnspentOutput>,
    pub node_movements: Vec<NodeMovement>,
}

/// The coordinator-signed attestation of a transaction's validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationStamp {
    pub timestamp: u64,
    pub proof_of_work: PublicKey,
    pub proof_of_integrity: Vec<u8>,
    pub proof_of_election: Vec<u8>,
    pub ledger_operations: LedgerOperations,
    pub signature: Vec<u8>,
}

impl ValidationStamp {
    /// Bytes the coordinator's `signature` is computed over: everything except
    /// the signature itself.
    pub fn signed_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(self.proof_of_work.as_bytes());
        out.extend_from_slice(&self.proof_of_integrity);
        out.extend_from_slice(&self.proof_of_election);
        out.extend_from_slice(&self.ledger_operations.fee.to_be_bytes());
        for m in &self.ledger_operations.transaction_movements {
            out.extend_from_slice(m.to.as_bytes());
            out.extend_from_slice(&m.amount.to_be_bytes());
        }
        out
    }
}

/// A defect a cross-validator can report against a validation stamp. An empty
/// list of inconsistencies means the cross-validator affirms the stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inconsistency {
    Signature,
    TransactionMovements,
    ProofOfWork,
    ProofOfIntegrity,
    ProofOfElection,
    Timestamp,
}

impl Inconsistency {
    pub fn id(self) -> u8 {
        match self {
            Inconsistency::Signature => 0,
            Inconsistency::TransactionMovements => 1,
            Inconsistency::ProofOfWork => 2,
            Inconsistency::ProofOfIntegrity => 3,
            Inconsistency::ProofOfElection => 4,
            Inconsistency::Timestamp => 5,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => Inconsistency::Signature,
            1 => Inconsistency::TransactionMovements,
            2 => Inconsistency::ProofOfWork,
            3 => Inconsistency::ProofOfIntegrity,
            4 => Inconsistency::ProofOfElection,
            5 => Inconsistency::Timestamp,
            _ => return None,
        })
    }
}

/// A cross-validator's signed agreement (or disagreement) with a validation stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossValidationStamp {
    pub node_public_key: PublicKey,
    pub signature: Vec<u8>,
    pub inconsistencies: Vec<Inconsistency>,
}

impl CrossValidationStamp {
    pub fn is_affirmative(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// A compact, canonical summary of a validated transaction, used wherever the
/// full transaction would be unnecessarily large to carry over the wire (storage
/// acknowledgement signatures, replication attestations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub address: Address,
    pub tx_type: TransactionType,
    pub timestamp: u64,
    pub validation_stamp_signature: Vec<u8>,
    pub fee: u64,
}

impl TransactionSummary {
    pub fn from_transaction(tx: &Transaction) -> Option<Self> {
        let stamp = tx.validation_stamp.as_ref()?;
        Some(TransactionSummary {
            address: tx.address.clone(),
            tx_type: tx.tx_type,
            timestamp: stamp.timestamp,
            validation_stamp_signature: stamp.signature.clone(),
            fee: stamp.ledger_operations.fee,
        })
    }

    /// Canonical byte form, suitable for signing and for comparing summaries
    /// derived independently by different replicas.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.address.as_bytes());
        out.push(self.tx_type.id());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&(self.validation_stamp_signature.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.validation_stamp_signature);
        out.extend_from_slice(&self.fee.to_be_bytes());
        out
    }
}
