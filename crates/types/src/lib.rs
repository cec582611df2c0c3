//! Wire and on-disk data model shared by every Archethic node crate:
//! self-describing addresses and public keys, the transaction/stamp model,
//! and the canonical binary encoding used both on the wire and on disk.

pub mod codec;
pub mod error;
pub mod keys;
pub mod transaction;

pub mod prelude {
    pub use crate::codec::*;
    pub use crate::error::{CodecError, ErrorCode};
    pub use crate::keys::{hash_size, key_size, Address, CurveId, HashAlgoId, PublicKey};
    pub use crate::transaction::{
        CrossValidationStamp, Inconsistency, LedgerOperations, LedgerTransfer, NodeMovement,
        Transaction, TransactionData, TransactionLedger, TransactionMovement, TransactionSummary,
        TransactionType, UnspentOutput, ValidationStamp,
    };
}
