//! Distributed mining workflow: per-transaction coordinator/cross-validator
//! state machine, context accumulation, chain-storage replication, and the
//! process-wide registry routing incoming protocol messages to the worker
//! handling each address.

pub mod context;
pub mod error;
pub mod fetcher;
pub mod registry;
pub mod replication;
pub mod worker;

pub use context::{ReplicationTree, StorageQuorum, ValidationContext};
pub use error::MiningError;
pub use fetcher::{FetchedContext, TransactionContextFetcher};
pub use registry::WorkflowRegistry;
pub use replication::ReplicationDriver;
pub use worker::{MaliciousDetection, MiningWorker, MiningWorkerConfig, PendingTransactionValidation};
