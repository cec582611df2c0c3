//! Trivial collaborators for [`archethic_mining::MiningWorker`]'s pluggable
//! validation and malicious-detection hooks. Full pending-transaction content
//! rules and a real misbehavior-reporting pipeline are named collaborators,
//! not core workflow logic, so the node binary ships the simplest
//! implementation that satisfies the trait.

use archethic_mining::{MaliciousDetection, PendingTransactionValidation, ValidationContext};
use archethic_types::transaction::Transaction;
use async_trait::async_trait;

/// Accepts every transaction. A production node would check content rules
/// (fee coverage, script validity, type-specific constraints) here.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysValidTransaction;

#[async_trait]
impl PendingTransactionValidation for AlwaysValidTransaction {
    async fn validate(&self, _transaction: &Transaction) -> Result<(), String> {
        Ok(())
    }
}

/// Logs a consensus failure at `warn` level. A production node would also
/// report the disagreeing nodes to the network's misbehavior tracking.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMaliciousDetection;

#[async_trait]
impl MaliciousDetection for LoggingMaliciousDetection {
    async fn notify(&self, context: &ValidationContext) {
        tracing::warn!(
            target: "mining",
            address = %context.address(),
            "consensus not reached, cross-validators disagree"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archethic_types::keys::{Address, PublicKey};
    use archethic_types::transaction::{Transaction, TransactionData, TransactionType};

    fn sample_tx() -> Transaction {
        Transaction {
            address: Address::new(0, 0, vec![0x01; 32]).unwrap(),
            previous_public_key: PublicKey::new(0, 0, vec![0x02; 32]).unwrap(),
            tx_type: TransactionType::Transfer,
            data: TransactionData::default(),
            previous_signature: vec![],
            origin_signature: vec![],
            validation_stamp: None,
            cross_validation_stamps: vec![],
        }
    }

    #[tokio::test]
    async fn always_valid_accepts_any_transaction() {
        let validator = AlwaysValidTransaction;
        assert!(validator.validate(&sample_tx()).await.is_ok());
    }

    #[tokio::test]
    async fn logging_malicious_detection_does_not_panic() {
        let detection = LoggingMaliciousDetection;
        let context = ValidationContext::new(
            sample_tx(),
            PublicKey::new(0, 0, vec![0x03; 32]).unwrap(),
            vec![],
            vec![],
            vec![],
            Default::default(),
        );
        detection.notify(&context).await;
    }
}
