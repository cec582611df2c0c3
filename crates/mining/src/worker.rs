//! Per-transaction mining state machine. One `MiningWorker` is spawned per
//! elected validator per transaction; it drives the coordinator/cross-validator
//! roles to completion (successful replication, consensus failure, or
//! timeout), exchanging messages through its own mailbox (registered in a
//! [`crate::registry::WorkflowRegistry`]) rather than a shared lock.

use crate::context::{ReplicationTree, StorageQuorum, ValidationContext};
use crate::replication::{verify_storage_signature, ReplicationDriver};
use archethic_crypto::{Crypto, Keypair};
use archethic_networking::{Message, P2P};
use archethic_types::keys::PublicKey;
use archethic_types::transaction::{
    CrossValidationStamp, Inconsistency, Transaction, TransactionMovement,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[async_trait]
pub trait PendingTransactionValidation: Send + Sync {
    async fn validate(&self, transaction: &Transaction) -> Result<(), String>;
}

#[async_trait]
pub trait MaliciousDetection: Send + Sync {
    async fn notify(&self, context: &ValidationContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Coordinator,
    CrossValidator,
    WaitCrossValidationStamps,
    Replication,
    ConsensusNotReached,
    Stop,
}

#[derive(Debug, Clone)]
pub struct MiningWorkerConfig {
    pub known_origin_keys: Vec<PublicKey>,
    pub global_mining_timeout: Duration,
    pub wait_confirmations_margin: Duration,
    pub replication_deadline: Duration,
    pub storage_quorum: StorageQuorum,
}

impl Default for MiningWorkerConfig {
    fn default() -> Self {
        Self {
            known_origin_keys: Vec::new(),
            global_mining_timeout: Duration::from_secs(5),
            wait_confirmations_margin: Duration::from_millis(500),
            replication_deadline: Duration::from_secs(3),
            storage_quorum: StorageQuorum::default(),
        }
    }
}

pub struct MiningWorker {
    local_keypair: Arc<Keypair>,
    config: MiningWorkerConfig,
    crypto: Arc<dyn Crypto>,
    p2p: Arc<dyn P2P>,
    fetcher: crate::fetcher::TransactionContextFetcher,
    validator: Arc<dyn PendingTransactionValidation>,
    malicious_detection: Arc<dyn MaliciousDetection>,
    mailbox: mpsc::Receiver<Message>,
    /// The election seed and mining timestamp agreed on when this node was
    /// elected, carried for the lifetime of one `run()` so message handlers
    /// can build a validation stamp without re-threading them everywhere.
    election_seed: Vec<u8>,
    mining_timestamp: u64,
    /// Only the coordinator drives replication and collects storage quorum;
    /// cross-validators stop once consensus is locally confirmed.
    is_coordinator: bool,
}

impl MiningWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_keypair: Arc<Keypair>,
        config: MiningWorkerConfig,
        crypto: Arc<dyn Crypto>,
        p2p: Arc<dyn P2P>,
        fetcher: crate::fetcher::TransactionContextFetcher,
        validator: Arc<dyn PendingTransactionValidation>,
        malicious_detection: Arc<dyn MaliciousDetection>,
        mailbox: mpsc::Receiver<Message>,
    ) -> Self {
        Self {
            local_keypair,
            config,
            crypto,
            p2p,
            fetcher,
            validator,
            malicious_detection,
            mailbox,
            election_seed: Vec::new(),
            mining_timestamp: 0,
            is_coordinator: false,
        }
    }

    /// Runs the workflow for one transaction to completion, returning the
    /// final context (mostly useful for tests; production callers care about
    /// the side effects: messages sent and, for chain-storage nodes, the
    /// persisted transaction).
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        mut self,
        transaction: Transaction,
        welcome_node: PublicKey,
        validation_nodes: Vec<PublicKey>,
        chain_storage_nodes: Vec<PublicKey>,
        beacon_storage_nodes: Vec<PublicKey>,
        election_seed: Vec<u8>,
        mining_timestamp: u64,
    ) -> ValidationContext {
        self.election_seed = election_seed;
        self.mining_timestamp = mining_timestamp;
        let address = transaction.address.clone();
        let local_public_key = self.local_keypair.public_key().clone();
        self.is_coordinator = validation_nodes.first() == Some(&local_public_key);

        let mut context = ValidationContext::new(
            transaction.clone(),
            welcome_node,
            validation_nodes.clone(),
            chain_storage_nodes,
            beacon_storage_nodes,
            self.config.storage_quorum,
        );

        if let Err(reason) = self.validator.validate(&transaction).await {
            tracing::warn!(target: "mining", %address, reason, "pending transaction failed local validation, worker stopping");
            return context;
        }

        let global_deadline = Instant::now() + self.config.global_mining_timeout;
        let is_coordinator = self.is_coordinator;

        let fetch_started = Instant::now();
        let fetched = self.fetcher.fetch(&transaction).await;
        let fetch_duration = fetch_started.elapsed();
        context.previous_tx = fetched.previous_tx;
        context.unspent_outputs = fetched.unspent_outputs;

        let mut state;
        let mut wait_confirmations_deadline: Option<Instant> = None;
        let mut postponed: Vec<Message> = Vec::new();

        if is_coordinator {
            state = WorkerState::Coordinator;
            let cross_validator_count = context.cross_validators().len().max(1) as u32;
            let budget = fetch_duration + self.config.wait_confirmations_margin;
            wait_confirmations_deadline = Some(Instant::now() + budget * cross_validator_count);
        } else {
            state = WorkerState::CrossValidator;
            if let Some(coordinator) = context.coordinator().cloned() {
                let message = Message::AddMiningContext {
                    transaction: transaction.clone(),
                    validation_nodes: validation_nodes.clone(),
                    previous_storage_nodes: context.chain_storage_nodes.clone(),
                    chain_storage_view: fetched.chain_storage_view.clone(),
                    beacon_storage_view: fetched.beacon_storage_view.clone(),
                    from: local_public_key.clone(),
                };
                if let Err(e) = self.p2p.send_message(&coordinator, message).await {
                    tracing::warn!(target: "mining", %address, error = %e, "failed to notify coordinator of mining context");
                }
            }
        }

        loop {
            if matches!(state, WorkerState::Stop | WorkerState::ConsensusNotReached) {
                break;
            }

            let wait_sleep = sleep_until_opt(wait_confirmations_deadline);

            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(global_deadline) => {
                    tracing::warn!(target: "mining", %address, "global mining timeout elapsed, stopping");
                    state = WorkerState::Stop;
                }

                _ = wait_sleep, if wait_confirmations_deadline.is_some() => {
                    wait_confirmations_deadline = None;
                    if matches!(state, WorkerState::Coordinator) {
                        let (next_state, next_context) = self
                            .create_and_notify_validation_stamp(context, &local_public_key)
                            .await;
                        state = next_state;
                        context = next_context;
                        let (s, c, p) = self.redeliver(state, context, postponed, &local_public_key).await;
                        state = s;
                        context = c;
                        postponed = p;
                    }
                }

                maybe_message = self.mailbox.recv() => {
                    match maybe_message {
                        Some(message) => {
                            let (next_state, next_context) = self
                                .handle_message(state, context, message, &local_public_key, &mut postponed)
                                .await;
                            state = next_state;
                            context = next_context;
                            let (s, c, p) = self.redeliver(state, context, postponed, &local_public_key).await;
                            state = s;
                            context = c;
                            postponed = p;
                        }
                        None => {
                            state = WorkerState::Stop;
                        }
                    }
                }
            }
        }

        if matches!(state, WorkerState::ConsensusNotReached) {
            self.malicious_detection.notify(&context).await;
        }

        context
    }

    async fn redeliver(
        &mut self,
        mut state: WorkerState,
        mut context: ValidationContext,
        postponed: Vec<Message>,
        local: &PublicKey,
    ) -> (WorkerState, ValidationContext, Vec<Message>) {
        let mut pending = postponed;
        loop {
            if pending.is_empty() || matches!(state, WorkerState::Stop | WorkerState::ConsensusNotReached) {
                break;
            }
            let before = pending.len();
            let mut next = Vec::new();
            for message in pending {
                let (next_state, next_context) = self.handle_message(state, context, message, local, &mut next).await;
                state = next_state;
                context = next_context;
            }
            pending = next;
            if pending.len() >= before {
                break;
            }
        }
        (state, context, pending)
    }

    async fn handle_message(
        &mut self,
        state: WorkerState,
        context: ValidationContext,
        message: Message,
        local: &PublicKey,
        postponed: &mut Vec<Message>,
    ) -> (WorkerState, ValidationContext) {
        match message {
            Message::AddMiningContext {
                chain_storage_view,
                beacon_storage_view,
                from,
                ..
            } => {
                if state != WorkerState::Coordinator {
                    postponed.push(Message::AddMiningContext {
                        transaction: context.transaction.clone(),
                        validation_nodes: context.validation_nodes.clone(),
                        previous_storage_nodes: Vec::new(),
                        chain_storage_view,
                        beacon_storage_view,
                        from,
                    });
                    return (state, context);
                }
                let context = context.add_mining_context(&from, None, Vec::new(), chain_storage_view, beacon_storage_view);
                if context.enough_confirmations() {
                    self.create_and_notify_validation_stamp(context, local).await
                } else {
                    (state, context)
                }
            }

            Message::CrossValidate {
                address,
                validation_stamp,
                chain_replication_nodes,
                beacon_replication_nodes,
                io_replication_nodes,
                confirmed_cross_validators,
                from,
            } => {
                if state != WorkerState::CrossValidator {
                    postponed.push(Message::CrossValidate {
                        address,
                        validation_stamp,
                        chain_replication_nodes,
                        beacon_replication_nodes,
                        io_replication_nodes,
                        confirmed_cross_validators,
                        from,
                    });
                    return (state, context);
                }

                let own_stamp = self.compute_cross_validation_stamp(&context, &validation_stamp, local);
                let mut context = context;
                context.validation_stamp = Some(validation_stamp);
                context.replication_tree = ReplicationTree {
                    chain_nodes: chain_replication_nodes,
                    beacon_nodes: beacon_replication_nodes,
                    io_nodes: io_replication_nodes,
                };
                let context = context.cross_validate(own_stamp.clone());

                let mut targets: Vec<PublicKey> = confirmed_cross_validators
                    .iter()
                    .filter(|k| *k != local)
                    .cloned()
                    .collect();
                if let Some(coordinator) = context.coordinator() {
                    if coordinator != local && !targets.contains(coordinator) {
                        targets.push(coordinator.clone());
                    }
                }
                let done = Message::CrossValidationDone {
                    address: context.address().clone(),
                    stamp: own_stamp,
                    from: local.clone(),
                };
                if let Err(e) = self.p2p.broadcast_message(&targets, done).await {
                    tracing::warn!(target: "mining", address = %context.address(), error = %e, "failed to notify peers of cross-validation stamp");
                }

                if confirmed_cross_validators.len() == 1 && context.atomic_commitment() {
                    self.finish_consensus(context, local).await
                } else {
                    (WorkerState::WaitCrossValidationStamps, context)
                }
            }

            Message::CrossValidationDone { address: _, stamp, from: _ } => {
                if state != WorkerState::WaitCrossValidationStamps {
                    postponed.push(Message::CrossValidationDone {
                        address: context.address().clone(),
                        stamp,
                        from: local.clone(),
                    });
                    return (state, context);
                }
                let context = context.cross_validate(stamp);
                if context.enough_cross_validation_stamps() {
                    if context.atomic_commitment() {
                        self.finish_consensus(context, local).await
                    } else {
                        (WorkerState::ConsensusNotReached, context)
                    }
                } else {
                    (WorkerState::WaitCrossValidationStamps, context)
                }
            }

            Message::AcknowledgeStorage { summary, signature, from } => {
                if state != WorkerState::Replication {
                    postponed.push(Message::AcknowledgeStorage { summary, signature, from });
                    return (state, context);
                }
                if !verify_storage_signature(&*self.crypto, &summary, &from, &signature) {
                    tracing::warn!(target: "mining", node = %from, "rejected storage acknowledgement with invalid signature");
                    return (state, context);
                }
                let context = context.add_storage_confirmation(from, signature);
                if context.enough_storage_confirmations() {
                    let driver = ReplicationDriver::new(self.p2p.clone(), self.config.replication_deadline);
                    driver
                        .notify_attestation(
                            &context.welcome_node,
                            &context.beacon_storage_nodes,
                            &context.replication_tree.io_nodes,
                            summary,
                            context.storage_nodes_confirmations.clone(),
                            context.transaction.clone(),
                            local.clone(),
                        )
                        .await;
                    (WorkerState::Stop, context)
                } else {
                    (WorkerState::Replication, context)
                }
            }

            Message::Error { address, reason, from } => {
                if state != WorkerState::Replication {
                    postponed.push(Message::Error { address, reason, from });
                    return (state, context);
                }
                tracing::debug!(target: "mining", node = %from, reason, "peer reported an error, treating as a missing response");
                (state, context)
            }

            other => {
                tracing::debug!(target: "mining", address = %other.address(), "ignoring message not handled by this worker role");
                (state, context)
            }
        }
    }

    async fn create_and_notify_validation_stamp(
        &self,
        context: ValidationContext,
        local: &PublicKey,
    ) -> (WorkerState, ValidationContext) {
        let address = context.address().clone();
        if context.confirmed_cross_validators().is_empty() {
            tracing::info!(target: "mining", %address, "no cross-validator responded in time, stopping");
            return (WorkerState::Stop, context);
        }

        let context = match context.clone().create_validation_stamp(
            &*self.crypto,
            &self.local_keypair,
            &self.config.known_origin_keys,
            self.election_seed.clone(),
            self.mining_timestamp,
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(target: "mining", %address, error = %e, "failed to build validation stamp, stopping");
                return (WorkerState::Stop, context);
            }
        };
        let context = context.create_replication_tree();

        let stamp = context.validation_stamp.clone().expect("just created above");
        let confirmed = context.confirmed_cross_validators();
        let message = Message::CrossValidate {
            address: address.clone(),
            validation_stamp: stamp,
            chain_replication_nodes: context.replication_tree.chain_nodes.clone(),
            beacon_replication_nodes: context.replication_tree.beacon_nodes.clone(),
            io_replication_nodes: context.replication_tree.io_nodes.clone(),
            confirmed_cross_validators: confirmed.clone(),
            from: local.clone(),
        };
        if let Err(e) = self.p2p.broadcast_message(&confirmed, message).await {
            tracing::warn!(target: "mining", %address, error = %e, "failed to broadcast cross-validate request to every confirmed cross-validator");
        }

        (WorkerState::WaitCrossValidationStamps, context)
    }

    /// Consensus was locally confirmed (atomic commitment reached). Only the
    /// coordinator drives replication and collects the storage quorum; a
    /// cross-validator's job ends here.
    async fn finish_consensus(&mut self, context: ValidationContext, local: &PublicKey) -> (WorkerState, ValidationContext) {
        if self.is_coordinator {
            self.enter_replication(context, local).await
        } else {
            (WorkerState::Stop, context)
        }
    }

    async fn enter_replication(&mut self, context: ValidationContext, local: &PublicKey) -> (WorkerState, ValidationContext) {
        let driver = ReplicationDriver::new(self.p2p.clone(), self.config.replication_deadline);
        let unreachable = driver
            .broadcast_chain_replication(&context.chain_storage_nodes, context.transaction.clone(), local.clone())
            .await;
        if !unreachable.is_empty() {
            tracing::warn!(target: "mining", address = %context.address(), count = unreachable.len(), "some chain-storage replicas were unreachable at replication time");
        }
        (WorkerState::Replication, context)
    }

    fn compute_cross_validation_stamp(
        &self,
        context: &ValidationContext,
        stamp: &archethic_types::transaction::ValidationStamp,
        local: &PublicKey,
    ) -> CrossValidationStamp {
        let mut inconsistencies = Vec::new();

        let expected_movements: Vec<TransactionMovement> = context
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
        if stamp.ledger_operations.transaction_movements != expected_movements {
            inconsistencies.push(Inconsistency::TransactionMovements);
        }

        if !self
            .config
            .known_origin_keys
            .iter()
            .any(|k| k == &stamp.proof_of_work)
        {
            inconsistencies.push(Inconsistency::ProofOfWork);
        }

        let mut to_sign = stamp.signed_payload();
        for inconsistency in &inconsistencies {
            to_sign.push(inconsistency.id());
        }
        let signature = self.crypto.sign(&self.local_keypair, &to_sign).unwrap_or_default();

        CrossValidationStamp {
            node_public_key: local.clone(),
            signature,
            inconsistencies,
        }
    }
}

fn sleep_until_opt(deadline: Option<Instant>) -> impl std::future::Future<Output = ()> {
    async move {
        match deadline {
            Some(d) => tokio::time::sleep_until(d).await,
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StorageQuorum;
    use crate::fetcher::TransactionContextFetcher;
    use crate::replication::handle_incoming_replication;
    use archethic_crypto::DefaultCrypto;
    use archethic_networking::LocalP2P;
    use archethic_storage::{ChainIndex, ChainWriter};
    use archethic_types::keys::{Address, CurveId};
    use archethic_types::transaction::{TransactionData, TransactionType};
    use std::sync::Arc;

    struct AlwaysValid;

    #[async_trait]
    impl PendingTransactionValidation for AlwaysValid {
        async fn validate(&self, _transaction: &Transaction) -> Result<(), String> {
            Ok(())
        }
    }

    struct NoOpMaliciousDetection;

    #[async_trait]
    impl MaliciousDetection for NoOpMaliciousDetection {
        async fn notify(&self, _context: &ValidationContext) {}
    }

    fn address(fill: u8) -> Address {
        Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn sample_tx(addr: Address, origin_signature: Vec<u8>) -> Transaction {
        Transaction {
            address: addr,
            previous_public_key: archethic_types::keys::PublicKey::new(0, 0, vec![0xAB; 32]).unwrap(),
            tx_type: TransactionType::Transfer,
            data: TransactionData::default(),
            previous_signature: vec![1, 2, 3],
            origin_signature,
            validation_stamp: None,
            cross_validation_stamps: vec![],
        }
    }

    fn default_config() -> MiningWorkerConfig {
        MiningWorkerConfig {
            known_origin_keys: vec![],
            global_mining_timeout: Duration::from_secs(2),
            wait_confirmations_margin: Duration::from_millis(20),
            replication_deadline: Duration::from_millis(200),
            storage_quorum: StorageQuorum::All,
        }
    }

    #[tokio::test]
    async fn slow_cross_validator_causes_coordinator_to_stop_without_replication() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(ChainIndex::open(dir.path()).unwrap());
        let transport = Arc::new(LocalP2P::new());
        let crypto = DefaultCrypto;

        let coordinator_keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let cross_validator_keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let welcome_node = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap().public_key().clone();
        let validation_nodes = vec![
            coordinator_keypair.public_key().clone(),
            cross_validator_keypair.public_key().clone(),
        ];

        let coordinator_mailbox = transport.register(coordinator_keypair.public_key().clone(), 16);
        let fetcher = TransactionContextFetcher::new(index.clone(), Duration::from_millis(50));
        let worker = MiningWorker::new(
            Arc::new(coordinator_keypair),
            default_config(),
            Arc::new(DefaultCrypto),
            transport.clone(),
            fetcher,
            Arc::new(AlwaysValid),
            Arc::new(NoOpMaliciousDetection),
            coordinator_mailbox,
        );

        let tx = sample_tx(address(0x07), vec![]);
        let context = worker
            .run(tx, welcome_node, validation_nodes, vec![], vec![], vec![0xAA], 1_700_000_000)
            .await;

        assert!(context.validation_stamp.is_none());
        assert!(!context.enough_confirmations());
    }

    /// Scenario: coordinator plus one responsive cross-validator, one
    /// chain-storage replica. Drives the full workflow end to end: context
    /// exchange, validation stamp, cross-validation, replication, storage
    /// acknowledgement and attestation.
    #[tokio::test]
    async fn coordinator_reaches_replication_once_cross_validator_and_storage_confirm() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(ChainIndex::open(dir.path()).unwrap());
        let writer = Arc::new(ChainWriter::spawn(index.clone(), Some(2)));
        let transport = Arc::new(LocalP2P::new());
        let crypto = DefaultCrypto;

        let origin_keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let coordinator_keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let cross_validator_keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let storage_keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let welcome_node = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap().public_key().clone();

        let validation_nodes = vec![
            coordinator_keypair.public_key().clone(),
            cross_validator_keypair.public_key().clone(),
        ];
        let chain_storage_nodes = vec![storage_keypair.public_key().clone()];

        let coordinator_mailbox = transport.register(coordinator_keypair.public_key().clone(), 16);
        let cross_validator_mailbox = transport.register(cross_validator_keypair.public_key().clone(), 16);
        let mut storage_mailbox = transport.register(storage_keypair.public_key().clone(), 16);
        transport.register(welcome_node.clone(), 4);

        let mut tx = sample_tx(address(0x07), vec![]);
        tx.origin_signature = crypto.sign(&origin_keypair, &tx.origin_signed_payload()).unwrap();
        let known_origin_keys = vec![origin_keypair.public_key().clone()];

        let coordinator = MiningWorker::new(
            Arc::new(coordinator_keypair),
            MiningWorkerConfig { known_origin_keys: known_origin_keys.clone(), ..default_config() },
            Arc::new(DefaultCrypto),
            transport.clone(),
            TransactionContextFetcher::new(index.clone(), Duration::from_millis(50)),
            Arc::new(AlwaysValid),
            Arc::new(NoOpMaliciousDetection),
            coordinator_mailbox,
        );
        let cross_validator = MiningWorker::new(
            Arc::new(cross_validator_keypair),
            MiningWorkerConfig { known_origin_keys, ..default_config() },
            Arc::new(DefaultCrypto),
            transport.clone(),
            TransactionContextFetcher::new(index.clone(), Duration::from_millis(50)),
            Arc::new(AlwaysValid),
            Arc::new(NoOpMaliciousDetection),
            cross_validator_mailbox,
        );

        let storage_task = tokio::spawn(async move {
            if let Some(Message::ReplicateTransactionChain { transaction, from }) = storage_mailbox.recv().await {
                handle_incoming_replication(index, writer, &DefaultCrypto, &storage_keypair, transport.as_ref(), transaction, from).await;
            }
        });

        let coordinator_task = tokio::spawn(coordinator.run(
            tx.clone(),
            welcome_node.clone(),
            validation_nodes.clone(),
            chain_storage_nodes.clone(),
            vec![],
            vec![0xAA],
            1_700_000_000,
        ));
        let cross_validator_task = tokio::spawn(cross_validator.run(
            tx,
            welcome_node,
            validation_nodes,
            chain_storage_nodes,
            vec![],
            vec![0xAA],
            1_700_000_000,
        ));

        let coordinator_context = coordinator_task.await.unwrap();
        let _ = cross_validator_task.await.unwrap();
        storage_task.await.unwrap();

        assert!(coordinator_context.validation_stamp.is_some());
        assert!(coordinator_context.enough_storage_confirmations());
    }
}
