//! Wires chain storage, election and the distributed mining workflow into a
//! runnable node: one [`Node`] owns an identity, an embedded chain index and
//! writer, a transport mailbox, and the workflow registry that routes
//! incoming protocol messages to the worker handling each address.

pub mod config;
pub mod stubs;

use archethic_crypto::{Crypto, Keypair};
use archethic_election::{Election, NodeCandidate};
use archethic_mining::{
    MaliciousDetection, MiningWorker, MiningWorkerConfig, PendingTransactionValidation,
    TransactionContextFetcher, ValidationContext, WorkflowRegistry,
};
use archethic_networking::{LocalP2P, Message, P2P};
use archethic_storage::{ChainIndex, ChainWriter};
use archethic_types::keys::PublicKey;
use archethic_types::transaction::Transaction;
use config::NodeConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub use stubs::{AlwaysValidTransaction, LoggingMaliciousDetection};

/// A single node instance. Multiple `Node`s sharing the same [`LocalP2P`]
/// transport simulate a small network in-process, matching the way the
/// mining workflow's own integration tests wire a coordinator, a
/// cross-validator and a storage replica together.
pub struct Node {
    config: NodeConfig,
    local_keypair: Arc<Keypair>,
    crypto: Arc<dyn Crypto>,
    election: Arc<dyn Election>,
    transport: Arc<LocalP2P>,
    index: Arc<ChainIndex>,
    writer: Arc<ChainWriter>,
    registry: Arc<WorkflowRegistry>,
    validator: Arc<dyn PendingTransactionValidation>,
    malicious_detection: Arc<dyn MaliciousDetection>,
}

impl Node {
    /// Opens the chain index at `config.db_path`, spawns the writer pool,
    /// registers this node's own mailbox on `transport`, and starts the
    /// background task that demultiplexes incoming messages between
    /// per-transaction mining workers and the chain-storage replica path.
    pub fn start(
        config: NodeConfig,
        local_keypair: Keypair,
        crypto: Arc<dyn Crypto>,
        election: Arc<dyn Election>,
        transport: Arc<LocalP2P>,
    ) -> anyhow::Result<Arc<Self>> {
        let index = Arc::new(ChainIndex::open_with_fpp(&config.db_path, config.bloom_fpp)?);
        let writer = Arc::new(ChainWriter::spawn(index.clone(), Some(config.writer_pool_size)));
        let local_keypair = Arc::new(local_keypair);
        let mailbox = transport.register(local_keypair.public_key().clone(), 1024);

        let node = Arc::new(Self {
            config,
            local_keypair,
            crypto,
            election,
            transport,
            index,
            writer,
            registry: Arc::new(WorkflowRegistry::new()),
            validator: Arc::new(AlwaysValidTransaction),
            malicious_detection: Arc::new(LoggingMaliciousDetection),
        });

        let listener_node = node.clone();
        tokio::spawn(async move { listener_node.run_listener(mailbox).await });

        tracing::info!(target: "node", node = %node.local_keypair.public_key(), "started");
        Ok(node)
    }

    pub fn public_key(&self) -> &PublicKey {
        self.local_keypair.public_key()
    }

    /// Drains this node's transport mailbox forever, routing per-transaction
    /// mining messages to the [`WorkflowRegistry`] and replication requests
    /// to the chain-storage replica path directly (storage replicas never
    /// spawn a [`MiningWorker`] for a transaction they only hold a copy of).
    async fn run_listener(self: Arc<Self>, mut mailbox: tokio::sync::mpsc::Receiver<Message>) {
        while let Some(message) = mailbox.recv().await {
            match message {
                Message::ReplicateTransactionChain { transaction, from }
                | Message::ReplicateTransaction { transaction, from } => {
                    let node = self.clone();
                    tokio::spawn(async move { node.accept_replication(transaction, from).await });
                }
                Message::ReplicationAttestation { summary, from, .. } => {
                    tracing::info!(
                        target: "node",
                        address = %summary.address,
                        from = %from,
                        "received replication attestation"
                    );
                }
                other => self.registry.dispatch(other).await,
            }
        }
    }

    async fn accept_replication(&self, transaction: Transaction, coordinator: PublicKey) {
        archethic_mining::replication::handle_incoming_replication(
            self.index.clone(),
            self.writer.clone(),
            self.crypto.as_ref(),
            &self.local_keypair,
            self.transport.as_ref(),
            transaction,
            coordinator,
        )
        .await;
    }

    /// Runs election for `transaction` against `candidates` and, if this
    /// node's own key falls within the resulting validation committee,
    /// spawns a [`MiningWorker`] to drive it. Returns `None` when this node
    /// has no role to play for this transaction (it may still end up acting
    /// as a chain-storage or beacon-storage replica, handled passively by
    /// [`Node::run_listener`] once the coordinator broadcasts replication).
    pub async fn submit_transaction(
        self: &Arc<Self>,
        transaction: Transaction,
        candidates: &[NodeCandidate],
        validation_committee_size: usize,
        chain_storage_pool_size: usize,
        beacon_storage_pool_size: usize,
        timestamp: u64,
    ) -> Option<JoinHandle<ValidationContext>> {
        let address = transaction.address.clone();
        let election_seed = self.election.election_seed(&address, timestamp).ok()?;
        let validation_nodes: Vec<PublicKey> = self
            .election
            .validation_nodes(&address, timestamp, candidates, validation_committee_size)
            .ok()?
            .into_iter()
            .map(|c| c.public_key)
            .collect();

        if !validation_nodes.contains(self.local_keypair.public_key()) {
            return None;
        }

        let chain_storage_nodes: Vec<PublicKey> = self
            .election
            .chain_storage_nodes(&address, timestamp, transaction.tx_type, candidates, chain_storage_pool_size)
            .ok()?
            .into_iter()
            .map(|c| c.public_key)
            .collect();
        let beacon_storage_nodes: Vec<PublicKey> = self
            .election
            .beacon_storage_nodes(address.subset(), timestamp, candidates, beacon_storage_pool_size)
            .ok()?
            .into_iter()
            .map(|c| c.public_key)
            .collect();

        let welcome_node = self.local_keypair.public_key().clone();
        let (mailbox_tx, mailbox) = tokio::sync::mpsc::channel(256);
        self.registry.register(address.clone(), mailbox_tx);

        let worker_config = MiningWorkerConfig {
            known_origin_keys: Vec::new(),
            global_mining_timeout: Duration::from_millis(self.config.global_mining_timeout_ms),
            wait_confirmations_margin: Duration::from_millis(self.config.cross_validator_rtt_margin_ms),
            replication_deadline: Duration::from_millis(self.config.replication_deadline_ms),
            storage_quorum: self.config.storage_quorum(),
        };
        let fetcher = TransactionContextFetcher::new(self.index.clone(), Duration::from_millis(500));
        let worker = MiningWorker::new(
            self.local_keypair.clone(),
            worker_config,
            self.crypto.clone(),
            self.transport.clone() as Arc<dyn P2P>,
            fetcher,
            self.validator.clone(),
            self.malicious_detection.clone(),
            mailbox,
        );

        let registry = self.registry.clone();
        Some(tokio::spawn(async move {
            let context = worker
                .run(
                    transaction,
                    welcome_node,
                    validation_nodes,
                    chain_storage_nodes,
                    beacon_storage_nodes,
                    election_seed,
                    timestamp,
                )
                .await;
            registry.unregister(context.address());
            context
        }))
    }
}

