//! Per-genesis serialized append of transactions to chain files, partitioned
//! across a fixed pool of writer tasks by `hash(genesis) mod P`. A writer's
//! own mailbox is its ordered queue, the same discipline the index's subset
//! writers use for append ordering, scaled out across `P` independent queues
//! so unrelated chains progress in parallel.

use crate::chain_index::ChainIndex;
use crate::error::StorageError;
use crate::paths;
use archethic_types::codec::encode_transaction;
use archethic_types::keys::Address;
use archethic_types::transaction::{Transaction, TransactionType};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const DEFAULT_WRITER_POOL_SIZE: usize = 20;

struct AppendCommand {
    genesis: Address,
    previous_address: Address,
    timestamp: u32,
    transaction: Box<Transaction>,
    reply: oneshot::Sender<Result<(), StorageError>>,
}

/// A pool of `P` writer tasks, each exclusively owning the chain files for the
/// genesis addresses that hash to its partition.
pub struct ChainWriter {
    senders: Vec<mpsc::Sender<AppendCommand>>,
    handles: Vec<JoinHandle<()>>,
}

impl ChainWriter {
    pub fn spawn(index: Arc<ChainIndex>, pool_size: Option<usize>) -> Self {
        let pool_size = pool_size.unwrap_or(DEFAULT_WRITER_POOL_SIZE).max(1);
        let mut senders = Vec::with_capacity(pool_size);
        let mut handles = Vec::with_capacity(pool_size);

        for partition in 0..pool_size {
            let (tx, rx) = mpsc::channel(1024);
            let index = index.clone();
            let handle = tokio::spawn(writer_loop(partition, index, rx));
            senders.push(tx);
            handles.push(handle);
        }

        ChainWriter { senders, handles }
    }

    fn partition_for(&self, genesis: &Address) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        genesis.as_bytes().hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }

    /// Appends `transaction` (the chain tip) to `genesis`'s chain file, then
    /// updates the index's subset-index and chain-addresses records. Resolves
    /// once the write is durable and the index reflects it.
    pub async fn append_transaction(
        &self,
        genesis: Address,
        previous_address: Address,
        timestamp: u32,
        transaction: Transaction,
    ) -> Result<(), StorageError> {
        let partition = self.partition_for(&genesis);
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = AppendCommand {
            genesis,
            previous_address,
            timestamp,
            transaction: Box::new(transaction),
            reply: reply_tx,
        };
        self.senders[partition]
            .send(command)
            .await
            .map_err(|_| StorageError::Io {
                path: "writer-mailbox".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "writer task gone"),
            })?;
        reply_rx.await.map_err(|_| StorageError::Io {
            path: "writer-mailbox".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "writer task dropped reply"),
        })?
    }

    /// Blocks until every writer task has drained its mailbox and exited, used
    /// by tests and graceful node shutdown.
    pub async fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn writer_loop(_partition: usize, index: Arc<ChainIndex>, mut rx: mpsc::Receiver<AppendCommand>) {
    let mut open_files: HashMap<Address, BufWriter<File>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        let result = handle_append(&index, &mut open_files, &command);
        let _ = command.reply.send(result);
    }
}

fn handle_append(
    index: &Arc<ChainIndex>,
    open_files: &mut HashMap<Address, BufWriter<File>>,
    command: &AppendCommand,
) -> Result<(), StorageError> {
    let path = paths::chain_file(index.db_path(), &command.genesis);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
    }

    if !open_files.contains_key(&command.genesis) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        open_files.insert(command.genesis.clone(), BufWriter::new(file));
    }

    let record = encode_transaction(&command.transaction);
    let size = record.len() as u32;
    {
        let writer = open_files.get_mut(&command.genesis).expect("inserted above");
        writer.write_all(&record).map_err(|e| io_err(&path, e))?;
        writer.flush().map_err(|e| io_err(&path, e))?;
        writer.get_ref().sync_data().map_err(|e| io_err(&path, e))?;
    }

    index.add_tx(&command.transaction.address, &command.genesis, size)?;
    index.set_last_chain_address(&command.previous_address, &command.transaction.address, command.timestamp)?;
    index.add_type_entry(command.transaction.tx_type, &command.transaction.address)?;

    tracing::debug!(
        target: "storage",
        genesis = %command.genesis,
        address = %command.transaction.address,
        size,
        "appended transaction to chain"
    );

    Ok(())
}

fn io_err(path: impl AsRef<std::path::Path>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.as_ref().display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archethic_types::keys::PublicKey;
    use archethic_types::transaction::TransactionData;

    fn address(fill: u8) -> Address {
        Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn sample_tx(addr: Address) -> Transaction {
        Transaction {
            address: addr,
            previous_public_key: PublicKey::new(0, 0, vec![0xAB; 32]).unwrap(),
            tx_type: TransactionType::Transfer,
            data: TransactionData::default(),
            previous_signature: vec![1, 2, 3],
            origin_signature: vec![4, 5, 6],
            validation_stamp: None,
            cross_validation_stamps: vec![],
        }
    }

    #[tokio::test]
    async fn append_transaction_updates_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(ChainIndex::open(dir.path()).unwrap());
        let writer = ChainWriter::spawn(index.clone(), Some(4));

        let genesis = address(0x00);
        let tx = sample_tx(address(0x07));

        writer
            .append_transaction(genesis.clone(), genesis.clone(), 1_700_000_000, tx.clone())
            .await
            .unwrap();

        let entry = index.get_tx_entry(&tx.address).unwrap();
        assert_eq!(entry.genesis_address, genesis);
        assert_eq!(entry.offset, 0);
        assert_eq!(index.chain_size(&genesis), 1);

        writer.shutdown().await;
    }

    #[tokio::test]
    async fn different_genesis_chains_progress_independently() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(ChainIndex::open(dir.path()).unwrap());
        let writer = ChainWriter::spawn(index.clone(), Some(4));

        let genesis_a = address(0x01);
        let genesis_b = address(0x02);

        writer
            .append_transaction(genesis_a.clone(), genesis_a.clone(), 1, sample_tx(address(0x11)))
            .await
            .unwrap();
        writer
            .append_transaction(genesis_b.clone(), genesis_b.clone(), 1, sample_tx(address(0x22)))
            .await
            .unwrap();

        assert_eq!(index.chain_size(&genesis_a), 1);
        assert_eq!(index.chain_size(&genesis_b), 1);

        writer.shutdown().await;
    }
}
