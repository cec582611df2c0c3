//! In-memory lookup tables and on-disk subset/address/key/type indices for
//! every transaction the node has stored.
//!
//! Mirrors the write-ahead-log discipline used elsewhere in this workspace
//! for durable appends (`BufWriter` + `flush` + `sync_data`), but keyed by
//! subset/genesis rather than by block height, and rebuilt entirely from the
//! subset-index files at startup rather than replayed into a separate store.

use crate::error::StorageError;
use crate::paths;
use archethic_types::codec::{
    decode_chain_addresses_record, decode_chain_keys_record, decode_subset_index_record,
    decode_type_index_record, encode_chain_addresses_record, encode_chain_keys_record,
    encode_subset_index_record, encode_type_index_record,
};
use archethic_types::error::CodecError;
use archethic_types::keys::Address;
use archethic_types::transaction::TransactionType;
use bloomfilter::Bloom;
use dashmap::DashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Expected item count bloom filters are sized for, so `fpp` (0.001) is
/// honored at realistic chain sizes rather than for a literal 256-bit bitmap,
/// which would saturate long before any real subset's transaction count.
const BLOOM_EXPECTED_ITEMS: u32 = 1_000_000;
const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEntry {
    pub genesis_address: Address,
    pub size: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainStats {
    pub total_size: u64,
    pub tx_count: u64,
}

pub struct ChainIndex {
    db_path: PathBuf,
    tx_index: DashMap<Address, TxEntry>,
    chain_stats: DashMap<Address, ChainStats>,
    last_index: DashMap<Address, Address>,
    type_stats: DashMap<TransactionType, u64>,
    bloom_filters: DashMap<u8, Mutex<Bloom<[u8]>>>,
    subset_writers: DashMap<u8, Mutex<BufWriter<File>>>,
    addresses_writers: DashMap<Address, Mutex<BufWriter<File>>>,
    keys_writers: DashMap<Address, Mutex<BufWriter<File>>>,
}

impl ChainIndex {
    /// Opens (creating if absent) the index rooted at `db_path` with the
    /// default false-positive rate, replaying every subset-index and
    /// type-index file to rebuild in-memory state.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_fpp(db_path, BLOOM_FALSE_POSITIVE_RATE)
    }

    /// Like [`Self::open`], but sizes every subset bloom filter for `fpp`
    /// rather than the default false-positive rate.
    pub fn open_with_fpp(db_path: impl AsRef<Path>, fpp: f64) -> Result<Self, StorageError> {
        let db_path = db_path.as_ref().to_path_buf();
        fs::create_dir_all(db_path.join("chains")).map_err(|e| io_err(&db_path, e))?;
        fs::create_dir_all(db_path.join("beacon_summary")).map_err(|e| io_err(&db_path, e))?;

        let index = ChainIndex {
            db_path,
            tx_index: DashMap::new(),
            chain_stats: DashMap::new(),
            last_index: DashMap::new(),
            type_stats: DashMap::new(),
            bloom_filters: DashMap::new(),
            subset_writers: DashMap::new(),
            addresses_writers: DashMap::new(),
            keys_writers: DashMap::new(),
        };

        for subset in 0u16..=255 {
            index.recover_subset(subset as u8, fpp)?;
        }
        for tx_type in TransactionType::all() {
            index.recover_type(*tx_type)?;
        }
        Ok(index)
    }

    fn recover_subset(&self, subset: u8, fpp: f64) -> Result<(), StorageError> {
        let bloom = Bloom::new_for_fp_rate(BLOOM_EXPECTED_ITEMS as usize, fpp);
        self.bloom_filters.insert(subset, Mutex::new(bloom));

        let path = paths::subset_index_file(&self.db_path, subset);
        let Ok(bytes) = fs::read(&path) else {
            return Ok(());
        };

        let mut at = 0usize;
        while at < bytes.len() {
            match decode_subset_index_record(&bytes, at) {
                Ok((record, next)) => {
                    self.apply_recovered_record(&record.current_address, &record.genesis_address, record.size, record.offset, subset);
                    at = next;
                }
                Err(CodecError::Truncated) => {
                    tracing::warn!(
                        target: "storage",
                        subset,
                        offset = at,
                        "truncated trailing subset-index record, stopping recovery scan"
                    );
                    break;
                }
                Err(e) => return Err(StorageError::Decode(e)),
            }
        }
        Ok(())
    }

    fn apply_recovered_record(&self, current: &Address, genesis: &Address, size: u32, offset: u32, subset: u8) {
        self.tx_index.insert(
            current.clone(),
            TxEntry {
                genesis_address: genesis.clone(),
                size,
                offset,
            },
        );
        let mut stats = self.chain_stats.entry(genesis.clone()).or_default();
        stats.total_size += size as u64;
        stats.tx_count += 1;
        self.last_index.insert(genesis.clone(), current.clone());
        if let Some(bloom) = self.bloom_filters.get(&subset) {
            if let Ok(mut b) = bloom.lock() {
                b.set(current.digest());
            }
        }
    }

    fn recover_type(&self, tx_type: TransactionType) -> Result<(), StorageError> {
        let path = paths::type_index_file(&self.db_path, tx_type);
        let Ok(bytes) = fs::read(&path) else {
            return Ok(());
        };
        let mut at = 0usize;
        let mut count = 0u64;
        while at < bytes.len() {
            match decode_type_index_record(&bytes, at) {
                Ok((_, next)) => {
                    count += 1;
                    at = next;
                }
                Err(CodecError::Truncated) => break,
                Err(e) => return Err(StorageError::Decode(e)),
            }
        }
        self.type_stats.insert(tx_type, count);
        Ok(())
    }

    fn resolve_genesis(&self, address: &Address) -> Address {
        match self.tx_index.get(address) {
            Some(entry) => entry.genesis_address.clone(),
            None => address.clone(),
        }
    }

    fn subset_writer(&self, subset: u8) -> Result<(), StorageError> {
        if self.subset_writers.contains_key(&subset) {
            return Ok(());
        }
        let path = paths::subset_index_file(&self.db_path, subset);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        self.subset_writers.insert(subset, Mutex::new(BufWriter::new(file)));
        Ok(())
    }

    /// Appends a subset-index record, updates the bloom filter, `tx_index`
    /// and `chain_stats`. Returns once the subset-index write is durable.
    pub fn add_tx(&self, tx_address: &Address, genesis_address: &Address, size: u32) -> Result<(), StorageError> {
        let prior_total = self
            .chain_stats
            .get(genesis_address)
            .map(|s| s.total_size)
            .unwrap_or(0);
        let offset = u32::try_from(prior_total).map_err(|_| {
            StorageError::StatsOverflow(genesis_address.to_string())
        })?;
        if prior_total + size as u64 > u32::MAX as u64 {
            return Err(StorageError::StatsOverflow(genesis_address.to_string()));
        }

        let subset = tx_address.subset();
        self.subset_writer(subset)?;
        let record = encode_subset_index_record(tx_address, genesis_address, size, offset);
        {
            let entry = self
                .subset_writers
                .get(&subset)
                .expect("subset writer initialized above");
            let mut writer = entry.lock().expect("subset writer mutex poisoned");
            let path = paths::subset_index_file(&self.db_path, subset);
            writer.write_all(&record).map_err(|e| io_err(&path, e))?;
            writer.flush().map_err(|e| io_err(&path, e))?;
            writer.get_ref().sync_data().map_err(|e| io_err(&path, e))?;
        }

        if let Some(bloom) = self.bloom_filters.get(&subset) {
            bloom.lock().expect("bloom filter mutex poisoned").set(tx_address.digest());
        }

        self.tx_index.insert(
            tx_address.clone(),
            TxEntry {
                genesis_address: genesis_address.clone(),
                size,
                offset,
            },
        );
        let mut stats = self.chain_stats.entry(genesis_address.clone()).or_default();
        stats.total_size += size as u64;
        stats.tx_count += 1;
        drop(stats);
        self.last_index.insert(genesis_address.clone(), tx_address.clone());

        Ok(())
    }

    /// Records that a genesis chain has had a transaction of `tx_type` appended,
    /// for `count_transactions_by_type`/`list_addresses_by_type`.
    pub fn add_type_entry(&self, tx_type: TransactionType, address: &Address) -> Result<(), StorageError> {
        let path = paths::type_index_file(&self.db_path, tx_type);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.write_all(&encode_type_index_record(address)).map_err(|e| io_err(&path, e))?;
        file.flush().map_err(|e| io_err(&path, e))?;
        file.sync_data().map_err(|e| io_err(&path, e))?;
        *self.type_stats.entry(tx_type).or_insert(0) += 1;
        Ok(())
    }

    pub fn get_tx_entry(&self, address: &Address) -> Result<TxEntry, StorageError> {
        if let Some(entry) = self.tx_index.get(address) {
            return Ok(entry.clone());
        }
        let subset = address.subset();
        let maybe_positive = self
            .bloom_filters
            .get(&subset)
            .map(|b| b.lock().expect("bloom filter mutex poisoned").check(address.digest()))
            .unwrap_or(false);
        if !maybe_positive {
            return Err(StorageError::NotFound);
        }
        let path = paths::subset_index_file(&self.db_path, subset);
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        let mut at = 0usize;
        while at < bytes.len() {
            match decode_subset_index_record(&bytes, at) {
                Ok((record, next)) => {
                    if &record.current_address == address {
                        return Ok(TxEntry {
                            genesis_address: record.genesis_address,
                            size: record.size,
                            offset: record.offset,
                        });
                    }
                    at = next;
                }
                Err(CodecError::Truncated) => break,
                Err(e) => return Err(StorageError::Decode(e)),
            }
        }
        Err(StorageError::NotFound)
    }

    pub fn transaction_exists(&self, address: &Address) -> bool {
        if self.tx_index.contains_key(address) {
            return true;
        }
        self.bloom_filters
            .get(&address.subset())
            .map(|b| b.lock().expect("bloom filter mutex poisoned").check(address.digest()))
            .unwrap_or(false)
    }

    pub fn chain_size(&self, genesis_address: &Address) -> u64 {
        self.chain_stats.get(genesis_address).map(|s| s.tx_count).unwrap_or(0)
    }

    fn addresses_writer(&self, genesis: &Address) -> Result<(), StorageError> {
        if self.addresses_writers.contains_key(genesis) {
            return Ok(());
        }
        let path = paths::addresses_file(&self.db_path, genesis);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        self.addresses_writers.insert(genesis.clone(), Mutex::new(BufWriter::new(file)));
        Ok(())
    }

    /// Appends a timestamped chain-addresses record, for later temporal
    /// lookups via [`ChainIndex::get_last_chain_address`] with `until`.
    pub fn set_last_chain_address(
        &self,
        previous_address: &Address,
        new_address: &Address,
        timestamp: u32,
    ) -> Result<(), StorageError> {
        let genesis = self.resolve_genesis(previous_address);
        self.addresses_writer(&genesis)?;
        let record = encode_chain_addresses_record(timestamp, new_address);
        let entry = self.addresses_writers.get(&genesis).expect("writer initialized above");
        let mut writer = entry.lock().expect("addresses writer mutex poisoned");
        let path = paths::addresses_file(&self.db_path, &genesis);
        writer.write_all(&record).map_err(|e| io_err(&path, e))?;
        writer.flush().map_err(|e| io_err(&path, e))?;
        writer.get_ref().sync_data().map_err(|e| io_err(&path, e))?;
        drop(writer);
        self.last_index.insert(genesis, new_address.clone());
        Ok(())
    }

    fn read_addresses_records(&self, genesis: &Address) -> Result<Vec<(u32, Address)>, StorageError> {
        let path = paths::addresses_file(&self.db_path, genesis);
        let Ok(bytes) = fs::read(&path) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut at = 0usize;
        while at < bytes.len() {
            match decode_chain_addresses_record(&bytes, at) {
                Ok((record, next)) => {
                    out.push(record);
                    at = next;
                }
                Err(CodecError::Truncated) => break,
                Err(e) => return Err(StorageError::Decode(e)),
            }
        }
        Ok(out)
    }

    /// Resolves `address`'s last known chain address. Without `until`, this is
    /// the chain tip (`last_index`, rebuilt from append order). With `until`,
    /// scans the chain-addresses log for the entry with the greatest timestamp
    /// `<= until`, falling back to `address` itself if none qualifies.
    pub fn get_last_chain_address(&self, address: &Address, until: Option<u32>) -> Result<Address, StorageError> {
        let genesis = self.resolve_genesis(address);
        match until {
            None => {
                if let Some(last) = self.last_index.get(&genesis) {
                    return Ok(last.clone());
                }
                let records = self.read_addresses_records(&genesis)?;
                Ok(records.into_iter().max_by_key(|(ts, _)| *ts).map(|(_, a)| a).unwrap_or_else(|| address.clone()))
            }
            Some(t) => {
                let records = self.read_addresses_records(&genesis)?;
                Ok(records
                    .into_iter()
                    .filter(|(ts, _)| *ts <= t)
                    .max_by_key(|(ts, _)| *ts)
                    .map(|(_, a)| a)
                    .unwrap_or_else(|| address.clone()))
            }
        }
    }

    pub fn get_first_chain_address(&self, address: &Address) -> Address {
        self.resolve_genesis(address)
    }

    fn keys_writer(&self, genesis: &Address) -> Result<(), StorageError> {
        if self.keys_writers.contains_key(genesis) {
            return Ok(());
        }
        let path = paths::keys_file(&self.db_path, genesis);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        self.keys_writers.insert(genesis.clone(), Mutex::new(BufWriter::new(file)));
        Ok(())
    }

    pub fn set_public_key(
        &self,
        genesis_address: &Address,
        public_key: &archethic_types::keys::PublicKey,
        timestamp: u32,
    ) -> Result<(), StorageError> {
        self.keys_writer(genesis_address)?;
        let record = encode_chain_keys_record(timestamp, public_key);
        let entry = self.keys_writers.get(genesis_address).expect("writer initialized above");
        let mut writer = entry.lock().expect("keys writer mutex poisoned");
        let path = paths::keys_file(&self.db_path, genesis_address);
        writer.write_all(&record).map_err(|e| io_err(&path, e))?;
        writer.flush().map_err(|e| io_err(&path, e))?;
        writer.get_ref().sync_data().map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn get_first_public_key(&self, genesis_address: &Address) -> Result<Option<archethic_types::keys::PublicKey>, StorageError> {
        let path = paths::keys_file(&self.db_path, genesis_address);
        let Ok(bytes) = fs::read(&path) else {
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        let (record, _) = decode_chain_keys_record(&bytes, 0)?;
        Ok(Some(record.1))
    }

    pub fn list_addresses_by_type(&self, tx_type: TransactionType) -> Result<Vec<Address>, StorageError> {
        let path = paths::type_index_file(&self.db_path, tx_type);
        let Ok(bytes) = fs::read(&path) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut at = 0usize;
        while at < bytes.len() {
            match decode_type_index_record(&bytes, at) {
                Ok((addr, next)) => {
                    out.push(addr);
                    at = next;
                }
                Err(CodecError::Truncated) => break,
                Err(e) => return Err(StorageError::Decode(e)),
            }
        }
        Ok(out)
    }

    pub fn count_transactions_by_type(&self, tx_type: TransactionType) -> u64 {
        self.type_stats.get(&tx_type).map(|v| *v).unwrap_or(0)
    }

    pub fn list_all_addresses(&self) -> Result<Vec<Address>, StorageError> {
        let mut out = Vec::new();
        for entry in self.chain_stats.iter() {
            let genesis = entry.key().clone();
            out.extend(self.read_addresses_records(&genesis)?.into_iter().map(|(_, a)| a));
        }
        Ok(out)
    }

    /// Creates a beacon summary file exclusively: re-writing an existing
    /// summary address is an error, making writes idempotent from the
    /// caller's point of view.
    pub fn write_beacon_summary(&self, summary_address: &Address, payload: &[u8]) -> Result<(), StorageError> {
        let path = paths::beacon_summary_file(&self.db_path, summary_address);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
        }
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::SummaryAlreadyExists(summary_address.to_string())
                } else {
                    io_err(&path, e)
                }
            })?;
        file.write_all(payload).map_err(|e| io_err(&path, e))?;
        file.flush().map_err(|e| io_err(&path, e))?;
        file.sync_data().map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Reads and decodes the full transaction record for `address` from its
    /// chain file, using the index's recorded offset/size.
    pub fn read_transaction(&self, address: &Address) -> Result<archethic_types::transaction::Transaction, StorageError> {
        let entry = self.get_tx_entry(address)?;
        let path = paths::chain_file(&self.db_path, &entry.genesis_address);
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        let start = entry.offset as usize;
        let (transaction, _) = archethic_types::codec::decode_transaction(&bytes, start)?;
        Ok(transaction)
    }
}

fn io_err(path: impl AsRef<Path>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.as_ref().display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn address(fill: u8) -> Address {
        Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    #[test]
    fn single_append_round_trip() {
        let dir = tempdir().unwrap();
        let index = ChainIndex::open(dir.path()).unwrap();
        let genesis = address(0x00);
        let tx1 = address(0x07);

        index.add_tx(&tx1, &genesis, 200).unwrap();

        let entry = index.get_tx_entry(&tx1).unwrap();
        assert_eq!(entry.genesis_address, genesis);
        assert_eq!(entry.size, 200);
        assert_eq!(entry.offset, 0);
        assert_eq!(index.chain_size(&genesis), 1);

        let subset_path = paths::subset_index_file(dir.path(), tx1.subset());
        let bytes = fs::read(&subset_path).unwrap();
        assert_eq!(bytes.len(), 34 + 34 + 4 + 4);
    }

    fn address_with_subset(subset: u8, salt: u8) -> Address {
        let mut digest = vec![subset; 32];
        digest[31] = salt;
        Address::new(0, 0, digest).unwrap()
    }

    #[test]
    fn recovery_after_crash_ignores_truncated_tail() {
        let dir = tempdir().unwrap();
        let genesis = address(0x00);
        let subset = 0x07u8;
        let tx1 = address_with_subset(subset, 1);
        let tx2 = address_with_subset(subset, 2);
        let tx3 = address_with_subset(subset, 3);

        {
            let index = ChainIndex::open(dir.path()).unwrap();
            index.add_tx(&tx1, &genesis, 100).unwrap();
            index.add_tx(&tx2, &genesis, 50).unwrap();
            index.add_tx(&tx3, &genesis, 75).unwrap();
        }

        let path = paths::subset_index_file(dir.path(), subset);
        let mut bytes = fs::read(&path).unwrap();
        bytes.pop();
        fs::write(&path, &bytes).unwrap();

        let index = ChainIndex::open(dir.path()).unwrap();
        assert_eq!(index.chain_size(&genesis), 2);
        assert!(index.get_tx_entry(&tx1).is_ok());
        assert!(index.get_tx_entry(&tx2).is_ok());
        assert!(index.get_tx_entry(&tx3).is_err());

        let tx4 = address_with_subset(subset, 4);
        index.add_tx(&tx4, &genesis, 60).unwrap();
        assert_eq!(index.get_tx_entry(&tx4).unwrap().offset, 150);
    }

    #[test]
    fn last_chain_address_temporal_query() {
        let dir = tempdir().unwrap();
        let index = ChainIndex::open(dir.path()).unwrap();
        let genesis = address(0x00);
        let a1 = address(1);
        let a2 = address(2);
        let a3 = address(3);

        index.set_last_chain_address(&genesis, &a1, 100).unwrap();
        index.set_last_chain_address(&genesis, &a2, 200).unwrap();
        index.set_last_chain_address(&genesis, &a3, 300).unwrap();

        assert_eq!(index.get_last_chain_address(&genesis, Some(250)).unwrap(), a2);
        assert_eq!(index.get_last_chain_address(&genesis, Some(300)).unwrap(), a3);
        assert_eq!(index.get_last_chain_address(&genesis, Some(50)).unwrap(), genesis);
    }

    #[test]
    fn read_transaction_round_trips_through_a_chain_writer() {
        use crate::chain_writer::ChainWriter;
        use archethic_types::transaction::{Transaction, TransactionData, TransactionType};
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let index = Arc::new(ChainIndex::open(dir.path()).unwrap());
        let genesis = address(0x00);
        let tx = Transaction {
            address: address(0x07),
            previous_public_key: archethic_types::keys::PublicKey::new(0, 0, vec![0xAB; 32]).unwrap(),
            tx_type: TransactionType::Transfer,
            data: TransactionData::default(),
            previous_signature: vec![1, 2, 3],
            origin_signature: vec![4, 5, 6],
            validation_stamp: None,
            cross_validation_stamps: vec![],
        };

        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let writer = ChainWriter::spawn(index.clone(), Some(2));
                writer
                    .append_transaction(genesis.clone(), genesis.clone(), 1_700_000_000, tx.clone())
                    .await
                    .unwrap();
                writer.shutdown().await;
            });

        let read_back = index.read_transaction(&tx.address).unwrap();
        assert_eq!(read_back, tx);
    }

    #[test]
    fn transaction_exists_is_true_after_add_and_false_for_unknown() {
        let dir = tempdir().unwrap();
        let index = ChainIndex::open(dir.path()).unwrap();
        let genesis = address(0x00);
        let tx1 = address(0x07);
        index.add_tx(&tx1, &genesis, 10).unwrap();
        assert!(index.transaction_exists(&tx1));
        assert!(!index.transaction_exists(&address(0xEE)));
    }
}
