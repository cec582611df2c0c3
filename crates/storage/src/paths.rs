//! On-disk layout rooted at a node's `db_path`, per the external interface
//! contract: `chains/<hex genesis>`, `<hex subset>-summary`,
//! `<hex genesis>-addresses`, `<hex genesis>-keys`, `<type_name>`.

use archethic_types::keys::Address;
use archethic_types::transaction::TransactionType;
use std::path::{Path, PathBuf};

pub fn chain_file(db_path: &Path, genesis: &Address) -> PathBuf {
    db_path.join("chains").join(hex::encode(genesis.as_bytes()))
}

pub fn subset_index_file(db_path: &Path, subset: u8) -> PathBuf {
    db_path.join(format!("{:02x}-summary", subset))
}

pub fn addresses_file(db_path: &Path, genesis: &Address) -> PathBuf {
    db_path.join(format!("{}-addresses", hex::encode(genesis.as_bytes())))
}

pub fn keys_file(db_path: &Path, genesis: &Address) -> PathBuf {
    db_path.join(format!("{}-keys", hex::encode(genesis.as_bytes())))
}

pub fn type_index_file(db_path: &Path, tx_type: TransactionType) -> PathBuf {
    db_path.join(tx_type.as_file_name())
}

pub fn beacon_summary_file(db_path: &Path, summary_address: &Address) -> PathBuf {
    db_path
        .join("beacon_summary")
        .join(hex::encode(summary_address.as_bytes()))
}
