//! Canonical binary encoding for wire messages and on-disk records.
//!
//! All multi-byte integers are big-endian. Variable-length fields (addresses,
//! public keys, opaque byte blobs) are self-describing: a reader never needs an
//! externally-tracked length to know how many bytes to consume next.

use crate::error::CodecError;
use crate::keys::{hash_size, key_size, Address, PublicKey};
use crate::transaction::{
    CrossValidationStamp, Inconsistency, LedgerOperations, LedgerTransfer, NodeMovement,
    Transaction, TransactionData, TransactionLedger, TransactionMovement, TransactionSummary,
    TransactionType, UnspentOutput, ValidationStamp,
};

/// Current on-disk transaction record format tag.
const TX_RECORD_TAG: u8 = 1;
/// Current on-disk transaction record format version.
const TX_RECORD_VERSION: u8 = 1;

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn read_u32(buf: &[u8], at: usize) -> Result<u32, CodecError> {
    let slice = buf.get(at..at + 4).ok_or(CodecError::Truncated)?;
    let mut a = [0u8; 4];
    a.copy_from_slice(slice);
    Ok(u32::from_be_bytes(a))
}

pub fn read_u64(buf: &[u8], at: usize) -> Result<u64, CodecError> {
    let slice = buf.get(at..at + 8).ok_or(CodecError::Truncated)?;
    let mut a = [0u8; 8];
    a.copy_from_slice(slice);
    Ok(u64::from_be_bytes(a))
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn read_bytes(buf: &[u8], at: usize) -> Result<(Vec<u8>, usize), CodecError> {
    let len = read_u32(buf, at)? as usize;
    let start = at + 4;
    let data = buf.get(start..start + len).ok_or(CodecError::Truncated)?;
    Ok((data.to_vec(), start + len))
}

pub fn write_address(out: &mut Vec<u8>, addr: &Address) {
    out.extend_from_slice(addr.as_bytes());
}

/// Reads a self-describing address starting at `at`; returns the address and the
/// offset immediately after it.
pub fn read_address(buf: &[u8], at: usize) -> Result<(Address, usize), CodecError> {
    let header = buf.get(at..at + 2).ok_or(CodecError::Truncated)?;
    let total = 2 + hash_size(header[1])?;
    let raw = buf.get(at..at + total).ok_or(CodecError::Truncated)?;
    Ok((Address::from_bytes(raw.to_vec())?, at + total))
}

pub fn write_public_key(out: &mut Vec<u8>, pk: &PublicKey) {
    out.extend_from_slice(pk.as_bytes());
}

pub fn read_public_key(buf: &[u8], at: usize) -> Result<(PublicKey, usize), CodecError> {
    let header = buf.get(at..at + 2).ok_or(CodecError::Truncated)?;
    let total = 2 + key_size(header[0])?;
    let raw = buf.get(at..at + total).ok_or(CodecError::Truncated)?;
    Ok((PublicKey::from_bytes(raw.to_vec())?, at + total))
}

fn write_opt_address(out: &mut Vec<u8>, addr: &Option<Address>) {
    match addr {
        Some(a) => {
            out.push(1);
            write_address(out, a);
        }
        None => out.push(0),
    }
}

fn read_opt_address(buf: &[u8], at: usize) -> Result<(Option<Address>, usize), CodecError> {
    let flag = *buf.get(at).ok_or(CodecError::Truncated)?;
    if flag == 0 {
        return Ok((None, at + 1));
    }
    let (addr, next) = read_address(buf, at + 1)?;
    Ok((Some(addr), next))
}

fn encode_ledger_transfer(out: &mut Vec<u8>, t: &LedgerTransfer) {
    write_address(out, &t.to);
    write_u64(out, t.amount);
    write_opt_address(out, &t.token_address);
}

fn decode_ledger_transfer(buf: &[u8], at: usize) -> Result<(LedgerTransfer, usize), CodecError> {
    let (to, at) = read_address(buf, at)?;
    let amount = read_u64(buf, at)?;
    let at = at + 8;
    let (token_address, at) = read_opt_address(buf, at)?;
    Ok((
        LedgerTransfer {
            to,
            amount,
            token_address,
        },
        at,
    ))
}

fn encode_data(out: &mut Vec<u8>, data: &TransactionData) {
    write_bytes(out, &data.content);
    match &data.code {
        Some(code) => {
            out.push(1);
            write_bytes(out, code);
        }
        None => out.push(0),
    }
    write_u32(out, data.ledger.transfers.len() as u32);
    for t in &data.ledger.transfers {
        encode_ledger_transfer(out, t);
    }
    write_u32(out, data.ownerships.len() as u32);
    for o in &data.ownerships {
        write_bytes(out, o);
    }
}

fn decode_data(buf: &[u8], at: usize) -> Result<(TransactionData, usize), CodecError> {
    let (content, at) = read_bytes(buf, at)?;
    let flag = *buf.get(at).ok_or(CodecError::Truncated)?;
    let (code, at) = if flag == 1 {
        let (c, at) = read_bytes(buf, at + 1)?;
        (Some(c), at)
    } else {
        (None, at + 1)
    };
    let n = read_u32(buf, at)? as usize;
    let mut at = at + 4;
    let mut transfers = Vec::with_capacity(n);
    for _ in 0..n {
        let (t, next) = decode_ledger_transfer(buf, at)?;
        transfers.push(t);
        at = next;
    }
    let n = read_u32(buf, at)? as usize;
    at += 4;
    let mut ownerships = Vec::with_capacity(n);
    for _ in 0..n {
        let (o, next) = read_bytes(buf, at)?;
        ownerships.push(o);
        at = next;
    }
    Ok((
        TransactionData {
            content,
            code,
            ledger: TransactionLedger { transfers },
            ownerships,
        },
        at,
    ))
}

fn encode_ledger_operations(out: &mut Vec<u8>, ops: &LedgerOperations) {
    write_u64(out, ops.fee);
    write_u32(out, ops.transaction_movements.len() as u32);
    for m in &ops.transaction_movements {
        write_address(out, &m.to);
        write_u64(out, m.amount);
        write_opt_address(out, &m.token_address);
    }
    write_u32(out, ops.unspent_outputs.len() as u32);
    for u in &ops.unspent_outputs {
        write_address(out, &u.from);
        write_u64(out, u.amount);
        write_opt_address(out, &u.token_address);
        write_u64(out, u.timestamp);
    }
    write_u32(out, ops.node_movements.len() as u32);
    for n in &ops.node_movements {
        write_public_key(out, &n.to);
        write_u64(out, n.amount);
    }
}

fn decode_ledger_operations(buf: &[u8], at: usize) -> Result<(LedgerOperations, usize), CodecError> {
    let fee = read_u64(buf, at)?;
    let mut at = at + 8;
    let n = read_u32(buf, at)? as usize;
    at += 4;
    let mut transaction_movements = Vec::with_capacity(n);
    for _ in 0..n {
        let (to, next) = read_address(buf, at)?;
        let amount = read_u64(buf, next)?;
        let (token_address, next) = read_opt_address(buf, next + 8)?;
        transaction_movements.push(TransactionMovement {
            to,
            amount,
            token_address,
        });
        at = next;
    }
    let n = read_u32(buf, at)? as usize;
    at += 4;
    let mut unspent_outputs = Vec::with_capacity(n);
    for _ in 0..n {
        let (from, next) = read_address(buf, at)?;
        let amount = read_u64(buf, next)?;
        let (token_address, next) = read_opt_address(buf, next + 8)?;
        let timestamp = read_u64(buf, next)?;
        unspent_outputs.push(UnspentOutput {
            from,
            amount,
            token_address,
            timestamp,
        });
        at = next + 8;
    }
    let n = read_u32(buf, at)? as usize;
    at += 4;
    let mut node_movements = Vec::with_capacity(n);
    for _ in 0..n {
        let (to, next) = read_public_key(buf, at)?;
        let amount = read_u64(buf, next)?;
        node_movements.push(NodeMovement { to, amount });
        at = next + 8;
    }
    Ok((
        LedgerOperations {
            fee,
            transaction_movements,
            unspent_outputs,
            node_movements,
        },
        at,
    ))
}

fn encode_validation_stamp(out: &mut Vec<u8>, stamp: &ValidationStamp) {
    write_u64(out, stamp.timestamp);
    write_public_key(out, &stamp.proof_of_work);
    write_bytes(out, &stamp.proof_of_integrity);
    write_bytes(out, &stamp.proof_of_election);
    encode_ledger_operations(out, &stamp.ledger_operations);
    write_bytes(out, &stamp.signature);
}

fn decode_validation_stamp(buf: &[u8], at: usize) -> Result<(ValidationStamp, usize), CodecError> {
    let timestamp = read_u64(buf, at)?;
    let (proof_of_work, at) = read_public_key(buf, at + 8)?;
    let (proof_of_integrity, at) = read_bytes(buf, at)?;
    let (proof_of_election, at) = read_bytes(buf, at)?;
    let (ledger_operations, at) = decode_ledger_operations(buf, at)?;
    let (signature, at) = read_bytes(buf, at)?;
    Ok((
        ValidationStamp {
            timestamp,
            proof_of_work,
            proof_of_integrity,
            proof_of_election,
            ledger_operations,
            signature,
        },
        at,
    ))
}

fn encode_cross_validation_stamp(out: &mut Vec<u8>, stamp: &CrossValidationStamp) {
    write_public_key(out, &stamp.node_public_key);
    write_bytes(out, &stamp.signature);
    out.push(stamp.inconsistencies.len() as u8);
    for inc in &stamp.inconsistencies {
        out.push(inc.id());
    }
}

fn decode_cross_validation_stamp(
    buf: &[u8],
    at: usize,
) -> Result<(CrossValidationStamp, usize), CodecError> {
    let (node_public_key, at) = read_public_key(buf, at)?;
    let (signature, at) = read_bytes(buf, at)?;
    let n = *buf.get(at).ok_or(CodecError::Truncated)? as usize;
    let mut at = at + 1;
    let mut inconsistencies = Vec::with_capacity(n);
    for _ in 0..n {
        let id = *buf.get(at).ok_or(CodecError::Truncated)?;
        inconsistencies.push(Inconsistency::from_id(id).ok_or(CodecError::UnknownTag(id))?);
        at += 1;
    }
    Ok((
        CrossValidationStamp {
            node_public_key,
            signature,
            inconsistencies,
        },
        at,
    ))
}

/// Encodes a transaction as a self-describing chain-file record:
/// `<tag:1><version:1><payload_len:4><payload>`.
pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    let mut payload = Vec::new();
    write_address(&mut payload, &tx.address);
    write_public_key(&mut payload, &tx.previous_public_key);
    payload.push(tx.tx_type.id());
    encode_data(&mut payload, &tx.data);
    write_bytes(&mut payload, &tx.previous_signature);
    write_bytes(&mut payload, &tx.origin_signature);
    match &tx.validation_stamp {
        Some(stamp) => {
            payload.push(1);
            encode_validation_stamp(&mut payload, stamp);
        }
        None => payload.push(0),
    }
    payload.push(tx.cross_validation_stamps.len() as u8);
    for stamp in &tx.cross_validation_stamps {
        encode_cross_validation_stamp(&mut payload, stamp);
    }

    let mut out = Vec::with_capacity(6 + payload.len());
    out.push(TX_RECORD_TAG);
    out.push(TX_RECORD_VERSION);
    write_u32(&mut out, payload.len() as u32);
    out.extend_from_slice(&payload);
    out
}

/// Decodes one transaction record from `buf[at..]`. Returns the transaction and
/// the total number of bytes the record occupied (header + payload), matching
/// what `ChainIndex` stores as a record's `size`.
pub fn decode_transaction(buf: &[u8], at: usize) -> Result<(Transaction, usize), CodecError> {
    let tag = *buf.get(at).ok_or(CodecError::Truncated)?;
    if tag != TX_RECORD_TAG {
        return Err(CodecError::UnknownTag(tag));
    }
    let _version = *buf.get(at + 1).ok_or(CodecError::Truncated)?;
    let payload_len = read_u32(buf, at + 2)? as usize;
    let payload_start = at + 6;
    let payload_end = payload_start + payload_len;
    if buf.len() < payload_end {
        return Err(CodecError::Truncated);
    }
    let payload = &buf[payload_start..payload_end];

    let (address, p) = read_address(payload, 0)?;
    let (previous_public_key, p) = read_public_key(payload, p)?;
    let type_id = *payload.get(p).ok_or(CodecError::Truncated)?;
    let tx_type =
        TransactionType::from_id(type_id).ok_or(CodecError::UnknownTransactionType(type_id))?;
    let (data, p) = decode_data(payload, p + 1)?;
    let (previous_signature, p) = read_bytes(payload, p)?;
    let (origin_signature, p) = read_bytes(payload, p)?;
    let has_stamp = *payload.get(p).ok_or(CodecError::Truncated)?;
    let (validation_stamp, p) = if has_stamp == 1 {
        let (stamp, p) = decode_validation_stamp(payload, p + 1)?;
        (Some(stamp), p)
    } else {
        (None, p + 1)
    };
    let n_stamps = *payload.get(p).ok_or(CodecError::Truncated)? as usize;
    let mut p = p + 1;
    let mut cross_validation_stamps = Vec::with_capacity(n_stamps);
    for _ in 0..n_stamps {
        let (stamp, next) = decode_cross_validation_stamp(payload, p)?;
        cross_validation_stamps.push(stamp);
        p = next;
    }

    Ok((
        Transaction {
            address,
            previous_public_key,
            tx_type,
            data,
            previous_signature,
            origin_signature,
            validation_stamp,
            cross_validation_stamps,
        },
        payload_end - at,
    ))
}

/// `<current_address><genesis_address><size:u32_be><offset:u32_be>`
pub fn encode_subset_index_record(current: &Address, genesis: &Address, size: u32, offset: u32) -> Vec<u8> {
    let mut out = Vec::new();
    write_address(&mut out, current);
    write_address(&mut out, genesis);
    write_u32(&mut out, size);
    write_u32(&mut out, offset);
    out
}

#[derive(Debug)]
pub struct SubsetIndexRecord {
    pub current_address: Address,
    pub genesis_address: Address,
    pub size: u32,
    pub offset: u32,
}

/// Decodes one subset-index record starting at `at`. A truncated trailing
/// record (e.g. a crash mid-append) is reported as [`CodecError::Truncated`] so
/// the caller can stop the recovery scan without treating it as fatal.
pub fn decode_subset_index_record(
    buf: &[u8],
    at: usize,
) -> Result<(SubsetIndexRecord, usize), CodecError> {
    let (current_address, p) = read_address(buf, at)?;
    let (genesis_address, p) = read_address(buf, p)?;
    let size = read_u32(buf, p)?;
    let offset = read_u32(buf, p + 4)?;
    Ok((
        SubsetIndexRecord {
            current_address,
            genesis_address,
            size,
            offset,
        },
        p + 8,
    ))
}

/// `<unix_ts:u32_be><address>`
pub fn encode_chain_addresses_record(timestamp: u32, address: &Address) -> Vec<u8> {
    let mut out = Vec::new();
    write_u32(&mut out, timestamp);
    write_address(&mut out, address);
    out
}

pub fn decode_chain_addresses_record(buf: &[u8], at: usize) -> Result<((u32, Address), usize), CodecError> {
    let ts = read_u32(buf, at)?;
    let (addr, p) = read_address(buf, at + 4)?;
    Ok(((ts, addr), p))
}

/// `<unix_ts:u32_be><public_key>`
pub fn encode_chain_keys_record(timestamp: u32, key: &PublicKey) -> Vec<u8> {
    let mut out = Vec::new();
    write_u32(&mut out, timestamp);
    write_public_key(&mut out, key);
    out
}

pub fn decode_chain_keys_record(buf: &[u8], at: usize) -> Result<((u32, PublicKey), usize), CodecError> {
    let ts = read_u32(buf, at)?;
    let (key, p) = read_public_key(buf, at + 4)?;
    Ok(((ts, key), p))
}

/// Type-index record: `<address>` only.
pub fn encode_type_index_record(address: &Address) -> Vec<u8> {
    let mut out = Vec::new();
    write_address(&mut out, address);
    out
}

pub fn decode_type_index_record(buf: &[u8], at: usize) -> Result<(Address, usize), CodecError> {
    read_address(buf, at)
}

pub fn encode_transaction_summary(summary: &TransactionSummary) -> Vec<u8> {
    summary.serialize()
}

pub fn decode_transaction_summary(buf: &[u8], at: usize) -> Result<(TransactionSummary, usize), CodecError> {
    let (address, p) = read_address(buf, at)?;
    let type_id = *buf.get(p).ok_or(CodecError::Truncated)?;
    let tx_type =
        TransactionType::from_id(type_id).ok_or(CodecError::UnknownTransactionType(type_id))?;
    let timestamp = read_u64(buf, p + 1)?;
    let (sig, p) = read_bytes(buf, p + 9)?;
    let fee = read_u64(buf, p)?;
    Ok((
        TransactionSummary {
            address,
            tx_type,
            timestamp,
            validation_stamp_signature: sig,
            fee,
        },
        p + 8,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_address(fill: u8) -> Address {
        Address::new(0, 0, vec![fill; 32]).unwrap()
    }

    fn sample_key(fill: u8) -> PublicKey {
        PublicKey::new(0, 0, vec![fill; 32]).unwrap()
    }

    #[test]
    fn subset_index_record_round_trip() {
        let cur = sample_address(0x11);
        let gen = sample_address(0x00);
        let encoded = encode_subset_index_record(&cur, &gen, 200, 0);
        assert_eq!(encoded.len(), 34 + 34 + 4 + 4);
        let (rec, consumed) = decode_subset_index_record(&encoded, 0).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(rec.size, 200);
        assert_eq!(rec.offset, 0);
        assert_eq!(rec.current_address, cur);
        assert_eq!(rec.genesis_address, gen);
    }

    #[test]
    fn chain_addresses_record_round_trip() {
        let addr = sample_address(0x22);
        let encoded = encode_chain_addresses_record(1_700_000_000, &addr);
        let ((ts, decoded), consumed) = decode_chain_addresses_record(&encoded, 0).unwrap();
        assert_eq!(ts, 1_700_000_000);
        assert_eq!(decoded, addr);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn transaction_round_trip() {
        let tx = Transaction {
            address: sample_address(0x07),
            previous_public_key: sample_key(0x01),
            tx_type: TransactionType::Transfer,
            data: TransactionData {
                content: b"hello".to_vec(),
                code: None,
                ledger: TransactionLedger {
                    transfers: vec![LedgerTransfer {
                        to: sample_address(0x09),
                        amount: 42,
                        token_address: None,
                    }],
                },
                ownerships: vec![],
            },
            previous_signature: vec![1, 2, 3],
            origin_signature: vec![4, 5, 6],
            validation_stamp: None,
            cross_validation_stamps: vec![],
        };
        let encoded = encode_transaction(&tx);
        let (decoded, size) = decode_transaction(&encoded, 0).unwrap();
        assert_eq!(size, encoded.len());
        assert_eq!(decoded, tx);
    }

    #[test]
    fn truncated_trailing_record_is_reported_truncated() {
        let cur = sample_address(0x11);
        let gen = sample_address(0x00);
        let mut encoded = encode_subset_index_record(&cur, &gen, 200, 0);
        encoded.truncate(encoded.len() - 1);
        let err = decode_subset_index_record(&encoded, 0).unwrap_err();
        assert_eq!(err, CodecError::Truncated);
    }
}
