//! Deterministic election of validators and storage nodes for a given
//! transaction address, so that every honest node independently computes the
//! same committee without a coordination round.

pub mod error;

use archethic_crypto::{Crypto, DefaultCrypto};
use archethic_types::keys::{Address, HashAlgoId, PublicKey};
use archethic_types::transaction::TransactionType;
use error::ElectionError;

/// A node candidate for election: its key, and whether it currently counts as
/// authorized (part of the network's node list) and available (reachable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCandidate {
    pub public_key: PublicKey,
    pub authorized: bool,
    pub available: bool,
}

impl NodeCandidate {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            authorized: true,
            available: true,
        }
    }
}

/// Deterministic node selection for mining committees and storage pools.
pub trait Election: Send + Sync {
    /// Computes the election seed for a transaction: `hash(address || timestamp)`.
    fn election_seed(&self, address: &Address, timestamp: u64) -> Result<Vec<u8>, ElectionError>;

    /// Sorts `candidates` by `hash(seed || node_public_key)`, ascending, so the
    /// first `n` sorted nodes form the committee. Ties cannot occur in practice
    /// (seed includes the full address and timestamp), but are broken by public
    /// key bytes for determinism.
    fn sort_by_election_seed(
        &self,
        seed: &[u8],
        candidates: &[NodeCandidate],
    ) -> Result<Vec<NodeCandidate>, ElectionError>;

    /// The validation committee for a transaction: the coordinator is the first
    /// entry, cross-validators the rest, up to `n`.
    fn validation_nodes(
        &self,
        address: &Address,
        timestamp: u64,
        candidates: &[NodeCandidate],
        n: usize,
    ) -> Result<Vec<NodeCandidate>, ElectionError>;

    /// The storage pool for a transaction of a given type: the first `n` nodes
    /// in election order restricted to authorized, available candidates.
    fn chain_storage_nodes(
        &self,
        address: &Address,
        timestamp: u64,
        tx_type: TransactionType,
        candidates: &[NodeCandidate],
        n: usize,
    ) -> Result<Vec<NodeCandidate>, ElectionError>;

    /// The storage pool for the beacon chain summary of a transaction's subset.
    fn beacon_storage_nodes(
        &self,
        subset: u8,
        timestamp: u64,
        candidates: &[NodeCandidate],
        n: usize,
    ) -> Result<Vec<NodeCandidate>, ElectionError>;
}

/// Seed-sort election keyed on SHA-256, matching the hash algorithm storage
/// addresses are derived with by default.
#[derive(Default, Clone, Copy)]
pub struct SeedSortElection;

impl SeedSortElection {
    fn rank_key(&self, seed: &[u8], public_key: &PublicKey) -> Result<Vec<u8>, ElectionError> {
        let mut payload = Vec::with_capacity(seed.len() + public_key.len());
        payload.extend_from_slice(seed);
        payload.extend_from_slice(public_key.as_bytes());
        DefaultCrypto
            .hash(HashAlgoId::Sha256.id(), &payload)
            .map_err(|e| ElectionError::Hashing(e.to_string()))
    }
}

impl Election for SeedSortElection {
    fn election_seed(&self, address: &Address, timestamp: u64) -> Result<Vec<u8>, ElectionError> {
        let mut payload = Vec::with_capacity(address.len() + 8);
        payload.extend_from_slice(address.as_bytes());
        payload.extend_from_slice(&timestamp.to_be_bytes());
        DefaultCrypto
            .hash(HashAlgoId::Sha256.id(), &payload)
            .map_err(|e| ElectionError::Hashing(e.to_string()))
    }

    fn sort_by_election_seed(
        &self,
        seed: &[u8],
        candidates: &[NodeCandidate],
    ) -> Result<Vec<NodeCandidate>, ElectionError> {
        if candidates.is_empty() {
            tracing::warn!(target: "election", "election seed computed over an empty candidate list");
            return Err(ElectionError::EmptyNodeList);
        }
        let mut ranked: Vec<(Vec<u8>, NodeCandidate)> = candidates
            .iter()
            .map(|c| self.rank_key(seed, &c.public_key).map(|k| (k, c.clone())))
            .collect::<Result<_, _>>()?;
        ranked.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.public_key.as_bytes().cmp(b.1.public_key.as_bytes()))
        });
        Ok(ranked.into_iter().map(|(_, c)| c).collect())
    }

    fn validation_nodes(
        &self,
        address: &Address,
        timestamp: u64,
        candidates: &[NodeCandidate],
        n: usize,
    ) -> Result<Vec<NodeCandidate>, ElectionError> {
        let authorized: Vec<_> = candidates.iter().filter(|c| c.authorized).cloned().collect();
        let seed = self.election_seed(address, timestamp)?;
        let sorted = self.sort_by_election_seed(&seed, &authorized)?;
        if sorted.len() < n {
            tracing::warn!(
                target: "election",
                address = %address,
                wanted = n,
                available = sorted.len(),
                "fewer authorized nodes than the requested validation committee size"
            );
        }
        Ok(sorted.into_iter().take(n).collect())
    }

    fn chain_storage_nodes(
        &self,
        address: &Address,
        timestamp: u64,
        _tx_type: TransactionType,
        candidates: &[NodeCandidate],
        n: usize,
    ) -> Result<Vec<NodeCandidate>, ElectionError> {
        let available: Vec<_> = candidates
            .iter()
            .filter(|c| c.authorized && c.available)
            .cloned()
            .collect();
        let seed = self.election_seed(address, timestamp)?;
        let sorted = self.sort_by_election_seed(&seed, &available)?;
        Ok(sorted.into_iter().take(n).collect())
    }

    fn beacon_storage_nodes(
        &self,
        subset: u8,
        timestamp: u64,
        candidates: &[NodeCandidate],
        n: usize,
    ) -> Result<Vec<NodeCandidate>, ElectionError> {
        let mut payload = vec![subset];
        payload.extend_from_slice(&timestamp.to_be_bytes());
        let seed = DefaultCrypto
            .hash(HashAlgoId::Sha256.id(), &payload)
            .map_err(|e| ElectionError::Hashing(e.to_string()))?;
        let available: Vec<_> = candidates
            .iter()
            .filter(|c| c.authorized && c.available)
            .cloned()
            .collect();
        let sorted = self.sort_by_election_seed(&seed, &available)?;
        Ok(sorted.into_iter().take(n).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(fill: u8) -> NodeCandidate {
        NodeCandidate::new(PublicKey::new(0, 0, vec![fill; 32]).unwrap())
    }

    fn address() -> Address {
        Address::new(0, 0, vec![0x01; 32]).unwrap()
    }

    #[test]
    fn election_is_deterministic_across_calls() {
        let election = SeedSortElection;
        let candidates = vec![candidate(1), candidate(2), candidate(3), candidate(4)];
        let a = election
            .validation_nodes(&address(), 1_700_000_000, &candidates, 2)
            .unwrap();
        let b = election
            .validation_nodes(&address(), 1_700_000_000, &candidates, 2)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn election_changes_with_timestamp() {
        let election = SeedSortElection;
        let candidates = vec![candidate(1), candidate(2), candidate(3), candidate(4)];
        let a = election
            .validation_nodes(&address(), 1_700_000_000, &candidates, 4)
            .unwrap();
        let b = election
            .validation_nodes(&address(), 1_700_000_001, &candidates, 4)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unauthorized_nodes_are_excluded() {
        let election = SeedSortElection;
        let mut excluded = candidate(5);
        excluded.authorized = false;
        let candidates = vec![candidate(1), excluded.clone()];
        let selected = election
            .validation_nodes(&address(), 1_700_000_000, &candidates, 2)
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_ne!(selected[0].public_key, excluded.public_key);
    }

    #[test]
    fn empty_candidate_list_is_an_error() {
        let election = SeedSortElection;
        let err = election
            .validation_nodes(&address(), 1_700_000_000, &[], 2)
            .unwrap_err();
        assert!(matches!(err, ElectionError::EmptyNodeList));
    }
}
