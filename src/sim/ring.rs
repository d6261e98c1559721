//! sim/ring — consistent-hashing shard router.
//!
//! Uses `XxHash64` for a stable, toolchain-independent hash rather than
//! `std::hash::DefaultHasher`, whose output is explicitly unstable
//! across Rust versions.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use crate::sim::bus::Endpoint;

const DEFAULT_VIRTUAL_NODES: usize = 64;

fn hash_bytes(data: &[u8]) -> u64 {
    let mut h = XxHash64::with_seed(0);
    data.hash(&mut h);
    h.finish()
}

fn vnode_hash(ep: &Endpoint, index: usize) -> u64 {
    hash_bytes(format!("{}:{}#{}", ep.host, ep.port, index).as_bytes())
}

/// An ordered map from virtual-node hash to owning endpoint. Lookup
/// returns the endpoint of the smallest entry whose hash is >= the
/// key's hash, wrapping around to the first entry.
pub struct HashRing {
    virtual_nodes: usize,
    ring: BTreeMap<u64, Endpoint>,
    vnodes_by_server: HashMap<Endpoint, Vec<u64>>,
}

impl HashRing {
    pub fn new(virtual_nodes: usize) -> Self {
        assert!(virtual_nodes >= 1, "a server needs at least one virtual node");
        Self {
            virtual_nodes,
            ring: BTreeMap::new(),
            vnodes_by_server: HashMap::new(),
        }
    }

    pub fn with_default_virtual_nodes() -> Self {
        Self::new(DEFAULT_VIRTUAL_NODES)
    }

    pub fn add_server(&mut self, endpoint: Endpoint) {
        let mut hashes = Vec::with_capacity(self.virtual_nodes);
        for i in 0..self.virtual_nodes {
            let h = vnode_hash(&endpoint, i);
            self.ring.insert(h, endpoint.clone());
            hashes.push(h);
        }
        self.vnodes_by_server.insert(endpoint, hashes);
    }

    pub fn remove_server(&mut self, endpoint: &Endpoint) {
        if let Some(hashes) = self.vnodes_by_server.remove(endpoint) {
            for h in hashes {
                self.ring.remove(&h);
            }
        }
    }

    /// All distinct physical endpoints currently on the ring, in a stable
    /// (sorted) order; used by the KV client's unsharded `LIST`.
    pub fn servers(&self) -> Vec<Endpoint> {
        let mut servers: Vec<Endpoint> = self.vnodes_by_server.keys().cloned().collect();
        servers.sort();
        servers
    }

    pub fn server_for_key(&self, key: &[u8]) -> Option<Endpoint> {
        if self.ring.is_empty() {
            return None;
        }
        let slot = hash_bytes(key);
        match self.ring.range(slot..).next() {
            Some((_, ep)) => Some(ep.clone()),
            None => self.ring.values().next().cloned(),
        }
    }
}
