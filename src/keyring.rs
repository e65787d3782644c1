//! Key material for one node: its own signing key plus the shard's
//! address book, indexed by global node index.
//!
//! Keys are loaded once at startup and never mutated, so the ring is shared
//! between controllers without locking.

use k256::ecdsa::SigningKey;

use crate::crypto;
use crate::types::Address;

pub struct KeyRing {
    node_key: SigningKey,
    node_addr: Address,
    /// Peer addresses by global node index (tier-1 first, then each tier-2
    /// shard in index order).
    node_addrs: Vec<Address>,
}

impl KeyRing {
    pub fn new(node_key: SigningKey, node_addrs: Vec<Address>) -> Self {
        let node_addr = crypto::address_of(&node_key);
        Self {
            node_key,
            node_addr,
            node_addrs,
        }
    }

    /// This node's signing key.
    pub fn node_key(&self) -> &SigningKey {
        &self.node_key
    }

    /// This node's address (compressed public key).
    pub fn node_addr(&self) -> Address {
        self.node_addr
    }

    /// Address of the peer at a global node index.
    pub fn get_node_addr(&self, index: usize) -> Option<Address> {
        self.node_addrs.get(index).copied()
    }

    pub fn num_nodes(&self) -> usize {
        self.node_addrs.len()
    }

    /// True if `addr` belongs to a known peer of this shard group.
    pub fn is_known_peer(&self, addr: &Address) -> bool {
        self.node_addrs.contains(addr)
    }
}
