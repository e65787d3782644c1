//! Per-node shard context: who we are, which tier we run in, and where
//! our peers live on the messaging fabric.

use std::time::Duration;

/// Which tier this node participates in. Tier-1 is the summary shard,
/// tier-2 shards process transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppMode {
    T1,
    T2,
}

#[derive(Clone, Debug)]
pub struct DevvContext {
    /// Global node index across all shards (T1 nodes first, then each T2
    /// shard in order).
    node_index: usize,
    /// Number of peers in each shard; static for the life of the process.
    peer_count: usize,
    mode: AppMode,
    shard_name: String,
    /// How long the proposal collector waits for the pool to fill before
    /// sampling it.
    max_wait: Duration,
}

impl DevvContext {
    pub fn new(
        node_index: usize,
        peer_count: usize,
        mode: AppMode,
        shard_name: impl Into<String>,
        max_wait: Duration,
    ) -> Self {
        Self {
            node_index,
            peer_count,
            mode,
            shard_name: shard_name.into(),
            max_wait,
        }
    }

    pub fn current_node(&self) -> usize {
        self.node_index
    }

    pub fn peer_count(&self) -> usize {
        self.peer_count
    }

    pub fn app_mode(&self) -> AppMode {
        self.mode
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Shard-local index of this node.
    pub fn shard_index(&self) -> usize {
        self.node_index % self.peer_count
    }

    /// The proposer for a block height rotates round-robin through the shard.
    pub fn proposer_for(&self, height: usize) -> usize {
        height % self.peer_count
    }

    pub fn is_proposer(&self, height: usize) -> bool {
        self.shard_index() == self.proposer_for(height)
    }

    /// Pub/sub topic shared by all peers of this shard.
    pub fn shard_uri(&self) -> String {
        format!("devv/{}", self.shard_name)
    }

    /// Direct topic of the peer with a global node index.
    pub fn uri_from_index(&self, index: usize) -> String {
        format!("devv/node-{index}")
    }

    /// Topic this node receives direct messages on.
    pub fn own_uri(&self) -> String {
        self.uri_from_index(self.node_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposer_rotates_round_robin() {
        let ctx = DevvContext::new(4, 3, AppMode::T2, "shard-1", Duration::from_millis(0));
        assert_eq!(ctx.shard_index(), 1);
        assert!(ctx.is_proposer(1));
        assert!(ctx.is_proposer(4));
        assert!(!ctx.is_proposer(0));
        assert_eq!(ctx.proposer_for(5), 2);
    }

    #[test]
    fn uris_are_stable() {
        let ctx = DevvContext::new(2, 3, AppMode::T1, "root", Duration::from_millis(5));
        assert_eq!(ctx.shard_uri(), "devv/root");
        assert_eq!(ctx.own_uri(), "devv/node-2");
        assert_eq!(ctx.uri_from_index(7), "devv/node-7");
    }
}
