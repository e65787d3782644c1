//! The append-only chain of final blocks.
//!
//! Size and cumulative transaction count are published through atomics so
//! observers read them without taking the chain lock. Appends enforce the
//! prev-hash link; once a block is in, it is immutable and handed out as a
//! shared read-only handle.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::block::FinalBlock;
use crate::chain_state::ChainState;
use crate::error::{DevvError, DevvResult};
use crate::types::{Hash256, ZERO_HASH};

pub struct Blockchain {
    name: String,
    chain: RwLock<Vec<Arc<FinalBlock>>>,
    /// State the chain starts from; also the tip state while empty.
    genesis_state: ChainState,
    chain_size: AtomicUsize,
    num_transactions: AtomicU64,
}

impl Blockchain {
    pub fn new(name: impl Into<String>, genesis_state: ChainState) -> Self {
        Self {
            name: name.into(),
            chain: RwLock::new(Vec::new()),
            genesis_state,
            chain_size: AtomicUsize::new(0),
            num_transactions: AtomicU64::new(0),
        }
    }

    /// Append a block. The block's `prev_hash` must match the current tip
    /// (all-zero for the genesis block) or the append is rejected.
    pub fn push_back(&self, block: FinalBlock) -> DevvResult<Arc<FinalBlock>> {
        let mut chain = self.chain.write();
        let expected = chain
            .last()
            .map(|tip| tip.hash())
            .unwrap_or(ZERO_HASH);
        if block.prev_hash() != expected {
            return Err(DevvError::ConsistencyFailure(format!(
                "prev hash {} does not match tip {}",
                hex::encode(&block.prev_hash()[..8]),
                hex::encode(&expected[..8])
            )));
        }

        let block = Arc::new(block);
        chain.push(block.clone());
        let size = chain.len();
        drop(chain);

        self.chain_size.store(size, Ordering::Release);
        let ntxs = self
            .num_transactions
            .fetch_add(block.num_transactions() as u64, Ordering::AcqRel)
            + block.num_transactions() as u64;

        tracing::info!(
            "{} - updating final blockchain - (size/ntxs) ({}/{}) this ({}) prev ({})",
            self.name,
            size,
            ntxs,
            hex::encode(&block.hash()[..8]),
            hex::encode(&block.prev_hash()[..8]),
        );
        Ok(block)
    }

    /// Chain length; readable without the chain lock.
    pub fn size(&self) -> usize {
        self.chain_size.load(Ordering::Acquire)
    }

    /// Cumulative transaction count across all blocks.
    pub fn num_transactions(&self) -> u64 {
        self.num_transactions.load(Ordering::Acquire)
    }

    pub fn back(&self) -> Option<Arc<FinalBlock>> {
        self.chain.read().last().cloned()
    }

    pub fn get(&self, index: usize) -> Option<Arc<FinalBlock>> {
        self.chain.read().get(index).cloned()
    }

    /// Hash of the tip's canonical form; all-zero while the chain is empty.
    pub fn tip_hash(&self) -> Hash256 {
        self.back().map(|tip| tip.hash()).unwrap_or(ZERO_HASH)
    }

    /// Chain state after the tip; the genesis state while the chain is empty.
    pub fn tip_state(&self) -> ChainState {
        self.back()
            .map(|tip| tip.chain_state().clone())
            .unwrap_or_else(|| self.genesis_state.clone())
    }

    /// Canonical bytes of the whole chain.
    pub fn binary_dump(&self) -> Vec<u8> {
        let chain = self.chain.read();
        let mut out = Vec::new();
        for block in chain.iter() {
            out.extend_from_slice(&block.encode());
        }
        out
    }

    /// Canonical bytes for heights `[start, size-1)`. The tip is deliberately
    /// excluded; it may still be evolving in the caller's semantics.
    pub fn partial_binary_dump(&self, start: usize) -> Vec<u8> {
        let chain = self.chain.read();
        let mut out = Vec::new();
        if !chain.is_empty() {
            for block in chain.iter().take(chain.len() - 1).skip(start) {
                out.extend_from_slice(&block.encode());
            }
        }
        out
    }
}
