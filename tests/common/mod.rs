//! In-memory shard harness: real controllers wired to a vector outbox, with
//! a pump that routes topic-addressed messages until the shard goes quiet.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use k256::ecdsa::SigningKey;
use parking_lot::Mutex;

use devvd::block::{FinalBlock, ProposedBlock};
use devvd::blockchain::Blockchain;
use devvd::chain_state::ChainState;
use devvd::context::{AppMode, DevvContext};
use devvd::controller::DevvController;
use devvd::crypto;
use devvd::keyring::KeyRing;
use devvd::message::{DevvMessage, MessageCallback, MessageType};
use devvd::summary::Summary;
use devvd::transaction::{Transaction, Transfer};
use devvd::types::{Address, Operation};
use devvd::utx_pool::UnrecordedTransactionPool;
use devvd::validation::Validation;

pub const SHARD_NAME: &str = "shard-test";

pub struct TestNode {
    pub controller: Arc<DevvController>,
    pub context: Arc<DevvContext>,
    pub outbox: Arc<Mutex<Vec<DevvMessage>>>,
}

impl TestNode {
    pub fn new(
        node_index: usize,
        peer_count: usize,
        mode: AppMode,
        shard_name: &str,
        keys: Arc<KeyRing>,
        genesis: ChainState,
    ) -> Self {
        let context = Arc::new(DevvContext::new(
            node_index,
            peer_count,
            mode,
            shard_name,
            Duration::from_millis(0),
        ));
        let chain = Arc::new(Blockchain::new(shard_name, genesis));
        let pool = Arc::new(UnrecordedTransactionPool::new(100));
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let callback: MessageCallback = {
            let outbox = outbox.clone();
            Arc::new(move |msg| outbox.lock().push(msg))
        };
        let controller = Arc::new(DevvController::new(
            keys,
            context.clone(),
            chain,
            pool,
            callback,
        ));
        Self {
            controller,
            context,
            outbox,
        }
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        self.controller.final_chain()
    }

    pub fn pool(&self) -> &Arc<UnrecordedTransactionPool> {
        self.controller.utx_pool()
    }
}

pub struct TestShard {
    pub nodes: Vec<TestNode>,
    pub node_keys: Vec<SigningKey>,
    pub node_addrs: Vec<Address>,
    pub genesis: ChainState,
}

impl TestShard {
    /// A single tier-2 shard with `peer_count` peers and seeded balances.
    pub fn new(peer_count: usize, funded: &[(Address, u64, i64)]) -> Self {
        let node_keys: Vec<SigningKey> = (0..peer_count).map(|_| crypto::generate_key()).collect();
        let node_addrs: Vec<Address> = node_keys.iter().map(crypto::address_of).collect();
        let mut genesis = ChainState::new();
        for (addr, coin, amount) in funded {
            genesis.set_balance(*addr, *coin, *amount);
        }

        let nodes = (0..peer_count)
            .map(|i| {
                let keys = Arc::new(KeyRing::new(node_keys[i].clone(), node_addrs.clone()));
                TestNode::new(
                    i,
                    peer_count,
                    AppMode::T2,
                    SHARD_NAME,
                    keys,
                    genesis.clone(),
                )
            })
            .collect();

        Self {
            nodes,
            node_keys,
            node_addrs,
            genesis,
        }
    }

    pub fn shard_uri(&self) -> String {
        self.nodes[0].context.shard_uri()
    }

    /// Deliver every queued outbound message to its subscribers, repeating
    /// until the shard produces no more traffic. Recoverable handler errors
    /// (duplicate finals, stale validations) are dropped like the node's
    /// inbound worker drops them.
    pub async fn pump(&self) {
        loop {
            let mut batch = Vec::new();
            for node in &self.nodes {
                batch.append(&mut node.outbox.lock());
            }
            if batch.is_empty() {
                break;
            }
            for msg in batch {
                for node in &self.nodes {
                    let own = node.context.own_uri();
                    if msg.uri == node.context.shard_uri() || msg.uri == own {
                        let _ = node.controller.dispatch(msg.clone()).await;
                    }
                }
            }
        }
    }
}

/// A signed two-leg payment from `key`'s address.
pub fn payment(key: &SigningKey, to: Address, coin: u64, amount: i64, nonce: u64) -> Transaction {
    let from = crypto::address_of(key);
    Transaction::build(
        Operation::Exchange,
        &[
            Transfer {
                address: from,
                coin,
                delta: -amount,
                nonce_index: nonce,
            },
            Transfer {
                address: to,
                coin,
                delta: amount,
                nonce_index: nonce,
            },
        ],
        &nonce.to_le_bytes().repeat(2),
        key,
    )
    .unwrap()
}

/// A TRANSACTION_ANNOUNCEMENT carrying the given transactions.
pub fn announcement(uri: &str, txs: &[Transaction]) -> DevvMessage {
    let mut data = Vec::new();
    for tx in txs {
        data.extend_from_slice(tx.canonical());
    }
    DevvMessage::new(uri, MessageType::TransactionAnnouncement, data, 0)
}

/// A final block carrying `txs`, endorsed by enough of the given node keys
/// to clear the threshold for `peer_count` (the proposer signs first).
pub fn endorsed_block(
    prev_hash: devvd::types::Hash256,
    txs: Vec<Transaction>,
    prior: &ChainState,
    node_keys: &[SigningKey],
    proposer: usize,
    endorsers: &[usize],
) -> FinalBlock {
    let summary = Summary::from_transactions(&txs);
    let mut after = prior.clone();
    after.apply_summary(&summary).unwrap();

    let mut proposal = ProposedBlock::new(prev_hash, txs, summary, Validation::new(), after);
    proposal.sign(
        &node_keys[proposer],
        crypto::address_of(&node_keys[proposer]),
    );
    for &endorser in endorsers {
        let sig = crypto::sign_bytes(&node_keys[endorser], &proposal.signing_bytes());
        proposal.add_validation(crypto::address_of(&node_keys[endorser]), sig);
    }
    FinalBlock::from_proposal(proposal)
}

/// Grow a chain with empty blocks (no endorsements; direct appends).
pub fn extend_with_empty_blocks(chain: &Blockchain, count: usize) {
    for _ in 0..count {
        let block = FinalBlock::from_proposal(ProposedBlock::new(
            chain.tip_hash(),
            Vec::new(),
            Summary::new(),
            Validation::new(),
            chain.tip_state(),
        ));
        chain.push_back(block).unwrap();
    }
}
