//! The unrecorded-transaction pool: admission, greedy validity collection,
//! and the single pending proposal built from it.
//!
//! The pool is an ordered map keyed by transaction signature, which makes
//! iteration order identical across peers — two nodes holding the same
//! transactions select the same proposal. Each entry carries a small
//! reference count of the in-flight proposals that include it.
//!
//! Locking: `txs` guards the map and its cumulative counter;
//! `pending_proposal` guards the proposal. They are never held together;
//! where both are needed the map lock comes first (collection, then
//! proposal installation).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::block::{FinalBlock, ProposedBlock};
use crate::buffer::InputBuffer;
use crate::chain_state::ChainState;
use crate::context::DevvContext;
use crate::error::{DevvError, DevvResult};
use crate::keyring::KeyRing;
use crate::summary::Summary;
use crate::transaction::Transaction;
use crate::types::{Hash256, Signature};
use crate::validation::{self, Validation};

struct PoolEntry {
    /// How many in-flight proposals reference this transaction. Entries are
    /// admitted at 1; only a count of 0 is eligible for garbage collection.
    refcount: u8,
    tx: Transaction,
}

struct TxStore {
    map: BTreeMap<Signature, PoolEntry>,
    /// Total transactions ever admitted, kept under the same lock.
    num_cum_txs: u64,
}

pub struct UnrecordedTransactionPool {
    txs: Mutex<TxStore>,
    pending_proposal: Mutex<Option<ProposedBlock>>,
    has_proposal: AtomicBool,
    max_tx_per_block: usize,
}

impl UnrecordedTransactionPool {
    pub fn new(max_tx_per_block: usize) -> Self {
        Self {
            txs: Mutex::new(TxStore {
                map: BTreeMap::new(),
                num_cum_txs: 0,
            }),
            pending_proposal: Mutex::new(None),
            has_proposal: AtomicBool::new(false),
            max_tx_per_block,
        }
    }

    /// Decode and admit a batch of canonical transactions.
    ///
    /// Sound, novel transactions are inserted with a reference count of 1;
    /// duplicates have their count incremented; unsound transactions are
    /// dropped. Returns true only if every transaction was admitted.
    pub fn add_transactions(&self, serial: &[u8]) -> bool {
        let mut decoded = Vec::new();
        let mut all_good = true;
        let mut buffer = InputBuffer::new(serial);
        while !buffer.at_end() {
            match Transaction::decode(&mut buffer) {
                Ok(tx) => decoded.push(tx),
                Err(err) => {
                    tracing::warn!("dropping malformed transaction batch tail: {err}");
                    all_good = false;
                    break;
                }
            }
        }
        self.add_decoded(decoded) && all_good
    }

    fn add_decoded(&self, txs: Vec<Transaction>) -> bool {
        let mut store = self.txs.lock();
        let mut all_good = true;
        let mut added = 0usize;
        for tx in txs {
            let sig = tx.signature();
            if let Some(entry) = store.map.get_mut(&sig) {
                entry.refcount = entry.refcount.saturating_add(1);
                tracing::debug!("transaction already in UTX pool, incrementing reference count");
            } else if tx.is_sound() {
                if store.num_cum_txs == 0 {
                    tracing::info!("first transaction added to the pool");
                }
                store.map.insert(sig, PoolEntry { refcount: 1, tx });
                store.num_cum_txs += 1;
                added += 1;
            } else {
                tracing::debug!("transaction is unsound");
                all_good = false;
            }
        }
        tracing::info!(
            "added {added} sound transactions, {} pending",
            store.map.len()
        );
        all_good
    }

    /// Strict admission: the first unsound *or* invalid transaction returns
    /// false immediately. Transactions admitted before the failure keep
    /// their effect on the pool, `state` and `summary`.
    pub fn add_and_verify_transactions(
        &self,
        txs: Vec<Transaction>,
        state: &mut ChainState,
        summary: &mut Summary,
    ) -> bool {
        let mut store = self.txs.lock();
        for tx in txs {
            let sig = tx.signature();
            if let Some(entry) = store.map.get_mut(&sig) {
                entry.refcount = entry.refcount.saturating_add(1);
                continue;
            }
            if !tx.is_sound() {
                tracing::debug!("rejecting unsound transaction in strict admission");
                return false;
            }
            let transfers = tx.transfers();
            if state.apply_transfers(&transfers).is_err() {
                tracing::debug!("rejecting invalid transaction in strict admission");
                return false;
            }
            for transfer in &transfers {
                summary.add_transfer(transfer);
            }
            store.num_cum_txs += 1;
            store.map.insert(sig, PoolEntry { refcount: 1, tx });
        }
        true
    }

    pub fn has_pending_transactions(&self) -> bool {
        !self.txs.lock().map.is_empty()
    }

    pub fn num_pending_transactions(&self) -> usize {
        self.txs.lock().map.len()
    }

    pub fn cumulative_transactions(&self) -> u64 {
        self.txs.lock().num_cum_txs
    }

    /// Canonical bytes of every pooled transaction, in signature order.
    pub fn get_canonical(&self) -> Vec<u8> {
        let store = self.txs.lock();
        let mut out = Vec::new();
        for entry in store.map.values() {
            out.extend_from_slice(entry.tx.canonical());
        }
        out
    }

    /// JSON rendering of the pool; reference counts are not preserved.
    pub fn get_json(&self) -> String {
        let store = self.txs.lock();
        let items: Vec<serde_json::Value> =
            store.map.values().map(|entry| entry.tx.to_json()).collect();
        serde_json::Value::Array(items).to_string()
    }

    /// Build and install a new proposal on top of `prev_hash`, collecting a
    /// jointly valid transaction batch against `prior_state` and signing it
    /// with this node's key. Only one pending proposal exists at a time.
    pub async fn propose_block(
        &self,
        prev_hash: Hash256,
        prior_state: &ChainState,
        keys: &KeyRing,
        context: &DevvContext,
    ) -> bool {
        let (selected, summary, post_state) = self.lock_and_collect(prior_state, context).await;
        let mut proposal = ProposedBlock::new(
            prev_hash,
            selected,
            summary,
            Validation::new(),
            post_state,
        );
        proposal.sign(keys.node_key(), keys.node_addr());
        tracing::debug!(
            "propose_block(): {} transactions, canonical size {}",
            proposal.num_transactions(),
            proposal.encode().len()
        );
        *self.pending_proposal.lock() = Some(proposal);
        self.has_proposal.store(true, Ordering::Release);
        true
    }

    pub fn has_proposal(&self) -> bool {
        self.has_proposal.load(Ordering::Acquire)
    }

    /// Canonical bytes of the pending proposal, if any.
    pub fn get_proposal(&self) -> Option<Vec<u8>> {
        self.pending_proposal.lock().as_ref().map(ProposedBlock::encode)
    }

    pub fn proposal_prev_hash(&self) -> Option<Hash256> {
        self.pending_proposal.lock().as_ref().map(ProposedBlock::prev_hash)
    }

    pub fn proposal_num_transactions(&self) -> Option<usize> {
        self.pending_proposal
            .lock()
            .as_ref()
            .map(ProposedBlock::num_transactions)
    }

    /// Distinct endorsements on the pending proposal, proposer included.
    pub fn proposal_validation_count(&self) -> usize {
        self.pending_proposal
            .lock()
            .as_ref()
            .map(|p| p.validation().len())
            .unwrap_or(0)
    }

    /// Re-base the pending proposal onto a new chain tip.
    ///
    /// If its transactions remain jointly valid against `prior`, the
    /// proposal keeps its batch: the prev hash moves to the new tip, stale
    /// endorsements are dropped and it is re-signed. Otherwise the proposal
    /// is discarded and a fresh one is built; returns false in that case.
    pub async fn reverify_proposal(
        &self,
        prev_hash: Hash256,
        prior: &ChainState,
        keys: &KeyRing,
        context: &DevvContext,
    ) -> bool {
        {
            let mut guard = self.pending_proposal.lock();
            let Some(proposal) = guard.as_mut() else {
                return false;
            };
            if let Some(post_state) = revalidated_state(proposal, prior) {
                proposal.set_prev_hash(prev_hash);
                proposal.set_chain_state(post_state);
                proposal.clear_validation();
                proposal.sign(keys.node_key(), keys.node_addr());
                return true;
            }
            tracing::info!("pending proposal invalidated by new tip, rebuilding");
            *guard = None;
            self.has_proposal.store(false, Ordering::Release);
        }
        self.propose_block(prev_hash, prior, keys, context).await;
        false
    }

    /// Verify a remote endorsement against the pending proposal and record
    /// it. False if there is no proposal, the signer is not a shard peer,
    /// or the signature is for a different proposal.
    pub fn check_validation(&self, data: &[u8], keys: &KeyRing) -> bool {
        let mut buffer = InputBuffer::new(data);
        let Ok((addr, sig)) = validation::decode_entry(&mut buffer) else {
            tracing::debug!("malformed validation payload");
            return false;
        };
        if !keys.is_known_peer(&addr) {
            tracing::debug!("validation from unknown peer {addr}");
            return false;
        }
        let mut guard = self.pending_proposal.lock();
        let Some(proposal) = guard.as_mut() else {
            return false;
        };
        if !proposal.check_endorsement(&addr, &sig) {
            tracing::debug!("validation does not match the pending proposal");
            return false;
        }
        proposal.add_validation(addr, sig);
        true
    }

    /// Freeze the pending proposal into a final block, removing its
    /// transactions from the pool regardless of reference count.
    ///
    /// Precondition: `has_proposal()`.
    pub fn finalize_local_block(&self) -> DevvResult<FinalBlock> {
        let proposal = self
            .pending_proposal
            .lock()
            .take()
            .ok_or_else(|| DevvError::ConsistencyFailure("no pending proposal".into()))?;
        self.has_proposal.store(false, Ordering::Release);
        self.remove_transactions(proposal.transactions());
        Ok(FinalBlock::from_proposal(proposal))
    }

    /// Parse a remotely produced final block and drop its transactions
    /// from the pool.
    pub fn finalize_remote_block(
        &self,
        buffer: &mut InputBuffer<'_>,
        prior: &ChainState,
    ) -> DevvResult<FinalBlock> {
        let block = FinalBlock::decode(buffer, prior)?;
        self.remove_block_transactions(&block);
        Ok(block)
    }

    /// Drop a final block's transactions from the pool regardless of
    /// reference count.
    pub fn remove_block_transactions(&self, block: &FinalBlock) {
        self.remove_transactions(block.transactions());
    }

    fn remove_transactions(&self, txs: &[Transaction]) {
        let mut store = self.txs.lock();
        let before = store.map.len();
        for tx in txs {
            if store.map.remove(&tx.signature()).is_none() {
                tracing::trace!("finalized transaction was not pooled locally");
            }
        }
        tracing::debug!(
            "removed transactions: (to remove/size pre/size post) ({}/{before}/{})",
            txs.len(),
            store.map.len()
        );
    }

    /// Sweep entries no in-flight proposal references.
    pub fn garbage_collect(&self) -> usize {
        let mut store = self.txs.lock();
        let before = store.map.len();
        store.map.retain(|_, entry| entry.refcount > 0);
        before - store.map.len()
    }

    /// Take the map lock and greedily collect a jointly valid batch.
    ///
    /// When the pool holds fewer transactions than fit in one block, wait
    /// `context.max_wait` before sampling so a fuller batch can form. The
    /// wait happens before the lock so admission is never stalled by it.
    async fn lock_and_collect(
        &self,
        state: &ChainState,
        context: &DevvContext,
    ) -> (Vec<Transaction>, Summary, ChainState) {
        let below_batch = self.txs.lock().map.len() < self.max_tx_per_block;
        if below_batch && !context.max_wait().is_zero() {
            tracing::debug!("low incoming transaction volume: waiting for the pool to fill");
            tokio::time::sleep(context.max_wait()).await;
        }
        let mut store = self.txs.lock();
        collect_valid_transactions(&mut store, state, self.max_tx_per_block)
    }
}

/// Greedy collection in map order (deterministic across peers).
///
/// A transaction invalid against the running batch state is removed from
/// the pool. If the batch already holds valid transactions, collection
/// stops and proposes what it has; otherwise the pool is cleaned to a
/// fixed point and collection restarts from scratch.
fn collect_valid_transactions(
    store: &mut TxStore,
    state: &ChainState,
    max_tx_per_block: usize,
) -> (Vec<Transaction>, Summary, ChainState) {
    'restart: loop {
        let mut selected = Vec::new();
        let mut post_sum = Summary::new();
        let mut post_state = state.clone();
        let sigs: Vec<Signature> = store.map.keys().copied().collect();
        for sig in sigs {
            let Some(entry) = store.map.get(&sig) else {
                continue;
            };
            // Entries are sound on admission; validity here is the running
            // aggregate balance check.
            let transfers = entry.tx.transfers();
            if post_state.can_apply_transfers(&transfers) {
                let tx = entry.tx.clone();
                let _ = post_state.apply_transfers(&transfers);
                for transfer in &transfers {
                    post_sum.add_transfer(transfer);
                }
                if let Some(entry) = store.map.get_mut(&sig) {
                    entry.refcount = entry.refcount.saturating_add(1);
                }
                selected.push(tx);
                if selected.len() >= max_tx_per_block {
                    break;
                }
            } else {
                tracing::info!("collect_valid_transactions: invalid transaction in pool");
                store.map.remove(&sig);
                if !selected.is_empty() {
                    break;
                }
                while !remove_invalid_transactions(store, state) {}
                continue 'restart;
            }
        }
        return (selected, post_sum, post_state);
    }
}

/// Remove the first transaction invalid against a fresh running state.
/// Returns true once a full pass finds nothing to remove.
fn remove_invalid_transactions(store: &mut TxStore, state: &ChainState) -> bool {
    let mut run_state = state.clone();
    let sigs: Vec<Signature> = store.map.keys().copied().collect();
    for sig in sigs {
        let Some(entry) = store.map.get(&sig) else {
            continue;
        };
        let transfers = entry.tx.transfers();
        if run_state.can_apply_transfers(&transfers) {
            let _ = run_state.apply_transfers(&transfers);
        } else {
            store.map.remove(&sig);
            return false;
        }
    }
    true
}

/// Walk a proposal's transactions against `prior`; the resulting state if
/// they are still jointly valid.
fn revalidated_state(proposal: &ProposedBlock, prior: &ChainState) -> Option<ChainState> {
    let mut state = prior.clone();
    for tx in proposal.transactions() {
        let transfers = tx.transfers();
        if !state.can_apply_transfers(&transfers) {
            return None;
        }
        let _ = state.apply_transfers(&transfers);
    }
    Some(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppMode;
    use crate::crypto;
    use crate::transaction::Transfer;
    use crate::types::{Operation, ZERO_HASH};
    use k256::ecdsa::SigningKey;
    use std::time::Duration;

    fn test_context() -> DevvContext {
        DevvContext::new(0, 3, AppMode::T2, "shard-test", Duration::from_millis(0))
    }

    fn test_keyring() -> KeyRing {
        let key = crypto::generate_key();
        let addr = crypto::address_of(&key);
        KeyRing::new(key, vec![addr])
    }

    fn payment(key: &SigningKey, coin: u64, amount: i64, nonce: u64) -> Transaction {
        let from = crypto::address_of(key);
        let to = crypto::address_of(&crypto::generate_key());
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

    fn funded_state(key: &SigningKey, coin: u64, amount: i64) -> ChainState {
        let mut state = ChainState::new();
        state.set_balance(crypto::address_of(key), coin, amount);
        state
    }

    #[test]
    fn admission_and_dedup() {
        let pool = UnrecordedTransactionPool::new(100);
        let key = crypto::generate_key();
        let tx = payment(&key, 0, 10, 1);

        assert!(pool.add_transactions(tx.canonical()));
        assert_eq!(pool.num_pending_transactions(), 1);
        assert_eq!(pool.cumulative_transactions(), 1);

        // The duplicate increments the refcount instead of re-inserting.
        assert!(pool.add_transactions(tx.canonical()));
        assert_eq!(pool.num_pending_transactions(), 1);
        assert_eq!(pool.cumulative_transactions(), 1);
    }

    #[test]
    fn unsound_transaction_rejected_others_kept() {
        let pool = UnrecordedTransactionPool::new(100);
        let key = crypto::generate_key();
        let good = payment(&key, 0, 10, 1);

        // Deltas sum to +1 on coin 0: unsound.
        let from = crypto::address_of(&key);
        let bad = Transaction::build(
            Operation::Create,
            &[Transfer {
                address: from,
                coin: 0,
                delta: 1,
                nonce_index: 0,
            }],
            &[0u8; 16],
            &key,
        )
        .unwrap();

        let mut serial = bad.canonical().to_vec();
        serial.extend_from_slice(good.canonical());
        assert!(!pool.add_transactions(&serial));
        // The sound transaction was still admitted.
        assert_eq!(pool.num_pending_transactions(), 1);
    }

    #[test]
    fn canonical_dump_is_signature_ordered() {
        let pool = UnrecordedTransactionPool::new(100);
        let key = crypto::generate_key();
        let a = payment(&key, 0, 1, 1);
        let b = payment(&key, 0, 2, 2);
        let mut serial = a.canonical().to_vec();
        serial.extend_from_slice(b.canonical());
        assert!(pool.add_transactions(&serial));

        let mut expected = [a, b];
        expected.sort_by_key(|tx| tx.signature());
        let mut want = expected[0].canonical().to_vec();
        want.extend_from_slice(expected[1].canonical());
        assert_eq!(pool.get_canonical(), want);

        let json: serde_json::Value = serde_json::from_str(&pool.get_json()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[test]
    fn strict_admission_rejects_invalid() {
        let pool = UnrecordedTransactionPool::new(100);
        let key = crypto::generate_key();
        let mut state = funded_state(&key, 0, 5);
        let mut summary = Summary::new();

        // Spends 10 from a balance of 5.
        let overdraft = payment(&key, 0, 10, 1);
        assert!(!pool.add_and_verify_transactions(
            vec![overdraft],
            &mut state,
            &mut summary
        ));
        assert_eq!(pool.num_pending_transactions(), 0);

        let ok = payment(&key, 0, 5, 2);
        assert!(pool.add_and_verify_transactions(vec![ok], &mut state, &mut summary));
        assert_eq!(pool.num_pending_transactions(), 1);
        assert_eq!(state.balance(&crypto::address_of(&key), 0), 0);
    }

    #[tokio::test]
    async fn propose_collects_valid_batch() {
        let pool = UnrecordedTransactionPool::new(100);
        let keys = test_keyring();
        let context = test_context();
        let key = crypto::generate_key();
        let state = funded_state(&key, 0, 100);

        for nonce in 1..=5 {
            assert!(pool.add_transactions(payment(&key, 0, 10, nonce).canonical()));
        }
        assert!(pool.propose_block(ZERO_HASH, &state, &keys, &context).await);
        assert!(pool.has_proposal());
        assert_eq!(pool.proposal_num_transactions(), Some(5));
        // Proposer's own signature is already in the validation set.
        assert_eq!(pool.proposal_validation_count(), 1);
    }

    #[tokio::test]
    async fn collection_drops_overdrafting_tail() {
        let pool = UnrecordedTransactionPool::new(100);
        let keys = test_keyring();
        let context = test_context();
        let key = crypto::generate_key();
        // Funds cover only 6 of the 8 spends of 10.
        let state = funded_state(&key, 0, 60);

        for nonce in 1..=8 {
            assert!(pool.add_transactions(payment(&key, 0, 10, nonce).canonical()));
        }
        assert!(pool.propose_block(ZERO_HASH, &state, &keys, &context).await);
        assert_eq!(pool.proposal_num_transactions(), Some(6));
        // Collection runs until the first invalid entry; exactly one is
        // removed before the batch is proposed.
        assert_eq!(pool.num_pending_transactions(), 7);
    }

    #[tokio::test]
    async fn empty_pool_proposes_empty_block() {
        let pool = UnrecordedTransactionPool::new(10);
        let keys = test_keyring();
        let context = test_context();
        assert!(
            pool.propose_block(ZERO_HASH, &ChainState::new(), &keys, &context)
                .await
        );
        assert_eq!(pool.proposal_num_transactions(), Some(0));
    }

    #[tokio::test]
    async fn batch_capped_at_max_tx_per_block() {
        let pool = UnrecordedTransactionPool::new(3);
        let keys = test_keyring();
        let context = test_context();
        let key = crypto::generate_key();
        let state = funded_state(&key, 0, 1000);

        for nonce in 1..=5 {
            assert!(pool.add_transactions(payment(&key, 0, 1, nonce).canonical()));
        }
        assert!(pool.propose_block(ZERO_HASH, &state, &keys, &context).await);
        assert_eq!(pool.proposal_num_transactions(), Some(3));
    }

    #[tokio::test]
    async fn validation_check_and_finalize() {
        let pool = UnrecordedTransactionPool::new(100);
        let node_key = crypto::generate_key();
        let peer_key = crypto::generate_key();
        let keys = KeyRing::new(
            node_key.clone(),
            vec![crypto::address_of(&node_key), crypto::address_of(&peer_key)],
        );
        let context = test_context();
        let wallet = crypto::generate_key();
        let state = funded_state(&wallet, 0, 50);

        assert!(pool.add_transactions(payment(&wallet, 0, 20, 1).canonical()));
        assert!(pool.propose_block(ZERO_HASH, &state, &keys, &context).await);

        // Endorse from the peer.
        let proposal_bytes = pool.get_proposal().unwrap();
        let mut buffer = InputBuffer::new(&proposal_bytes);
        let proposal = ProposedBlock::decode(&mut buffer, &state).unwrap();
        let sig = crypto::sign_bytes(&peer_key, &proposal.signing_bytes());
        let entry = validation::encode_entry(&crypto::address_of(&peer_key), &sig);
        assert!(pool.check_validation(&entry, &keys));
        assert_eq!(pool.proposal_validation_count(), 2);

        // A signature over different bytes is refused.
        let bogus = crypto::sign_bytes(&peer_key, b"some other proposal");
        let entry = validation::encode_entry(&crypto::address_of(&peer_key), &bogus);
        assert!(!pool.check_validation(&entry, &keys));

        // An unknown signer is refused even with a valid signature.
        let stranger = crypto::generate_key();
        let sig = crypto::sign_bytes(&stranger, &proposal.signing_bytes());
        let entry = validation::encode_entry(&crypto::address_of(&stranger), &sig);
        assert!(!pool.check_validation(&entry, &keys));

        let block = pool.finalize_local_block().unwrap();
        assert_eq!(block.num_transactions(), 1);
        assert!(!pool.has_proposal());
        assert!(!pool.has_pending_transactions());
        assert!(pool.finalize_local_block().is_err());
    }

    #[tokio::test]
    async fn reverify_keeps_compatible_proposal() {
        let pool = UnrecordedTransactionPool::new(100);
        let keys = test_keyring();
        let context = test_context();
        let wallet = crypto::generate_key();
        let state = funded_state(&wallet, 0, 100);

        assert!(pool.add_transactions(payment(&wallet, 0, 30, 1).canonical()));
        assert!(pool.propose_block(ZERO_HASH, &state, &keys, &context).await);

        let new_tip = [4u8; 32];
        assert!(pool.reverify_proposal(new_tip, &state, &keys, &context).await);
        assert_eq!(pool.proposal_prev_hash(), Some(new_tip));
        // Re-based proposal is re-signed by the proposer alone.
        assert_eq!(pool.proposal_validation_count(), 1);
    }

    #[tokio::test]
    async fn reverify_rebuilds_invalidated_proposal() {
        let pool = UnrecordedTransactionPool::new(100);
        let keys = test_keyring();
        let context = test_context();
        let wallet = crypto::generate_key();
        let state = funded_state(&wallet, 0, 100);

        assert!(pool.add_transactions(payment(&wallet, 0, 30, 1).canonical()));
        assert!(pool.propose_block(ZERO_HASH, &state, &keys, &context).await);
        assert_eq!(pool.proposal_num_transactions(), Some(1));

        // The new tip drained the wallet; the held proposal overdrafts.
        let drained = ChainState::new();
        let new_tip = [9u8; 32];
        assert!(!pool.reverify_proposal(new_tip, &drained, &keys, &context).await);
        // A fresh (empty) proposal was built on the new tip.
        assert!(pool.has_proposal());
        assert_eq!(pool.proposal_prev_hash(), Some(new_tip));
        assert_eq!(pool.proposal_num_transactions(), Some(0));
    }

    #[test]
    fn garbage_collect_spares_referenced_entries() {
        let pool = UnrecordedTransactionPool::new(100);
        let key = crypto::generate_key();
        assert!(pool.add_transactions(payment(&key, 0, 1, 1).canonical()));
        // Admitted entries start at refcount 1 and are never collectable.
        assert_eq!(pool.garbage_collect(), 0);
        assert_eq!(pool.num_pending_transactions(), 1);
    }
}
