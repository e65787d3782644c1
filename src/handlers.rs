//! Message handlers driving intra-shard consensus and inter-shard catch-up.
//!
//! Handlers are free functions taking the node's shared state plus an emit
//! seat for outbound messages; the controllers plumb them together. A
//! recoverable error returned here means "log and drop the message" —
//! anything else aborts the node.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::{FinalBlock, ProposedBlock};
use crate::blockchain::Blockchain;
use crate::buffer::InputBuffer;
use crate::context::{AppMode, DevvContext};
use crate::crypto;
use crate::error::{DevvError, DevvResult};
use crate::keyring::KeyRing;
use crate::message::{DevvMessage, MessageCallback, MessageType};
use crate::utx_pool::UnrecordedTransactionPool;
use crate::validation;

/// Build a proposal on the current tip and return its canonical bytes.
pub async fn create_next_proposal(
    keys: &KeyRing,
    final_chain: &Blockchain,
    utx_pool: &UnrecordedTransactionPool,
    context: &DevvContext,
) -> DevvResult<Vec<u8>> {
    let height = final_chain.size();
    tracing::info!(
        "create_next_proposal(): proposing block at height {height} with {} pooled transactions",
        utx_pool.num_pending_transactions()
    );
    utx_pool
        .propose_block(
            final_chain.tip_hash(),
            &final_chain.tip_state(),
            keys,
            context,
        )
        .await;
    utx_pool
        .get_proposal()
        .ok_or_else(|| DevvError::ConsistencyFailure("proposal vanished before emission".into()))
}

/// FINAL_BLOCK: append a remotely finalized block, then either take our
/// turn as proposer or trigger inter-shard catch-up.
pub async fn handle_final_block(
    msg: &DevvMessage,
    context: &DevvContext,
    keys: &KeyRing,
    final_chain: &Blockchain,
    utx_pool: &UnrecordedTransactionPool,
    emit: &MessageCallback,
) -> DevvResult<bool> {
    let prior = final_chain.tip_state();
    let mut buffer = InputBuffer::new(&msg.data);
    let block = FinalBlock::decode(&mut buffer, &prior).map_err(|err| match err {
        DevvError::Overdraft { .. } => {
            DevvError::ConsistencyFailure("final block summary overdrafts our tip state".into())
        }
        other => other,
    })?;

    if block.prev_hash() != final_chain.tip_hash() {
        // Duplicate or out-of-order block; catch-up fills real gaps.
        return Err(DevvError::ConsistencyFailure(
            "final block does not extend our tip".into(),
        ));
    }
    verify_block_validation(&block, final_chain.size(), context, keys)?;

    let appended = final_chain.push_back(block)?;
    utx_pool.remove_block_transactions(&appended);

    let height = final_chain.size();
    let tip_hash = final_chain.tip_hash();
    let tip_state = final_chain.tip_state();
    if utx_pool.has_proposal() {
        // Re-base the held proposal onto the new tip; a fresh proposal is
        // built in place if the batch no longer validates.
        utx_pool
            .reverify_proposal(tip_hash, &tip_state, keys, context)
            .await;
    }
    if context.is_proposer(height) {
        if !utx_pool.has_proposal() {
            if !utx_pool.has_pending_transactions() {
                tracing::debug!("our proposer turn at height {height}, nothing to propose yet");
                return Ok(true);
            }
            utx_pool
                .propose_block(tip_hash, &tip_state, keys, context)
                .await;
        }
        if let Some(canonical) = utx_pool.get_proposal() {
            emit(DevvMessage::new(
                context.shard_uri(),
                MessageType::ProposalBlock,
                canonical,
                0,
            ));
        }
    } else {
        emit(DevvMessage::new(
            context.own_uri(),
            MessageType::RequestBlock,
            Vec::new(),
            0,
        ));
    }
    Ok(true)
}

/// PROPOSAL_BLOCK: validate the proposer's block against our tip and, if it
/// holds up, endorse it on the shard topic.
pub async fn handle_proposal_block(
    msg: &DevvMessage,
    context: &DevvContext,
    keys: &KeyRing,
    final_chain: &Blockchain,
    emit: &MessageCallback,
) -> DevvResult<bool> {
    let prior = final_chain.tip_state();
    let mut buffer = InputBuffer::new(&msg.data);
    // Decoding re-executes the summary against our tip state; an overdraft
    // there is the proposer's fault, not a chain inconsistency.
    let proposal = ProposedBlock::decode(&mut buffer, &prior).map_err(|err| match err {
        DevvError::Overdraft { .. } => {
            DevvError::VerificationFailed("proposal summary overdrafts".into())
        }
        other => other,
    })?;

    if proposal.prev_hash() != final_chain.tip_hash() {
        return Err(DevvError::ConsistencyFailure(
            "proposal not built on our tip".into(),
        ));
    }

    let height = final_chain.size();
    let proposer_addr = proposer_address(height, context, keys)?;
    let proposer_sig = proposal.validation().get(&proposer_addr).ok_or_else(|| {
        DevvError::VerificationFailed("proposal missing proposer signature".into())
    })?;
    if !proposal.check_endorsement(&proposer_addr, &proposer_sig) {
        return Err(DevvError::VerificationFailed(
            "proposer signature does not verify".into(),
        ));
    }
    if !proposal.verify_summary() {
        return Err(DevvError::VerificationFailed(
            "summary disagrees with the proposal's transactions".into(),
        ));
    }
    if !proposal.transactions().iter().all(|tx| tx.is_sound()) {
        return Err(DevvError::VerificationFailed(
            "unsound transaction in proposal".into(),
        ));
    }

    if proposer_addr == keys.node_addr() {
        // Our own proposal echoed back; our signature already endorses it.
        return Ok(true);
    }

    let sig = crypto::sign_bytes(keys.node_key(), &proposal.signing_bytes());
    let payload = validation::encode_entry(&keys.node_addr(), &sig);
    tracing::debug!("endorsing proposal at height {height}");
    emit(DevvMessage::new(
        context.shard_uri(),
        MessageType::Valid,
        payload,
        0,
    ));
    Ok(true)
}

/// VALID: fold a peer endorsement into our pending proposal; at threshold,
/// finalize it, append it, and announce the final block.
pub fn handle_validation(
    msg: &DevvMessage,
    context: &DevvContext,
    keys: &KeyRing,
    final_chain: &Blockchain,
    utx_pool: &UnrecordedTransactionPool,
    emit: &MessageCallback,
) -> DevvResult<bool> {
    if !utx_pool.check_validation(&msg.data, keys) {
        tracing::debug!("validation did not match our pending proposal, dropped");
        return Ok(false);
    }
    if utx_pool.proposal_validation_count() < validation::threshold(context.peer_count()) {
        return Ok(true);
    }

    let block = utx_pool.finalize_local_block()?;
    let canonical = block.encode();
    final_chain.push_back(block)?;
    tracing::info!("block finalized locally at height {}", final_chain.size());
    emit(DevvMessage::new(
        context.shard_uri(),
        MessageType::FinalBlock,
        canonical,
        0,
    ));
    Ok(true)
}

/// TRANSACTION_ANNOUNCEMENT: admit transactions; when it is our turn to
/// propose and no proposal is pending, this is what starts the round.
pub async fn handle_transaction_announcement(
    msg: &DevvMessage,
    context: &DevvContext,
    keys: &KeyRing,
    final_chain: &Blockchain,
    utx_pool: &UnrecordedTransactionPool,
    emit: &MessageCallback,
) -> DevvResult<bool> {
    let all_good = utx_pool.add_transactions(&msg.data);
    if !all_good {
        tracing::warn!("transaction announcement contained rejected transactions");
    }

    let height = final_chain.size();
    if context.is_proposer(height)
        && !utx_pool.has_proposal()
        && utx_pool.has_pending_transactions()
    {
        let canonical = create_next_proposal(keys, final_chain, utx_pool, context).await?;
        emit(DevvMessage::new(
            context.shard_uri(),
            MessageType::ProposalBlock,
            canonical,
            0,
        ));
    }
    Ok(all_good)
}

/// REQUEST_BLOCK: timer-driven self-trigger; solicit remote blocks when our
/// chain has grown past what we last shared.
pub fn handle_request_block(
    _msg: &DevvMessage,
    context: &DevvContext,
    final_chain: &Blockchain,
    remote_blocks: &AtomicU64,
    emit: &MessageCallback,
) -> DevvResult<bool> {
    let remote = remote_blocks.load(Ordering::Acquire);
    if remote as usize >= final_chain.size() {
        tracing::trace!("chain has not grown past the last sync ({remote} remote)");
        return Ok(true);
    }

    // Ask for everything from our own height up; the reply must extend
    // our tip exactly for the batch to apply.
    let since = final_chain.size() as u64;
    let mut request = Vec::with_capacity(16);
    request.extend_from_slice(&since.to_le_bytes());
    request.extend_from_slice(&(context.current_node() as u64).to_le_bytes());

    match context.app_mode() {
        AppMode::T1 => {
            // Ask the matching peer in each tier-2 shard.
            let peer_count = context.peer_count();
            let shard_index = context.shard_index();
            for target in [peer_count + shard_index, 2 * peer_count + shard_index] {
                emit(DevvMessage::new(
                    context.uri_from_index(target),
                    MessageType::GetBlocksSince,
                    request.clone(),
                    0,
                ));
            }
        }
        AppMode::T2 => {
            // Ask the tier-1 node with our shard-local index.
            emit(DevvMessage::new(
                context.uri_from_index(context.shard_index()),
                MessageType::GetBlocksSince,
                request,
                0,
            ));
        }
    }
    Ok(true)
}

/// GET_BLOCKS_SINCE: serve our chain from the requested height, tip excluded.
pub fn handle_blocks_since_request(
    msg: &DevvMessage,
    context: &DevvContext,
    final_chain: &Blockchain,
    emit: &MessageCallback,
) -> DevvResult<bool> {
    let mut buffer = InputBuffer::new(&msg.data);
    let since = buffer.next_u64()? as usize;
    let requester = buffer.next_u64()? as usize;

    let dump = final_chain.partial_binary_dump(since);
    tracing::debug!(
        "serving {} bytes of blocks since height {since} to node {requester}",
        dump.len()
    );
    emit(DevvMessage::new(
        context.uri_from_index(requester),
        MessageType::BlocksSince,
        dump,
        0,
    ));
    Ok(true)
}

/// BLOCKS_SINCE: apply a stream of remote final blocks atomically; any
/// parse or validation failure rejects the whole batch.
pub fn handle_blocks_since(
    msg: &DevvMessage,
    final_chain: &Blockchain,
    utx_pool: &UnrecordedTransactionPool,
    remote_blocks: &AtomicU64,
) -> DevvResult<bool> {
    let mut buffer = InputBuffer::new(&msg.data);
    let mut staged = Vec::new();
    let mut prior = final_chain.tip_state();
    let mut expected_prev = final_chain.tip_hash();
    while !buffer.at_end() {
        let block = FinalBlock::decode(&mut buffer, &prior)?;
        if block.prev_hash() != expected_prev {
            return Err(DevvError::ConsistencyFailure(
                "remote block stream does not extend our tip".into(),
            ));
        }
        expected_prev = block.hash();
        prior = block.chain_state().clone();
        staged.push(block);
    }

    let count = staged.len();
    for block in staged {
        utx_pool.remove_block_transactions(&block);
        final_chain.push_back(block)?;
    }
    remote_blocks.store(final_chain.size() as u64, Ordering::Release);
    if count > 0 {
        tracing::info!(
            "applied {count} remote blocks, chain now at height {}",
            final_chain.size()
        );
    }
    Ok(true)
}

/// Address of the round-robin proposer for `height`, resolved to a global
/// node index within this shard.
fn proposer_address(
    height: usize,
    context: &DevvContext,
    keys: &KeyRing,
) -> DevvResult<crate::types::Address> {
    let shard_base = context.current_node() - context.shard_index();
    let proposer_global = shard_base + context.proposer_for(height);
    keys.get_node_addr(proposer_global).ok_or_else(|| {
        DevvError::VerificationFailed(format!("no address for proposer node {proposer_global}"))
    })
}

/// Threshold check for an incoming final block: enough distinct peer
/// endorsements over the proposal's signing bytes, proposer included.
fn verify_block_validation(
    block: &FinalBlock,
    height: usize,
    context: &DevvContext,
    keys: &KeyRing,
) -> DevvResult<()> {
    let signing = block.proposal_signing_bytes();
    let proposer_addr = proposer_address(height, context, keys)?;

    let proposer_ok = block
        .validation()
        .get(&proposer_addr)
        .map(|sig| crypto::verify_bytes(&proposer_addr, &signing, &sig))
        .unwrap_or(false);
    if !proposer_ok {
        return Err(DevvError::VerificationFailed(
            "final block missing a valid proposer signature".into(),
        ));
    }

    let valid = block
        .validation()
        .iter()
        .filter(|(addr, sig)| keys.is_known_peer(addr) && crypto::verify_bytes(addr, &signing, sig))
        .count();
    let needed = validation::threshold(context.peer_count());
    if valid < needed {
        return Err(DevvError::VerificationFailed(format!(
            "validation threshold not met: {valid} of {needed}"
        )));
    }
    Ok(())
}
