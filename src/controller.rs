//! Controllers: fan inbound messages into the right handler family and own
//! the single outbound seat to the messaging fabric.
//!
//! Consensus traffic and inter-shard traffic are serialized independently,
//! each behind its own mutex, so catch-up never blocks a consensus round
//! for longer than one message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::blockchain::Blockchain;
use crate::context::DevvContext;
use crate::error::{DevvError, DevvResult};
use crate::handlers;
use crate::keyring::KeyRing;
use crate::message::{DevvMessage, MessageCallback, MessageType};
use crate::utx_pool::UnrecordedTransactionPool;

/// Serializes FINAL_BLOCK / PROPOSAL_BLOCK / VALID processing.
pub struct ConsensusController {
    keys: Arc<KeyRing>,
    context: Arc<DevvContext>,
    final_chain: Arc<Blockchain>,
    utx_pool: Arc<UnrecordedTransactionPool>,
    outgoing: MessageCallback,
    serial: tokio::sync::Mutex<()>,
}

impl ConsensusController {
    pub fn new(
        keys: Arc<KeyRing>,
        context: Arc<DevvContext>,
        final_chain: Arc<Blockchain>,
        utx_pool: Arc<UnrecordedTransactionPool>,
        outgoing: MessageCallback,
    ) -> Self {
        Self {
            keys,
            context,
            final_chain,
            utx_pool,
            outgoing,
            serial: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn consensus_callback(&self, msg: DevvMessage) -> DevvResult<()> {
        let _guard = self.serial.lock().await;
        match msg.message_type {
            MessageType::FinalBlock => {
                tracing::debug!("consensus_callback(): FINAL_BLOCK [{}]", msg.index);
                handlers::handle_final_block(
                    &msg,
                    &self.context,
                    &self.keys,
                    &self.final_chain,
                    &self.utx_pool,
                    &self.outgoing,
                )
                .await
                .map(|_| ())
            }
            MessageType::ProposalBlock => {
                tracing::debug!("consensus_callback(): PROPOSAL_BLOCK [{}]", msg.index);
                handlers::handle_proposal_block(
                    &msg,
                    &self.context,
                    &self.keys,
                    &self.final_chain,
                    &self.outgoing,
                )
                .await
                .map(|_| ())
            }
            MessageType::Valid => {
                tracing::debug!("consensus_callback(): VALIDATION [{}]", msg.index);
                handlers::handle_validation(
                    &msg,
                    &self.context,
                    &self.keys,
                    &self.final_chain,
                    &self.utx_pool,
                    &self.outgoing,
                )
                .map(|_| ())
            }
            // The fan-in must never route anything else here; if it does,
            // the node is misbehaving and must not keep producing blocks.
            other => Err(DevvError::Fatal(format!(
                "unexpected consensus message type {other:?}"
            ))),
        }
    }
}

/// Serializes catch-up traffic and tracks how far remote shards have seen
/// our chain.
pub struct InternetworkController {
    context: Arc<DevvContext>,
    final_chain: Arc<Blockchain>,
    utx_pool: Arc<UnrecordedTransactionPool>,
    outgoing: MessageCallback,
    remote_blocks: AtomicU64,
    serial: tokio::sync::Mutex<()>,
}

impl InternetworkController {
    pub fn new(
        context: Arc<DevvContext>,
        final_chain: Arc<Blockchain>,
        utx_pool: Arc<UnrecordedTransactionPool>,
        outgoing: MessageCallback,
    ) -> Self {
        Self {
            context,
            final_chain,
            utx_pool,
            outgoing,
            remote_blocks: AtomicU64::new(0),
            serial: tokio::sync::Mutex::new(()),
        }
    }

    pub fn remote_blocks(&self) -> u64 {
        self.remote_blocks.load(Ordering::Acquire)
    }

    pub fn set_remote_blocks(&self, value: u64) {
        self.remote_blocks.store(value, Ordering::Release);
    }

    pub async fn message_callback(&self, msg: DevvMessage) -> DevvResult<()> {
        let _guard = self.serial.lock().await;
        match msg.message_type {
            MessageType::RequestBlock => {
                tracing::debug!("message_callback(): REQUEST_BLOCK [{}]", msg.index);
                handlers::handle_request_block(
                    &msg,
                    &self.context,
                    &self.final_chain,
                    &self.remote_blocks,
                    &self.outgoing,
                )
                .map(|_| ())
            }
            MessageType::GetBlocksSince => {
                tracing::debug!("message_callback(): GET_BLOCKS_SINCE [{}]", msg.index);
                handlers::handle_blocks_since_request(
                    &msg,
                    &self.context,
                    &self.final_chain,
                    &self.outgoing,
                )
                .map(|_| ())
            }
            MessageType::BlocksSince => {
                tracing::debug!("message_callback(): BLOCKS_SINCE [{}]", msg.index);
                handlers::handle_blocks_since(
                    &msg,
                    &self.final_chain,
                    &self.utx_pool,
                    &self.remote_blocks,
                )
                .map(|_| ())
            }
            other => {
                // Unlike the consensus path, stray traffic here is ignored.
                tracing::warn!("message_callback(): unexpected message type {other:?}, ignored");
                Ok(())
            }
        }
    }
}

/// The node-level fan-in: classifies inbound messages, owns the shared
/// state, and holds the only send seat to the fabric.
pub struct DevvController {
    keys: Arc<KeyRing>,
    context: Arc<DevvContext>,
    final_chain: Arc<Blockchain>,
    utx_pool: Arc<UnrecordedTransactionPool>,
    consensus: ConsensusController,
    internetwork: InternetworkController,
    outgoing: MessageCallback,
}

impl DevvController {
    pub fn new(
        keys: Arc<KeyRing>,
        context: Arc<DevvContext>,
        final_chain: Arc<Blockchain>,
        utx_pool: Arc<UnrecordedTransactionPool>,
        outgoing: MessageCallback,
    ) -> Self {
        let consensus = ConsensusController::new(
            keys.clone(),
            context.clone(),
            final_chain.clone(),
            utx_pool.clone(),
            outgoing.clone(),
        );
        let internetwork = InternetworkController::new(
            context.clone(),
            final_chain.clone(),
            utx_pool.clone(),
            outgoing.clone(),
        );
        Self {
            keys,
            context,
            final_chain,
            utx_pool,
            consensus,
            internetwork,
            outgoing,
        }
    }

    /// Route one inbound message to its handler family.
    pub async fn dispatch(&self, msg: DevvMessage) -> DevvResult<()> {
        match msg.message_type {
            MessageType::FinalBlock | MessageType::ProposalBlock | MessageType::Valid => {
                self.consensus.consensus_callback(msg).await
            }
            MessageType::TransactionAnnouncement => handlers::handle_transaction_announcement(
                &msg,
                &self.context,
                &self.keys,
                &self.final_chain,
                &self.utx_pool,
                &self.outgoing,
            )
            .await
            .map(|_| ()),
            MessageType::RequestBlock
            | MessageType::GetBlocksSince
            | MessageType::BlocksSince => self.internetwork.message_callback(msg).await,
        }
    }

    /// Propose on the current tip and announce it; used to bootstrap the
    /// first round when this node starts as the proposer.
    pub async fn start_proposal_round(&self) -> DevvResult<()> {
        let height = self.final_chain.size();
        if !self.context.is_proposer(height) {
            return Ok(());
        }
        if !self.utx_pool.has_pending_transactions() {
            tracing::debug!("start_proposal_round(): pool is empty, waiting for announcements");
            return Ok(());
        }
        let canonical = handlers::create_next_proposal(
            &self.keys,
            &self.final_chain,
            &self.utx_pool,
            &self.context,
        )
        .await?;
        (self.outgoing)(DevvMessage::new(
            self.context.shard_uri(),
            MessageType::ProposalBlock,
            canonical,
            0,
        ));
        Ok(())
    }

    pub fn final_chain(&self) -> &Arc<Blockchain> {
        &self.final_chain
    }

    pub fn utx_pool(&self) -> &Arc<UnrecordedTransactionPool> {
        &self.utx_pool
    }

    pub fn context(&self) -> &Arc<DevvContext> {
        &self.context
    }

    pub fn internetwork(&self) -> &InternetworkController {
        &self.internetwork
    }
}
