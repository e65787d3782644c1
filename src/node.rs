//! One shard validator node: shared state, worker tasks and lifecycle.
//!
//! Two long-lived workers mirror the transport split: an outbound worker
//! drains the send queue into the fabric's publish seat, and an inbound
//! worker dispatches received messages into the controller. A third task
//! emits the timer-driven REQUEST_BLOCK self-trigger. All workers exit
//! within one poll of the keep-running token flipping.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::blockchain::Blockchain;
use crate::chain_state::ChainState;
use crate::context::DevvContext;
use crate::controller::DevvController;
use crate::error::{DevvError, DevvResult};
use crate::keyring::KeyRing;
use crate::message::{DevvMessage, MessageCallback, MessageType};
use crate::shutdown::ShutdownManager;
use crate::utx_pool::UnrecordedTransactionPool;

pub struct DevvNode {
    controller: Arc<DevvController>,
    context: Arc<DevvContext>,
    keep_running: CancellationToken,
    incoming_tx: mpsc::UnboundedSender<DevvMessage>,
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<DevvMessage>>>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<DevvMessage>>>,
    publish: MessageCallback,
    request_interval: Duration,
}

impl DevvNode {
    /// Wire up a node. `publish` is the fabric's send seat; incoming fabric
    /// messages are pushed through the sender from [`incoming_sender`].
    ///
    /// [`incoming_sender`]: DevvNode::incoming_sender
    pub fn new(
        context: Arc<DevvContext>,
        keys: Arc<KeyRing>,
        genesis_state: ChainState,
        max_tx_per_block: usize,
        request_interval: Duration,
        publish: MessageCallback,
    ) -> Self {
        let final_chain = Arc::new(Blockchain::new(context.shard_uri(), genesis_state));
        let utx_pool = Arc::new(UnrecordedTransactionPool::new(max_tx_per_block));

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let outgoing: MessageCallback = Arc::new(move |msg: DevvMessage| {
            if outgoing_tx.send(msg).is_err() {
                tracing::warn!("outbound queue closed, dropping message");
            }
        });

        let controller = Arc::new(DevvController::new(
            keys,
            context.clone(),
            final_chain,
            utx_pool,
            outgoing,
        ));
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        Self {
            controller,
            context,
            keep_running: CancellationToken::new(),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            publish,
            request_interval,
        }
    }

    /// The seat the fabric delivers received messages into.
    pub fn incoming_sender(&self) -> mpsc::UnboundedSender<DevvMessage> {
        self.incoming_tx.clone()
    }

    pub fn controller(&self) -> &Arc<DevvController> {
        &self.controller
    }

    pub fn token(&self) -> CancellationToken {
        self.keep_running.clone()
    }

    /// Begin stopping threads and shutting down.
    pub fn start_shutdown(&self) {
        self.keep_running.cancel();
    }

    /// Spawn the worker tasks; callable once.
    pub fn start(&self) -> DevvResult<ShutdownManager> {
        let outgoing_rx = self
            .outgoing_rx
            .lock()
            .take()
            .ok_or_else(|| DevvError::Fatal("node already started".into()))?;
        let incoming_rx = self
            .incoming_rx
            .lock()
            .take()
            .ok_or_else(|| DevvError::Fatal("node already started".into()))?;

        let mut manager = ShutdownManager::with_token(self.keep_running.clone());

        manager.register_task(tokio::spawn(run_outbound(
            outgoing_rx,
            self.publish.clone(),
            self.keep_running.clone(),
        )));
        manager.register_task(tokio::spawn(run_inbound(
            incoming_rx,
            self.controller.clone(),
            self.keep_running.clone(),
        )));
        manager.register_task(tokio::spawn(run_request_timer(
            self.incoming_tx.clone(),
            self.context.clone(),
            self.request_interval,
            self.keep_running.clone(),
        )));

        tracing::info!(
            "node {} started on shard {} ({} peers)",
            self.context.current_node(),
            self.context.shard_uri(),
            self.context.peer_count()
        );
        Ok(manager)
    }
}

/// Drain the outbound queue into the fabric.
async fn run_outbound(
    mut queue: mpsc::UnboundedReceiver<DevvMessage>,
    publish: MessageCallback,
    keep_running: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = keep_running.cancelled() => break,
            msg = queue.recv() => match msg {
                Some(msg) => {
                    tracing::debug!(
                        "sending message: [{}, {:?}, {}]",
                        msg.index,
                        msg.message_type,
                        msg.uri
                    );
                    publish(msg);
                }
                None => break,
            }
        }
    }
    tracing::info!("outbound worker stopped");
}

/// Dispatch inbound messages; on cancellation, drain what is already queued
/// before exiting so shutdown never drops accepted work.
async fn run_inbound(
    mut queue: mpsc::UnboundedReceiver<DevvMessage>,
    controller: Arc<DevvController>,
    keep_running: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = keep_running.cancelled() => {
                while let Ok(msg) = queue.try_recv() {
                    if process(&controller, msg, &keep_running).await.is_err() {
                        break;
                    }
                }
                break;
            }
            msg = queue.recv() => match msg {
                Some(msg) => {
                    if process(&controller, msg, &keep_running).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
    tracing::info!("inbound worker stopped");
}

async fn process(
    controller: &DevvController,
    msg: DevvMessage,
    keep_running: &CancellationToken,
) -> Result<(), ()> {
    match controller.dispatch(msg).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_recoverable() => {
            tracing::warn!("dropping message: {err}");
            Ok(())
        }
        Err(err) => {
            // The chain may have diverged; producing more blocks risks a fork.
            tracing::error!("fatal error in message handler, aborting node: {err}");
            keep_running.cancel();
            Err(())
        }
    }
}

/// Periodic REQUEST_BLOCK self-trigger for inter-shard catch-up.
async fn run_request_timer(
    incoming: mpsc::UnboundedSender<DevvMessage>,
    context: Arc<DevvContext>,
    interval: Duration,
    keep_running: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = keep_running.cancelled() => break,
            _ = ticker.tick() => {
                let trigger = DevvMessage::new(
                    context.own_uri(),
                    MessageType::RequestBlock,
                    Vec::new(),
                    0,
                );
                if incoming.send(trigger).is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!("request-block timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppMode;
    use crate::crypto;

    fn test_node() -> DevvNode {
        let key = crypto::generate_key();
        let addr = crypto::address_of(&key);
        let keys = Arc::new(KeyRing::new(key, vec![addr]));
        let context = Arc::new(DevvContext::new(
            0,
            1,
            AppMode::T2,
            "shard-node-test",
            Duration::from_millis(0),
        ));
        let publish: MessageCallback = Arc::new(|_msg| {});
        DevvNode::new(
            context,
            keys,
            ChainState::new(),
            100,
            Duration::from_secs(60),
            publish,
        )
    }

    #[tokio::test]
    async fn start_is_single_shot() {
        let node = test_node();
        let manager = node.start().unwrap();
        assert!(node.start().is_err());
        node.start_shutdown();
        manager.shutdown_now().await;
    }

    #[tokio::test]
    async fn workers_exit_on_cancel() {
        let node = test_node();
        let manager = node.start().unwrap();
        let sender = node.incoming_sender();
        node.start_shutdown();
        manager.shutdown_now().await;
        // After shutdown the inbound queue is gone.
        assert!(sender
            .send(DevvMessage::new(
                "devv/x",
                MessageType::RequestBlock,
                Vec::new(),
                0
            ))
            .is_err());
    }
}
