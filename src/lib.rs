//! devvd — a two-tier sharded validator node.
//!
//! Each shard is a small static set of peers producing one chain of final
//! blocks through a round-robin proposer protocol: a proposer batches
//! pooled transactions into a proposal, peers endorse it, and at threshold
//! it becomes a final block. Sibling shards exchange finished blocks
//! through the REQUEST_BLOCK / GET_BLOCKS_SINCE / BLOCKS_SINCE catch-up
//! protocol. Transport, persistence and key provisioning live behind
//! small seams; everything else is here.

pub mod block;
pub mod blockchain;
pub mod buffer;
pub mod chain_state;
pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod keyring;
pub mod message;
pub mod node;
pub mod shutdown;
pub mod summary;
pub mod transaction;
pub mod types;
pub mod utx_pool;
pub mod validation;

pub use block::{FinalBlock, ProposedBlock};
pub use blockchain::Blockchain;
pub use chain_state::ChainState;
pub use context::{AppMode, DevvContext};
pub use controller::DevvController;
pub use error::{DevvError, DevvResult};
pub use keyring::KeyRing;
pub use message::{DevvMessage, MessageCallback, MessageType};
pub use node::DevvNode;
pub use summary::Summary;
pub use transaction::{Transaction, Transfer};
pub use types::{Address, Hash256, Operation, Signature};
pub use utx_pool::UnrecordedTransactionPool;
pub use validation::Validation;
