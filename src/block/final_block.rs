//! A finalized block: a proposal that reached its endorsement threshold,
//! stamped with a block time and a merkle root over its transactions.
//!
//! Canonical layout:
//!
//! ```text
//! u8 version(=0) | u64 num_bytes | u64 block_time | 32B prev_hash |
//! 32B merkle_root | u64 tx_size | u64 sum_size | u32 val_count |
//! tx_bytes | summary_bytes | validation_bytes
//! ```
//!
//! `num_bytes` is the full canonical length, which is what lets a
//! BLOCKS_SINCE payload carry several blocks back to back.

use crate::block::proposed::{
    decode_tx_section, encode_tx_section, signing_bytes_from_parts, ProposedBlock,
};
use crate::buffer::InputBuffer;
use crate::chain_state::ChainState;
use crate::crypto;
use crate::error::{DevvError, DevvResult};
use crate::summary::Summary;
use crate::transaction::Transaction;
use crate::types::{Hash256, ZERO_HASH};
use crate::validation::{self, Validation};

pub const BLOCK_VERSION: u8 = 0;
const HEADER_SIZE: usize = 1 + 8 + 8 + 32 + 32 + 8 + 8 + 4;

#[derive(Clone, Debug)]
pub struct FinalBlock {
    version: u8,
    block_time: u64,
    prev_hash: Hash256,
    merkle_root: Hash256,
    transactions: Vec<Transaction>,
    summary: Summary,
    validation: Validation,
    chain_state_after: ChainState,
}

impl FinalBlock {
    /// Freeze a proposal that reached threshold into a final block.
    pub fn from_proposal(proposal: ProposedBlock) -> Self {
        let block_time = chrono::Utc::now().timestamp().max(0) as u64;
        let merkle_root = merkle_root(proposal.transactions());
        Self {
            version: BLOCK_VERSION,
            block_time,
            prev_hash: proposal.prev_hash(),
            merkle_root,
            chain_state_after: proposal.chain_state().clone(),
            summary: proposal.summary().clone(),
            validation: proposal.validation().clone(),
            transactions: proposal.transactions().to_vec(),
        }
    }

    /// Parse one final block off the cursor, consuming exactly `num_bytes`,
    /// and re-derive its resulting chain state from `prior`.
    pub fn decode(buffer: &mut InputBuffer<'_>, prior: &ChainState) -> DevvResult<Self> {
        if buffer.remaining() < HEADER_SIZE {
            return Err(DevvError::Deserialization(
                "serialized block too small".into(),
            ));
        }
        let start = buffer.offset();
        let version = buffer.next_byte()?;
        if version != BLOCK_VERSION {
            return Err(DevvError::Deserialization(format!(
                "invalid block version {version}"
            )));
        }
        let num_bytes = buffer.next_u64()? as usize;
        if num_bytes < HEADER_SIZE || num_bytes - 9 > buffer.remaining() {
            return Err(DevvError::Deserialization(format!(
                "block declares {num_bytes} bytes, {} remain",
                buffer.remaining() + 9
            )));
        }

        let block_time = buffer.next_u64()?;
        let mut prev_hash: Hash256 = [0u8; 32];
        buffer.copy_into(&mut prev_hash)?;
        let mut merkle: Hash256 = [0u8; 32];
        buffer.copy_into(&mut merkle)?;
        let tx_size = buffer.next_u64()? as usize;
        let sum_size = buffer.next_u64()? as usize;
        let val_count = buffer.next_u32()? as usize;

        let declared = HEADER_SIZE + tx_size + sum_size + val_count * validation::ENTRY_SIZE;
        if declared != num_bytes {
            return Err(DevvError::Deserialization(format!(
                "block sections sum to {declared}, header declares {num_bytes}"
            )));
        }

        let transactions = decode_tx_section(buffer, tx_size)?;
        let summary = Summary::decode(buffer, sum_size)?;
        let validation = Validation::decode(buffer, val_count)?;

        if buffer.offset() - start != num_bytes {
            return Err(DevvError::Deserialization(
                "block length not self-consistent".into(),
            ));
        }
        if merkle != merkle_root(&transactions) {
            return Err(DevvError::VerificationFailed("merkle root mismatch".into()));
        }

        let mut chain_state_after = prior.clone();
        chain_state_after.apply_summary(&summary)?;

        Ok(Self {
            version,
            block_time,
            prev_hash,
            merkle_root: merkle,
            transactions,
            summary,
            validation,
            chain_state_after,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let tx_bytes = encode_tx_section(&self.transactions);
        let sum_bytes = self.summary.encode();
        let val_bytes = self.validation.encode();
        let num_bytes = HEADER_SIZE + tx_bytes.len() + sum_bytes.len() + val_bytes.len();

        let mut out = Vec::with_capacity(num_bytes);
        out.push(self.version);
        out.extend_from_slice(&(num_bytes as u64).to_le_bytes());
        out.extend_from_slice(&self.block_time.to_le_bytes());
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&(tx_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&(sum_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.validation.len() as u32).to_le_bytes());
        out.extend_from_slice(&tx_bytes);
        out.extend_from_slice(&sum_bytes);
        out.extend_from_slice(&val_bytes);
        out
    }

    pub fn hash(&self) -> Hash256 {
        crypto::devv_hash(&self.encode())
    }

    /// The byte string the proposer and endorsers signed while this block
    /// was still a proposal; reconstructable from the block alone.
    pub fn proposal_signing_bytes(&self) -> Vec<u8> {
        let tx_bytes = encode_tx_section(&self.transactions);
        let sum_bytes = self.summary.encode();
        signing_bytes_from_parts(self.version, &self.prev_hash, &tx_bytes, &sum_bytes)
    }

    pub fn block_time(&self) -> u64 {
        self.block_time
    }

    pub fn prev_hash(&self) -> Hash256 {
        self.prev_hash
    }

    pub fn merkle_root(&self) -> Hash256 {
        self.merkle_root
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    pub fn chain_state(&self) -> &ChainState {
        &self.chain_state_after
    }
}

/// SHA-256 over the concatenated transaction hashes, in block order.
/// Empty blocks use the all-zero root.
pub fn merkle_root(transactions: &[Transaction]) -> Hash256 {
    if transactions.is_empty() {
        return ZERO_HASH;
    }
    let mut concat = Vec::with_capacity(transactions.len() * 32);
    for tx in transactions {
        concat.extend_from_slice(&tx.hash());
    }
    crypto::devv_hash(&concat)
}
