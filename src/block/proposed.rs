//! A block proposal under endorsement.
//!
//! Canonical layout:
//!
//! ```text
//! u8 version | u64 num_bytes | 32B prev_hash | u64 tx_size | u64 sum_size |
//! u32 val_count | tx_bytes | summary_bytes | validation_bytes
//! ```
//!
//! Signatures (the proposer's and every endorsement) cover the *signing
//! bytes*: version, prev_hash, the two section sizes and their payloads —
//! everything except `num_bytes`, `val_count` and the validation section,
//! which change as endorsements accumulate.

use k256::ecdsa::SigningKey;

use crate::buffer::InputBuffer;
use crate::chain_state::ChainState;
use crate::crypto;
use crate::error::{DevvError, DevvResult};
use crate::summary::Summary;
use crate::transaction::Transaction;
use crate::types::{Address, Hash256, Signature};
use crate::validation::{self, Validation};

pub const PROPOSAL_VERSION: u8 = 0;
const HEADER_SIZE: usize = 1 + 8 + 32 + 8 + 8 + 4;

#[derive(Clone, Debug)]
pub struct ProposedBlock {
    version: u8,
    prev_hash: Hash256,
    transactions: Vec<Transaction>,
    summary: Summary,
    validation: Validation,
    chain_state_after: ChainState,
}

impl ProposedBlock {
    pub fn new(
        prev_hash: Hash256,
        transactions: Vec<Transaction>,
        summary: Summary,
        validation: Validation,
        chain_state_after: ChainState,
    ) -> Self {
        Self {
            version: PROPOSAL_VERSION,
            prev_hash,
            transactions,
            summary,
            validation,
            chain_state_after,
        }
    }

    /// Parse a proposal and re-derive its resulting chain state from
    /// `prior`. An overdrafting summary surfaces as `Overdraft`.
    pub fn decode(buffer: &mut InputBuffer<'_>, prior: &ChainState) -> DevvResult<Self> {
        if buffer.remaining() < HEADER_SIZE {
            return Err(DevvError::Deserialization(
                "serialized proposal too small".into(),
            ));
        }
        let version = buffer.next_byte()?;
        if version != PROPOSAL_VERSION {
            return Err(DevvError::Deserialization(format!(
                "invalid proposal version {version}"
            )));
        }
        let num_bytes = buffer.next_u64()? as usize;
        if num_bytes < HEADER_SIZE || num_bytes - 9 > buffer.remaining() {
            return Err(DevvError::Deserialization(format!(
                "proposal declares {num_bytes} bytes, {} remain",
                buffer.remaining() + 9
            )));
        }

        let mut prev_hash: Hash256 = [0u8; 32];
        buffer.copy_into(&mut prev_hash)?;
        let tx_size = buffer.next_u64()? as usize;
        let sum_size = buffer.next_u64()? as usize;
        let val_count = buffer.next_u32()? as usize;

        let declared = HEADER_SIZE + tx_size + sum_size + val_count * validation::ENTRY_SIZE;
        if declared != num_bytes {
            return Err(DevvError::Deserialization(format!(
                "proposal sections sum to {declared}, header declares {num_bytes}"
            )));
        }

        let transactions = decode_tx_section(buffer, tx_size)?;
        let summary = Summary::decode(buffer, sum_size)?;
        let validation = Validation::decode(buffer, val_count)?;

        let mut chain_state_after = prior.clone();
        chain_state_after.apply_summary(&summary)?;

        Ok(Self {
            version,
            prev_hash,
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
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&(tx_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&(sum_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.validation.len() as u32).to_le_bytes());
        out.extend_from_slice(&tx_bytes);
        out.extend_from_slice(&sum_bytes);
        out.extend_from_slice(&val_bytes);
        out
    }

    /// The byte string every signature over this proposal covers.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let tx_bytes = encode_tx_section(&self.transactions);
        let sum_bytes = self.summary.encode();
        signing_bytes_from_parts(self.version, &self.prev_hash, &tx_bytes, &sum_bytes)
    }

    /// Sign as proposer; the signature lands in the validation map.
    pub fn sign(&mut self, key: &SigningKey, addr: Address) {
        let sig = crypto::sign_bytes(key, &self.signing_bytes());
        self.validation.insert(addr, sig);
    }

    /// Verify a peer endorsement against this proposal's signing bytes.
    pub fn check_endorsement(&self, addr: &Address, sig: &Signature) -> bool {
        crypto::verify_bytes(addr, &self.signing_bytes(), sig)
    }

    /// Record a verified endorsement; false if the peer already endorsed.
    pub fn add_validation(&mut self, addr: Address, sig: Signature) -> bool {
        self.validation.insert(addr, sig)
    }

    /// Recompute the summary from the carried transactions and compare.
    pub fn verify_summary(&self) -> bool {
        Summary::from_transactions(&self.transactions) == self.summary
    }

    pub fn prev_hash(&self) -> Hash256 {
        self.prev_hash
    }

    pub fn set_prev_hash(&mut self, prev_hash: Hash256) {
        self.prev_hash = prev_hash;
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

    /// Drop accumulated endorsements; used when the proposal is re-based
    /// onto a new tip and must be re-signed.
    pub fn clear_validation(&mut self) {
        self.validation = Validation::new();
    }

    pub fn chain_state(&self) -> &ChainState {
        &self.chain_state_after
    }

    pub fn set_chain_state(&mut self, state: ChainState) {
        self.chain_state_after = state;
    }
}

pub(crate) fn encode_tx_section(transactions: &[Transaction]) -> Vec<u8> {
    let mut out = Vec::with_capacity(transactions.iter().map(Transaction::size).sum());
    for tx in transactions {
        out.extend_from_slice(tx.canonical());
    }
    out
}

pub(crate) fn decode_tx_section(
    buffer: &mut InputBuffer<'_>,
    tx_size: usize,
) -> DevvResult<Vec<Transaction>> {
    let end = buffer.offset() + tx_size;
    let mut transactions = Vec::new();
    while buffer.offset() < end {
        transactions.push(Transaction::decode(buffer)?);
    }
    if buffer.offset() != end {
        return Err(DevvError::Deserialization(
            "transaction section not self-consistent".into(),
        ));
    }
    Ok(transactions)
}

pub(crate) fn signing_bytes_from_parts(
    version: u8,
    prev_hash: &Hash256,
    tx_bytes: &[u8],
    sum_bytes: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 32 + 16 + tx_bytes.len() + sum_bytes.len());
    out.push(version);
    out.extend_from_slice(prev_hash);
    out.extend_from_slice(&(tx_bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(&(sum_bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(tx_bytes);
    out.extend_from_slice(sum_bytes);
    out
}
