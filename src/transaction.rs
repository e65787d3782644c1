//! Tier-2 transactions: the canonical byte form, soundness, and the
//! transfer list it carries.
//!
//! The canonical layout is fixed-offset:
//!
//! ```text
//! u64 xfer_size | u64 nonce_size | u8 operation |
//! transfers[xfer_size] | nonce[nonce_size] | signature[64]
//! ```
//!
//! so the total length is computable from the first 17 bytes. The canonical
//! form is what gets hashed, signed, and shipped; parsed views are derived
//! from it on demand.

use std::collections::BTreeMap;

use k256::ecdsa::SigningKey;

use crate::buffer::InputBuffer;
use crate::crypto;
use crate::error::{DevvError, DevvResult};
use crate::types::{Address, Hash256, Operation, Signature, ADDRESS_SIZE, SIGNATURE_SIZE};

/// Byte offset of the operation tag.
pub const OPERATION_OFFSET: usize = 16;
/// Byte offset of the first transfer.
pub const TRANSFER_OFFSET: usize = 17;
/// Serialized width of one transfer: address + coin + delta + nonce index.
pub const TRANSFER_SIZE: usize = ADDRESS_SIZE + 8 + 8 + 8;
/// Smallest nonce the protocol admits.
pub const MIN_NONCE_SIZE: usize = 16;
/// Smallest possible canonical transaction.
pub const MIN_TX_SIZE: usize = TRANSFER_OFFSET + TRANSFER_SIZE + MIN_NONCE_SIZE + SIGNATURE_SIZE;

/// One leg of a transaction: a signed coin movement for a single address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub address: Address,
    pub coin: u64,
    pub delta: i64,
    pub nonce_index: u64,
}

impl Transfer {
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.address.as_bytes());
        out.extend_from_slice(&self.coin.to_le_bytes());
        out.extend_from_slice(&self.delta.to_le_bytes());
        out.extend_from_slice(&self.nonce_index.to_le_bytes());
    }

    pub fn decode(buffer: &mut InputBuffer<'_>) -> DevvResult<Self> {
        let mut addr = [0u8; ADDRESS_SIZE];
        buffer.copy_into(&mut addr)?;
        Ok(Self {
            address: Address::new(addr),
            coin: buffer.next_u64()?,
            delta: buffer.next_i64()?,
            nonce_index: buffer.next_u64()?,
        })
    }
}

/// A tier-2 transaction, stored in canonical form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    canonical: Vec<u8>,
    xfer_size: usize,
    nonce_size: usize,
}

impl Transaction {
    /// Parse one transaction off the cursor, consuming exactly its canonical
    /// length. All declared sizes are bounds-checked against the remaining
    /// buffer before anything is copied.
    pub fn decode(buffer: &mut InputBuffer<'_>) -> DevvResult<Self> {
        if buffer.remaining() < MIN_TX_SIZE {
            return Err(DevvError::Deserialization(format!(
                "serialized transaction too small: {} bytes remain",
                buffer.remaining()
            )));
        }
        let xfer_size = buffer.peek_u64_at(0)?;
        let nonce_size = buffer.peek_u64_at(8)?;
        if nonce_size < MIN_NONCE_SIZE as u64 {
            return Err(DevvError::Deserialization(format!(
                "bad nonce size {nonce_size}"
            )));
        }
        if xfer_size == 0 || xfer_size % TRANSFER_SIZE as u64 != 0 {
            return Err(DevvError::Deserialization(format!(
                "bad transfer section size {xfer_size}"
            )));
        }
        Operation::from_byte(buffer.peek_byte_at(OPERATION_OFFSET)?)?;

        let total = xfer_size
            .checked_add(nonce_size)
            .and_then(|n| n.checked_add((TRANSFER_OFFSET + SIGNATURE_SIZE) as u64))
            .filter(|&n| n <= buffer.remaining() as u64)
            .ok_or_else(|| {
                DevvError::Deserialization(format!(
                    "declared transaction size exceeds buffer ({xfer_size}+{nonce_size})"
                ))
            })?;

        let canonical = buffer.take(total as usize)?.to_vec();
        Ok(Self {
            canonical,
            xfer_size: xfer_size as usize,
            nonce_size: nonce_size as usize,
        })
    }

    /// Assemble and sign a fresh transaction. The key must belong to the
    /// debiting address for the result to be sound.
    pub fn build(
        operation: Operation,
        transfers: &[Transfer],
        nonce: &[u8],
        key: &SigningKey,
    ) -> DevvResult<Self> {
        if nonce.len() < MIN_NONCE_SIZE {
            return Err(DevvError::Deserialization(format!(
                "nonce too small: {} < {MIN_NONCE_SIZE}",
                nonce.len()
            )));
        }
        if transfers.is_empty() {
            return Err(DevvError::Deserialization(
                "transaction needs at least one transfer".into(),
            ));
        }
        let xfer_size = transfers.len() * TRANSFER_SIZE;
        let mut canonical =
            Vec::with_capacity(TRANSFER_OFFSET + xfer_size + nonce.len() + SIGNATURE_SIZE);
        canonical.extend_from_slice(&(xfer_size as u64).to_le_bytes());
        canonical.extend_from_slice(&(nonce.len() as u64).to_le_bytes());
        canonical.push(operation.as_byte());
        for transfer in transfers {
            transfer.encode_into(&mut canonical);
        }
        canonical.extend_from_slice(nonce);

        let sig = crypto::sign_bytes(key, &canonical);
        canonical.extend_from_slice(sig.as_bytes());
        Ok(Self {
            canonical,
            xfer_size,
            nonce_size: nonce.len(),
        })
    }

    pub fn canonical(&self) -> &[u8] {
        &self.canonical
    }

    pub fn size(&self) -> usize {
        self.canonical.len()
    }

    /// The signed prefix: everything before the signature field.
    pub fn signing_bytes(&self) -> &[u8] {
        &self.canonical[..self.canonical.len() - SIGNATURE_SIZE]
    }

    pub fn signature(&self) -> Signature {
        let tail = &self.canonical[self.canonical.len() - SIGNATURE_SIZE..];
        let mut raw = [0u8; SIGNATURE_SIZE];
        raw.copy_from_slice(tail);
        Signature::new(raw)
    }

    pub fn operation(&self) -> Operation {
        // Canonical form was validated on construction.
        Operation::from_byte(self.canonical[OPERATION_OFFSET]).unwrap_or(Operation::Exchange)
    }

    pub fn nonce(&self) -> &[u8] {
        let start = TRANSFER_OFFSET + self.xfer_size;
        &self.canonical[start..start + self.nonce_size]
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        let section = &self.canonical[TRANSFER_OFFSET..TRANSFER_OFFSET + self.xfer_size];
        let mut buffer = InputBuffer::new(section);
        let mut out = Vec::with_capacity(self.xfer_size / TRANSFER_SIZE);
        while !buffer.at_end() {
            match Transfer::decode(&mut buffer) {
                Ok(transfer) => out.push(transfer),
                Err(_) => break,
            }
        }
        out
    }

    /// The address the signature must verify under: the first debiting
    /// transfer's, or the first transfer's when nothing is debited.
    pub fn signer(&self) -> Address {
        let transfers = self.transfers();
        transfers
            .iter()
            .find(|t| t.delta < 0)
            .or_else(|| transfers.first())
            .map(|t| t.address)
            .unwrap_or_else(|| Address::new([0u8; ADDRESS_SIZE]))
    }

    pub fn hash(&self) -> Hash256 {
        crypto::devv_hash(&self.canonical)
    }

    /// Soundness: well-formed (guaranteed on construction), zero-sum per
    /// coin, and signed by the debiting address.
    pub fn is_sound(&self) -> bool {
        let transfers = self.transfers();
        let mut per_coin: BTreeMap<u64, i128> = BTreeMap::new();
        for transfer in &transfers {
            *per_coin.entry(transfer.coin).or_insert(0) += i128::from(transfer.delta);
        }
        if per_coin.values().any(|sum| *sum != 0) {
            tracing::debug!("transaction deltas do not sum to zero");
            return false;
        }
        crypto::verify_bytes(&self.signer(), self.signing_bytes(), &self.signature())
    }

    /// JSON rendering for the pool dump; reference counts are not preserved.
    pub fn to_json(&self) -> serde_json::Value {
        let xfers: Vec<serde_json::Value> = self
            .transfers()
            .iter()
            .map(|t| {
                serde_json::json!({
                    "addr": t.address.to_string(),
                    "coin": t.coin,
                    "delta": t.delta,
                    "nonce_index": t.nonce_index,
                })
            })
            .collect();
        serde_json::json!({
            "oper": self.operation().as_byte(),
            "xfer": xfers,
            "nonce": hex::encode(self.nonce()),
            "sig": self.signature().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(key: &SigningKey, to: Address, coin: u64, amount: i64) -> Transaction {
        let from = crypto::address_of(key);
        let transfers = [
            Transfer {
                address: from,
                coin,
                delta: -amount,
                nonce_index: 1,
            },
            Transfer {
                address: to,
                coin,
                delta: amount,
                nonce_index: 1,
            },
        ];
        Transaction::build(Operation::Exchange, &transfers, &[7u8; 16], key).unwrap()
    }

    #[test]
    fn canonical_round_trip() {
        let key = crypto::generate_key();
        let to = crypto::address_of(&crypto::generate_key());
        let tx = exchange(&key, to, 0, 25);

        let mut buffer = InputBuffer::new(tx.canonical());
        let back = Transaction::decode(&mut buffer).unwrap();
        assert!(buffer.at_end());
        assert_eq!(back, tx);
        assert_eq!(back.transfers().len(), 2);
        assert_eq!(back.operation(), Operation::Exchange);
        assert!(back.is_sound());
    }

    #[test]
    fn two_transactions_parse_in_sequence() {
        let key = crypto::generate_key();
        let to = crypto::address_of(&crypto::generate_key());
        let a = exchange(&key, to, 0, 1);
        let b = exchange(&key, to, 1, 2);

        let mut serial = a.canonical().to_vec();
        serial.extend_from_slice(b.canonical());
        let mut buffer = InputBuffer::new(&serial);
        assert_eq!(Transaction::decode(&mut buffer).unwrap(), a);
        assert_eq!(Transaction::decode(&mut buffer).unwrap(), b);
        assert!(buffer.at_end());
    }

    #[test]
    fn nonzero_sum_is_unsound() {
        let key = crypto::generate_key();
        let from = crypto::address_of(&key);
        let transfers = [Transfer {
            address: from,
            coin: 0,
            delta: 1,
            nonce_index: 0,
        }];
        let tx = Transaction::build(Operation::Create, &transfers, &[0u8; 16], &key).unwrap();
        assert!(!tx.is_sound());
    }

    #[test]
    fn wrong_signer_is_unsound() {
        let key = crypto::generate_key();
        let thief = crypto::generate_key();
        let victim = crypto::address_of(&key);
        let to = crypto::address_of(&thief);
        let transfers = [
            Transfer {
                address: victim,
                coin: 0,
                delta: -10,
                nonce_index: 0,
            },
            Transfer {
                address: to,
                coin: 0,
                delta: 10,
                nonce_index: 0,
            },
        ];
        // Signed by the thief, debits the victim.
        let tx = Transaction::build(Operation::Exchange, &transfers, &[0u8; 16], &thief).unwrap();
        assert!(!tx.is_sound());
    }

    #[test]
    fn undersized_nonce_rejected() {
        let key = crypto::generate_key();
        let tx = exchange(&key, crypto::address_of(&key), 0, 5);
        let mut bytes = tx.canonical().to_vec();
        // Declare a nonce below the minimum.
        bytes[8..16].copy_from_slice(&8u64.to_le_bytes());
        let mut buffer = InputBuffer::new(&bytes);
        assert!(matches!(
            Transaction::decode(&mut buffer),
            Err(DevvError::Deserialization(_))
        ));
    }

    #[test]
    fn bad_operation_rejected() {
        let key = crypto::generate_key();
        let tx = exchange(&key, crypto::address_of(&key), 0, 5);
        let mut bytes = tx.canonical().to_vec();
        bytes[OPERATION_OFFSET] = 9;
        let mut buffer = InputBuffer::new(&bytes);
        assert!(Transaction::decode(&mut buffer).is_err());
    }

    #[test]
    fn oversized_declaration_rejected() {
        let key = crypto::generate_key();
        let tx = exchange(&key, crypto::address_of(&key), 0, 5);
        let mut bytes = tx.canonical().to_vec();
        // Claim far more transfer bytes than the buffer holds.
        bytes[0..8].copy_from_slice(&(TRANSFER_SIZE as u64 * 1000).to_le_bytes());
        let mut buffer = InputBuffer::new(&bytes);
        assert!(Transaction::decode(&mut buffer).is_err());
    }
}
