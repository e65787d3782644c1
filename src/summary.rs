//! Net effect of a transaction set, keyed by address then coin.
//!
//! Wire form, address count implied by the enclosing `sum_size`:
//!
//! ```text
//! (33B address | u64 coin_count | (u64 coin | i64 delta | i64 chain_item){coin_count})*
//! ```

use std::collections::BTreeMap;

use crate::buffer::InputBuffer;
use crate::error::{DevvError, DevvResult};
use crate::transaction::{Transaction, Transfer};
use crate::types::{Address, ADDRESS_SIZE};

const COIN_ENTRY_SIZE: usize = 8 + 8 + 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SummaryItem {
    pub delta: i64,
    /// Highest transfer nonce index folded into this entry.
    pub chain_item: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    map: BTreeMap<Address, BTreeMap<u64, SummaryItem>>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn addr_count(&self) -> usize {
        self.map.len()
    }

    pub fn add_transfer(&mut self, transfer: &Transfer) {
        let item = self
            .map
            .entry(transfer.address)
            .or_default()
            .entry(transfer.coin)
            .or_default();
        item.delta = item.delta.saturating_add(transfer.delta);
        item.chain_item = item.chain_item.max(transfer.nonce_index as i64);
    }

    /// Aggregate the net effect of an ordered transaction list.
    pub fn from_transactions(txs: &[Transaction]) -> Self {
        let mut summary = Self::new();
        for tx in txs {
            for transfer in tx.transfers() {
                summary.add_transfer(&transfer);
            }
        }
        summary
    }

    /// Flattened `(address, coin, delta)` view for chain-state application.
    pub fn deltas(&self) -> Vec<(Address, u64, i64)> {
        let mut out = Vec::new();
        for (addr, coins) in &self.map {
            for (coin, item) in coins {
                out.push((*addr, *coin, item.delta));
            }
        }
        out
    }

    pub fn get(&self, addr: &Address, coin: u64) -> Option<SummaryItem> {
        self.map.get(addr).and_then(|coins| coins.get(&coin)).copied()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (addr, coins) in &self.map {
            out.extend_from_slice(addr.as_bytes());
            out.extend_from_slice(&(coins.len() as u64).to_le_bytes());
            for (coin, item) in coins {
                out.extend_from_slice(&coin.to_le_bytes());
                out.extend_from_slice(&item.delta.to_le_bytes());
                out.extend_from_slice(&item.chain_item.to_le_bytes());
            }
        }
        out
    }

    pub fn encoded_size(&self) -> usize {
        self.map
            .values()
            .map(|coins| ADDRESS_SIZE + 8 + coins.len() * COIN_ENTRY_SIZE)
            .sum()
    }

    /// Parse exactly `sum_size` bytes off the cursor.
    pub fn decode(buffer: &mut InputBuffer<'_>, sum_size: usize) -> DevvResult<Self> {
        if buffer.remaining() < sum_size {
            return Err(DevvError::Deserialization(format!(
                "summary size {sum_size} exceeds remaining buffer {}",
                buffer.remaining()
            )));
        }
        let end = buffer.offset() + sum_size;
        let mut map: BTreeMap<Address, BTreeMap<u64, SummaryItem>> = BTreeMap::new();
        while buffer.offset() < end {
            let mut raw_addr = [0u8; ADDRESS_SIZE];
            buffer.copy_into(&mut raw_addr)?;
            let coin_count = buffer.next_u64()?;
            let needed = (coin_count as usize).checked_mul(COIN_ENTRY_SIZE).filter(
                |&needed| buffer.offset() + needed <= end,
            );
            if needed.is_none() {
                return Err(DevvError::Deserialization(format!(
                    "summary coin count {coin_count} overruns its container"
                )));
            }
            let mut coins = BTreeMap::new();
            for _ in 0..coin_count {
                let coin = buffer.next_u64()?;
                let delta = buffer.next_i64()?;
                let chain_item = buffer.next_i64()?;
                coins.insert(coin, SummaryItem { delta, chain_item });
            }
            map.insert(Address::new(raw_addr), coins);
        }
        if buffer.offset() != end {
            return Err(DevvError::Deserialization(
                "summary bytes not self-consistent".into(),
            ));
        }
        Ok(Self { map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    #[test]
    fn encode_decode_round_trip() {
        let a = crypto::address_of(&crypto::generate_key());
        let b = crypto::address_of(&crypto::generate_key());
        let mut summary = Summary::new();
        summary.add_transfer(&Transfer {
            address: a,
            coin: 0,
            delta: -10,
            nonce_index: 3,
        });
        summary.add_transfer(&Transfer {
            address: b,
            coin: 0,
            delta: 10,
            nonce_index: 3,
        });
        summary.add_transfer(&Transfer {
            address: a,
            coin: 7,
            delta: 4,
            nonce_index: 9,
        });

        let bytes = summary.encode();
        assert_eq!(bytes.len(), summary.encoded_size());
        let mut buffer = InputBuffer::new(&bytes);
        let back = Summary::decode(&mut buffer, bytes.len()).unwrap();
        assert_eq!(back, summary);
        assert_eq!(back.get(&a, 0).unwrap().delta, -10);
        assert_eq!(back.get(&a, 7).unwrap().chain_item, 9);
    }

    #[test]
    fn transfers_aggregate_per_coin() {
        let a = crypto::address_of(&crypto::generate_key());
        let mut summary = Summary::new();
        for nonce_index in [1u64, 2, 3] {
            summary.add_transfer(&Transfer {
                address: a,
                coin: 1,
                delta: 5,
                nonce_index,
            });
        }
        let item = summary.get(&a, 1).unwrap();
        assert_eq!(item.delta, 15);
        assert_eq!(item.chain_item, 3);
    }

    #[test]
    fn overrunning_coin_count_rejected() {
        let a = crypto::address_of(&crypto::generate_key());
        let mut bytes = Vec::new();
        bytes.extend_from_slice(a.as_bytes());
        bytes.extend_from_slice(&100u64.to_le_bytes()); // declares 100 coins, provides none
        let len = bytes.len();
        let mut buffer = InputBuffer::new(&bytes);
        assert!(Summary::decode(&mut buffer, len).is_err());
    }
}
