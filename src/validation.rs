//! Peer endorsements of a proposed block: an ordered `address -> signature`
//! map, serialized as repeated `(33B address | 64B signature)` entries.

use std::collections::BTreeMap;

use crate::buffer::InputBuffer;
use crate::error::DevvResult;
use crate::types::{Address, Signature, ADDRESS_SIZE, SIGNATURE_SIZE};

/// Serialized width of one endorsement entry.
pub const ENTRY_SIZE: usize = ADDRESS_SIZE + SIGNATURE_SIZE;

/// Endorsements needed to finalize a proposal, proposer included.
pub fn threshold(peer_count: usize) -> usize {
    peer_count / 2 + 1
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validation {
    sigs: BTreeMap<Address, Signature>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigs.is_empty()
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.sigs.contains_key(addr)
    }

    pub fn get(&self, addr: &Address) -> Option<Signature> {
        self.sigs.get(addr).copied()
    }

    /// Record an endorsement; false if the address already endorsed.
    pub fn insert(&mut self, addr: Address, sig: Signature) -> bool {
        self.sigs.insert(addr, sig).is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Signature)> {
        self.sigs.iter()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.sigs.len() * ENTRY_SIZE);
        for (addr, sig) in &self.sigs {
            out.extend_from_slice(addr.as_bytes());
            out.extend_from_slice(sig.as_bytes());
        }
        out
    }

    /// Parse exactly `count` endorsement entries off the cursor.
    pub fn decode(buffer: &mut InputBuffer<'_>, count: usize) -> DevvResult<Self> {
        let mut sigs = BTreeMap::new();
        for _ in 0..count {
            let (addr, sig) = decode_entry(buffer)?;
            sigs.insert(addr, sig);
        }
        Ok(Self { sigs })
    }
}

/// Encode a single `(address, signature)` endorsement, the VALID payload.
pub fn encode_entry(addr: &Address, sig: &Signature) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENTRY_SIZE);
    out.extend_from_slice(addr.as_bytes());
    out.extend_from_slice(sig.as_bytes());
    out
}

pub fn decode_entry(buffer: &mut InputBuffer<'_>) -> DevvResult<(Address, Signature)> {
    let mut raw_addr = [0u8; ADDRESS_SIZE];
    buffer.copy_into(&mut raw_addr)?;
    let mut raw_sig = [0u8; SIGNATURE_SIZE];
    buffer.copy_into(&mut raw_sig)?;
    Ok((Address::new(raw_addr), Signature::new(raw_sig)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    #[test]
    fn thresholds() {
        assert_eq!(threshold(1), 1);
        assert_eq!(threshold(3), 2);
        assert_eq!(threshold(4), 3);
        assert_eq!(threshold(7), 4);
    }

    #[test]
    fn round_trip_and_dedup() {
        let a = crypto::address_of(&crypto::generate_key());
        let b = crypto::address_of(&crypto::generate_key());
        let sig = Signature::new([5u8; SIGNATURE_SIZE]);

        let mut val = Validation::new();
        assert!(val.insert(a, sig));
        assert!(!val.insert(a, sig));
        assert!(val.insert(b, sig));
        assert_eq!(val.len(), 2);

        let bytes = val.encode();
        assert_eq!(bytes.len(), 2 * ENTRY_SIZE);
        let mut buffer = InputBuffer::new(&bytes);
        let back = Validation::decode(&mut buffer, 2).unwrap();
        assert_eq!(back, val);
        assert!(buffer.at_end());
    }

    #[test]
    fn truncated_entry_rejected() {
        let bytes = [0u8; ENTRY_SIZE - 1];
        let mut buffer = InputBuffer::new(&bytes);
        assert!(Validation::decode(&mut buffer, 1).is_err());
    }
}
