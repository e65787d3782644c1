//! Core wire-level types shared across the node.

use std::fmt;

use crate::error::{DevvError, DevvResult};

/// SHA-256 digest.
pub type Hash256 = [u8; 32];

/// Compressed SEC1 public key length; an address IS the signer's public key.
pub const ADDRESS_SIZE: usize = 33;

/// Fixed-width ECDSA signature (r || s).
pub const SIGNATURE_SIZE: usize = 64;

pub const ZERO_HASH: Hash256 = [0u8; 32];

/// A wallet or node address: the compressed secp256k1 public key itself.
///
/// Equality, ordering and hashing are byte-wise, so addresses can key the
/// ordered maps that give the protocol its deterministic iteration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> DevvResult<Self> {
        let arr: [u8; ADDRESS_SIZE] = bytes
            .try_into()
            .map_err(|_| DevvError::Deserialization(format!("bad address length {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}..)", hex::encode(&self.0[..6]))
    }
}

/// A fixed-width transaction or endorsement signature, usable as a map key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn new(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> DevvResult<Self> {
        let arr: [u8; SIGNATURE_SIZE] = bytes.try_into().map_err(|_| {
            DevvError::Deserialization(format!("bad signature length {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..6]))
    }
}

/// Tier-2 transaction operation tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    Create = 0,
    Modify = 1,
    Exchange = 2,
    Delete = 3,
}

impl Operation {
    pub fn from_byte(byte: u8) -> DevvResult<Self> {
        match byte {
            0 => Ok(Operation::Create),
            1 => Ok(Operation::Modify),
            2 => Ok(Operation::Exchange),
            3 => Ok(Operation::Delete),
            other => Err(DevvError::Deserialization(format!(
                "invalid operation tag {other}"
            ))),
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}
