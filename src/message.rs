//! Typed messages exchanged over the shard's pub/sub fabric.
//!
//! On the wire a message is one type byte followed by an opaque payload;
//! the fabric adds the topic URI and a monotonically increasing index that
//! exists only for tracing.

use std::sync::Arc;

use crate::error::{DevvError, DevvResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    FinalBlock = 0,
    ProposalBlock = 1,
    TransactionAnnouncement = 2,
    Valid = 3,
    RequestBlock = 4,
    GetBlocksSince = 5,
    BlocksSince = 6,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> DevvResult<Self> {
        match byte {
            0 => Ok(MessageType::FinalBlock),
            1 => Ok(MessageType::ProposalBlock),
            2 => Ok(MessageType::TransactionAnnouncement),
            3 => Ok(MessageType::Valid),
            4 => Ok(MessageType::RequestBlock),
            5 => Ok(MessageType::GetBlocksSince),
            6 => Ok(MessageType::BlocksSince),
            other => Err(DevvError::Deserialization(format!(
                "unknown message type {other}"
            ))),
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

#[derive(Clone, Debug)]
pub struct DevvMessage {
    pub uri: String,
    pub message_type: MessageType,
    pub data: Vec<u8>,
    /// Trace-only sequence number attached by the fabric.
    pub index: u64,
}

impl DevvMessage {
    pub fn new(uri: impl Into<String>, message_type: MessageType, data: Vec<u8>, index: u64) -> Self {
        Self {
            uri: uri.into(),
            message_type,
            data,
            index,
        }
    }

    /// Frame 2 of the fabric envelope: `type byte || payload`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.message_type.as_byte());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn deserialize(uri: impl Into<String>, bytes: &[u8], index: u64) -> DevvResult<Self> {
        let (&type_byte, payload) = bytes
            .split_first()
            .ok_or_else(|| DevvError::Deserialization("empty message frame".into()))?;
        Ok(Self {
            uri: uri.into(),
            message_type: MessageType::from_byte(type_byte)?,
            data: payload.to_vec(),
            index,
        })
    }
}

/// The outbound seat: handlers emit owned messages through this and the
/// controller alone talks to the fabric.
pub type MessageCallback = Arc<dyn Fn(DevvMessage) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let msg = DevvMessage::new("devv/shard-1", MessageType::Valid, vec![9, 8, 7], 41);
        let framed = msg.serialize();
        assert_eq!(framed[0], 3);

        let back = DevvMessage::deserialize("devv/shard-1", &framed, 41).unwrap();
        assert_eq!(back.message_type, MessageType::Valid);
        assert_eq!(back.data, vec![9, 8, 7]);
        assert_eq!(back.index, 41);
    }

    #[test]
    fn bad_frames_rejected() {
        assert!(DevvMessage::deserialize("devv/x", &[], 0).is_err());
        assert!(DevvMessage::deserialize("devv/x", &[7, 0], 0).is_err());
    }
}
