//! Notification-service method framing (spec §6): boxed-framed
//! `method_id:u32 | offset:u32 | payload`, mirroring the control plane's
//! wire shape since neither link is a client-facing authenticated channel.

use crate::error::{Status, WireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MethodId {
    ReduceCaps = 0,
    BlockUpdate = 1,
    BlockAssertion = 2,
    BlockAssertionCancel = 3,
}

impl TryFrom<u32> for MethodId {
    type Error = WireError;

    fn try_from(v: u32) -> Result<Self, WireError> {
        match v {
            0 => Ok(MethodId::ReduceCaps),
            1 => Ok(MethodId::BlockUpdate),
            2 => Ok(MethodId::BlockAssertion),
            3 => Ok(MethodId::BlockAssertionCancel),
            _ => Err(WireError::Malformed("unrecognized notification method id")),
        }
    }
}

pub struct MethodHeader {
    pub method_id: MethodId,
    pub offset: u32,
    pub payload: Vec<u8>,
}

pub fn decode_method(frame: &[u8]) -> Result<MethodHeader, WireError> {
    if frame.len() < 8 {
        return Err(WireError::Malformed("notification frame shorter than header"));
    }
    let method_id = MethodId::try_from(u32::from_be_bytes(frame[0..4].try_into().unwrap()))?;
    let offset = u32::from_be_bytes(frame[4..8].try_into().unwrap());
    Ok(MethodHeader {
        method_id,
        offset,
        payload: frame[8..].to_vec(),
    })
}

/// Encodes a `BLOCK_ASSERTION` invalidation/success reply: `method_id(=
/// BlockAssertion) | offset | status`.
pub fn encode_assertion_reply(offset: u32, status: Status) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&(MethodId::BlockAssertion as u32).to_be_bytes());
    out.extend_from_slice(&offset.to_be_bytes());
    out.extend_from_slice(&status.as_u32().to_be_bytes());
    out
}

/// Encodes a generic status-only reply for the three non-deferred methods.
pub fn encode_status_reply(method_id: MethodId, offset: u32, status: Status) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&(method_id as u32).to_be_bytes());
    out.extend_from_slice(&offset.to_be_bytes());
    out.extend_from_slice(&status.as_u32().to_be_bytes());
    out
}

/// Parses a 16-byte block id payload (`BLOCK_UPDATE`/`BLOCK_ASSERTION`).
pub fn decode_block_id(payload: &[u8]) -> Result<[u8; 16], WireError> {
    payload
        .try_into()
        .map_err(|_| WireError::Malformed("expected 16-byte block id"))
}
