//! Client protocol request/response headers (spec §6): `request_id:u32 |
//! request_offset:u32 | payload` on the way in, `request_id:u32 | status:u32
//! | client_offset:u32 | payload` on the way out. All integers big-endian.
//!
//! The spec names request IDs but not their wire values (an internal
//! protocol document the distillation did not carry); this module assigns
//! sequential discriminants and treats that assignment as closed once made,
//! the same way the teacher's `net::message` module owns its own wire
//! enum rather than importing one.

use crate::error::WireError;

macro_rules! request_ids {
    ($($name:ident = $val:expr),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u32)]
        pub enum RequestId {
            $($name = $val),+
        }

        impl TryFrom<u32> for RequestId {
            type Error = WireError;

            fn try_from(v: u32) -> Result<Self, WireError> {
                match v {
                    $($val => Ok(RequestId::$name),)+
                    _ => Err(WireError::Malformed("unrecognized request id")),
                }
            }
        }
    };
}

request_ids! {
    HandshakeInitiate = 0,
    HandshakeAck = 1,
    LatestBlockIdGet = 2,
    TransactionSubmit = 3,
    BlockByIdGet = 4,
    BlockIdGetNext = 5,
    BlockIdGetPrev = 6,
    BlockIdByHeightGet = 7,
    TransactionByIdGet = 8,
    TransactionIdGetNext = 9,
    TransactionIdGetPrev = 10,
    TransactionIdGetBlockId = 11,
    ArtifactFirstTxnByIdGet = 12,
    ArtifactLastTxnByIdGet = 13,
    AssertLatestBlockId = 14,
    AssertLatestBlockIdCancel = 15,
    ExtendedApiEnable = 16,
    ExtendedApiSendrecv = 17,
    ExtendedApiSendresp = 18,
    StatusGet = 19,
    Close = 20,
}

impl RequestId {
    /// Data-service pass-through requests (spec §4.4 family 1).
    pub fn is_dataservice(self) -> bool {
        matches!(
            self,
            RequestId::LatestBlockIdGet
                | RequestId::TransactionSubmit
                | RequestId::BlockByIdGet
                | RequestId::BlockIdGetNext
                | RequestId::BlockIdGetPrev
                | RequestId::BlockIdByHeightGet
                | RequestId::TransactionByIdGet
                | RequestId::TransactionIdGetNext
                | RequestId::TransactionIdGetPrev
                | RequestId::TransactionIdGetBlockId
                | RequestId::ArtifactFirstTxnByIdGet
                | RequestId::ArtifactLastTxnByIdGet
        )
    }

    /// Notification pass-through requests (spec §4.4 family 2).
    pub fn is_notification(self) -> bool {
        matches!(
            self,
            RequestId::AssertLatestBlockId | RequestId::AssertLatestBlockIdCancel
        )
    }

    /// Extended-API routing requests (spec §4.4 family 3).
    pub fn is_extended_api(self) -> bool {
        matches!(
            self,
            RequestId::ExtendedApiEnable
                | RequestId::ExtendedApiSendrecv
                | RequestId::ExtendedApiSendresp
        )
    }

    /// Lifecycle requests (spec §4.4 family 4).
    pub fn is_lifecycle(self) -> bool {
        matches!(self, RequestId::StatusGet | RequestId::Close)
    }
}

/// A decoded request header plus its raw trailing payload.
pub struct RequestHeader {
    pub request_id: RequestId,
    pub request_offset: u32,
    pub payload: Vec<u8>,
}

pub fn decode_request(frame: &[u8]) -> Result<RequestHeader, WireError> {
    if frame.len() < 8 {
        return Err(WireError::Malformed("request frame shorter than header"));
    }
    let request_id = RequestId::try_from(u32::from_be_bytes(frame[0..4].try_into().unwrap()))?;
    let request_offset = u32::from_be_bytes(frame[4..8].try_into().unwrap());
    Ok(RequestHeader {
        request_id,
        request_offset,
        payload: frame[8..].to_vec(),
    })
}

/// Encodes a response header + payload: `request_id | status | client_offset
/// | payload`.
pub fn encode_response(
    request_id: RequestId,
    status: crate::error::Status,
    client_offset: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + payload.len());
    out.extend_from_slice(&(request_id as u32).to_be_bytes());
    out.extend_from_slice(&status.as_u32().to_be_bytes());
    out.extend_from_slice(&client_offset.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[test]
    fn request_round_trip_preserves_offset_and_payload() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(RequestId::LatestBlockIdGet as u32).to_be_bytes());
        raw.extend_from_slice(&7u32.to_be_bytes());
        raw.extend_from_slice(b"abc");
        let header = decode_request(&raw).unwrap();
        assert_eq!(header.request_id, RequestId::LatestBlockIdGet);
        assert_eq!(header.request_offset, 7);
        assert_eq!(header.payload, b"abc");
    }

    #[test]
    fn unknown_request_id_is_malformed() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&9999u32.to_be_bytes());
        raw.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(decode_request(&raw), Err(WireError::Malformed(_))));
    }

    #[test]
    fn response_header_fields_are_big_endian() {
        let bytes = encode_response(RequestId::StatusGet, Status::Success, 42, b"ok");
        assert_eq!(&bytes[0..4], &(RequestId::StatusGet as u32).to_be_bytes());
        assert_eq!(&bytes[4..8], &0u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &42u32.to_be_bytes());
        assert_eq!(&bytes[12..], b"ok");
    }
}
