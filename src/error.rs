//! Error taxonomy shared by both service cores.
//!
//! Mirrors the five-way classification in spec §7: transient I/O is handled
//! by the caller retrying at the transport layer and never reaches this
//! type; everything else gets a variant here so dispatch code can match on
//! failure class instead of inspecting strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("fatal: {0}")]
    Fatal(&'static str),
}

impl WireError {
    /// True for errors that should unwind the owning task rather than be
    /// folded into a status-coded reply.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WireError::Fatal(_) | WireError::Io(_))
    }
}

/// On-wire status codes carried in response headers (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Success = 0,
    Unauthorized = 1,
    NotFound = 2,
    Malformed = 3,
    ResourceExhausted = 4,
    InternalError = 5,
}

impl From<&WireError> for Status {
    fn from(e: &WireError) -> Self {
        match e {
            WireError::Io(_) => Status::InternalError,
            WireError::Malformed(_) => Status::Malformed,
            WireError::Unauthorized => Status::Unauthorized,
            WireError::NotFound => Status::Success, // not-found is folded into success per spec §7
            WireError::ResourceExhausted(_) => Status::ResourceExhausted,
            WireError::Fatal(_) => Status::InternalError,
        }
    }
}

impl Status {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Maps an arbitrary wire value to a known status, folding anything
    /// unrecognized to `InternalError` rather than rejecting the frame.
    pub fn try_from_u32(v: u32) -> Status {
        match v {
            0 => Status::Success,
            1 => Status::Unauthorized,
            2 => Status::NotFound,
            3 => Status::Malformed,
            4 => Status::ResourceExhausted,
            _ => Status::InternalError,
        }
    }
}
