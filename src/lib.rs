pub mod capability;
pub mod config;
pub mod crypto;
pub mod error;
pub mod framing;
pub mod lifecycle;
pub mod mailbox;
pub mod notify;
pub mod protocol;
pub mod wire;
