//! Service configuration (spec §3, §4.3). Re-expression of the original's
//! supervisor-provided file descriptors and TOML config file: the startup
//! convention is simplified to CLI flags, per `clap::Parser` the way the
//! teacher's `Args` does it, rather than fd-passing from a privileged
//! supervisor process.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use uuid::Uuid;
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret as XStaticSecret};

use crate::protocol::context::AgentKeypair;

/// Protocol service (`agentd`) startup configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "agentd", version, about = "Agent protocol service")]
pub struct AgentdArgs {
    /// Address the protocol service listens on for client connections.
    #[arg(short, long, default_value = "127.0.0.1:4931")]
    pub listen: SocketAddr,

    /// Address of the notification service to connect to.
    #[arg(short, long, default_value = "127.0.0.1:4932")]
    pub notify: SocketAddr,

    /// Address of the data service to connect to.
    #[arg(short, long, default_value = "127.0.0.1:4933")]
    pub dataservice: SocketAddr,

    /// Address of the random-byte oracle to connect to, used to source
    /// handshake nonces (spec §4.3).
    #[arg(short, long, default_value = "127.0.0.1:4934")]
    pub randomservice: SocketAddr,

    /// Path to this agent's X25519 encryption keypair, as produced by
    /// `agentd-keygen`.
    #[arg(short, long, default_value = "agentd.key")]
    pub keyfile: PathBuf,

    /// Maximum simultaneous client connections.
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,

    /// Address the control plane listens on for provisioning commands
    /// (`AUTH_ENTITY_ADD`, `AUTH_ENTITY_CAP_ADD`, `PRIVATE_KEY_SET`,
    /// `FINALIZE`). Re-expression of the original's privileged supervisor
    /// socket as a second listener.
    #[arg(long, default_value = "127.0.0.1:4930")]
    pub control: SocketAddr,
}

/// Notification service (`notifyd`) startup configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "notifyd", version, about = "Block-update notification service")]
pub struct NotifydArgs {
    /// Address the notification service listens on for protocol-service
    /// connections.
    #[arg(short, long, default_value = "127.0.0.1:4932")]
    pub listen: SocketAddr,

    /// Maximum simultaneous instances (one per attached protocol-service
    /// connection).
    #[arg(long, default_value_t = 1024)]
    pub max_instances: usize,
}

/// An agent keyfile's on-disk layout: `uuid[16] | x25519_public[32] |
/// x25519_private[32]`, written by `agentd-keygen` and loaded at startup by
/// `agentd` per the `--keyfile` flag.
pub const KEYFILE_LEN: usize = 16 + 32 + 32;

pub fn write_agent_keyfile(path: &Path, keypair: &AgentKeypair) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(KEYFILE_LEN);
    bytes.extend_from_slice(keypair.uuid.as_bytes());
    bytes.extend_from_slice(keypair.encryption_public.as_bytes());
    bytes.extend_from_slice(&keypair.encryption_private.to_bytes());
    std::fs::write(path, bytes)
}

pub fn read_agent_keyfile(path: &Path) -> std::io::Result<AgentKeypair> {
    let bytes = std::fs::read(path)?;
    if bytes.len() != KEYFILE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "agent keyfile has the wrong length",
        ));
    }
    let uuid = Uuid::from_slice(&bytes[0..16]).expect("slice is exactly 16 bytes");
    let mut enc_public = [0u8; 32];
    enc_public.copy_from_slice(&bytes[16..48]);
    let mut enc_private = [0u8; 32];
    enc_private.copy_from_slice(&bytes[48..80]);
    Ok(AgentKeypair {
        uuid,
        encryption_public: XPublicKey::from(enc_public),
        encryption_private: XStaticSecret::from(enc_private),
    })
}

/// Installs the process-wide tracing subscriber, mirroring the teacher's
/// `tracing_subscriber::fmt()` setup with a per-binary default directive.
pub fn init_tracing(default_directive: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse().expect("valid default directive")),
        )
        .init();
}
