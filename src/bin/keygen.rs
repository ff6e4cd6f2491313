//! Agent identity key generation (spec §3, §4.6).
//!
//! Produces the X25519 encryption keypair `agentd` loads at startup via
//! `--keyfile`, plus a standalone Dilithium signing keypair for an entity
//! the operator intends to register with `AUTH_ENTITY_ADD` — the two key
//! types are generated together since provisioning a new peer always needs
//! both, but they are stored separately since only the agent's own
//! encryption keypair is read back by `agentd` itself.

use std::path::PathBuf;

use agentd::config::write_agent_keyfile;
use agentd::crypto::{generate_encryption_keypair, SigningKeypair};
use agentd::protocol::context::AgentKeypair;
use clap::Parser;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "agentd-keygen", version, about = "Generate an agent or entity identity")]
struct Args {
    /// Output directory for the generated key material.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Name used for the output file prefix.
    #[arg(short, long, default_value = "agentd")]
    name: String,
}

fn main() {
    let args = Args::parse();
    std::fs::create_dir_all(&args.output).expect("failed to create output directory");

    let uuid = Uuid::new_v4();
    let (encryption_public, encryption_private) = generate_encryption_keypair();
    let agent = AgentKeypair {
        uuid,
        encryption_public,
        encryption_private,
    };

    let keyfile_path = args.output.join(format!("{}.key", args.name));
    write_agent_keyfile(&keyfile_path, &agent).expect("failed to write agent keyfile");

    let signing = SigningKeypair::generate();
    let signing_pub_path = args.output.join(format!("{}_signing.pub", args.name));
    let signing_sec_path = args.output.join(format!("{}_signing.key", args.name));
    std::fs::write(&signing_pub_path, signing.public).expect("failed to write signing public key");
    std::fs::write(&signing_sec_path, signing.secret_bytes()).expect("failed to write signing secret key");

    println!("entity uuid: {}", uuid);
    println!("encryption keyfile:  {}", keyfile_path.display());
    println!("signing public key:  {}", signing_pub_path.display());
    println!("signing secret key:  {}", signing_sec_path.display());
    println!();
    println!("register this entity with the running service via AUTH_ENTITY_ADD,");
    println!("supplying the uuid above and both public keys.");
}
