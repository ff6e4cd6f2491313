//! VELO_V1 handshake integration test (spec §4.3, §9 invariants 1 and 8):
//! drives `protocol::handshake::perform` over a real loopback socket pair,
//! backed by a fake random-service endpoint and a registered entity.

use std::sync::Arc;

use agentd::crypto::{self, derive_shared_secret, generate_encryption_keypair, Nonce32};
use agentd::framing::{read_auth_frame, read_boxed, write_auth_frame, write_boxed, AuthFrame};
use agentd::lifecycle;
use agentd::mailbox::MailboxTable;
use agentd::protocol::context::{AgentKeypair, Endpoints, ProtocolContext};
use agentd::protocol::entity::AuthorizedEntity;
use agentd::protocol::handshake::{self, CRYPTO_SUITE_VELO_V1, PROTOCOL_VERSION};
use agentd::protocol::{dataservice, notifyclient, randomservice};
use agentd::wire::RequestId;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

/// Spins up the three out-of-process endpoints a `ProtocolContext` needs,
/// each backed by an in-process loopback echo/stub task, and returns a
/// ready-to-use context.
async fn build_context() -> Arc<ProtocolContext> {
    let (agent_pub, agent_priv) = generate_encryption_keypair();
    let agent_uuid = Uuid::new_v4();

    let (controller, lifecycle_handle) = lifecycle::channel();
    // leak the controller so the lifecycle channel stays open for the test's duration.
    std::mem::forget(controller);

    let dataservice_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dataservice_addr = dataservice_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_s, _) = dataservice_listener.accept().await.unwrap();
    });
    let dataservice_stream = TcpStream::connect(dataservice_addr).await.unwrap();
    let dataservice_handle = dataservice::spawn(dataservice_stream, lifecycle_handle.clone_handle());

    let random_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let random_addr = random_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut s, _) = random_listener.accept().await.unwrap();
        loop {
            let req = match read_boxed(&mut s).await {
                Ok(r) => r,
                Err(_) => break,
            };
            let count = u32::from_be_bytes(req[4..8].try_into().unwrap()) as usize;
            let bytes = vec![0x42u8; count];
            if write_boxed(&mut s, &bytes).await.is_err() {
                break;
            }
        }
    });
    let randomservice_stream = TcpStream::connect(random_addr).await.unwrap();
    let randomservice_handle = randomservice::spawn(randomservice_stream);

    let notify_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let notify_addr = notify_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_s, _) = notify_listener.accept().await.unwrap();
    });
    let notify_stream = TcpStream::connect(notify_addr).await.unwrap();
    let writers = Arc::new(MailboxTable::new());
    let notifyclient_handle = notifyclient::spawn(notify_stream, writers.clone());

    let endpoints = Endpoints {
        dataservice: dataservice_handle,
        randomservice: randomservice_handle,
        notifyclient: notifyclient_handle,
    };
    let agent = AgentKeypair {
        uuid: agent_uuid,
        encryption_public: agent_pub,
        encryption_private: agent_priv,
    };
    ProtocolContext::new(agent, lifecycle_handle, endpoints, writers)
}

#[tokio::test]
async fn handshake_succeeds_for_a_registered_entity_and_derives_matching_secrets() {
    let ctx = build_context().await;

    let entity_uuid = Uuid::new_v4();
    let (client_pub, client_priv) = generate_encryption_keypair();
    let entity = AuthorizedEntity::new(entity_uuid, client_pub, [0u8; agentd::crypto::MLDSA65_PUBKEY_SIZE]);
    ctx.entities.insert(entity);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_ctx = ctx.clone();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        handshake::perform(&server_ctx, &mut socket).await
    });

    let mut client = TcpStream::connect(addr).await.unwrap();

    let client_key_nonce = Nonce32::random();
    let client_challenge_nonce = Nonce32::random();

    let mut initiate = Vec::new();
    initiate.extend_from_slice(&(RequestId::HandshakeInitiate as u32).to_be_bytes());
    initiate.extend_from_slice(&0u32.to_be_bytes()); // request_offset
    initiate.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    initiate.extend_from_slice(&CRYPTO_SUITE_VELO_V1.to_be_bytes());
    initiate.extend_from_slice(entity_uuid.as_bytes());
    initiate.extend_from_slice(&client_key_nonce.0);
    initiate.extend_from_slice(&client_challenge_nonce.0);
    write_boxed(&mut client, &initiate).await.unwrap();

    let response = read_boxed(&mut client).await.unwrap();
    assert_eq!(&response[0..4], &(RequestId::HandshakeInitiate as u32).to_be_bytes());
    assert_eq!(&response[4..8], &0u32.to_be_bytes(), "status success");

    // response layout: req_id|status|offset|protocol_version|crypto_suite|
    // agent_uuid[16]|agent_enc_pub[32]|server_key_nonce[32]|server_challenge_nonce[32]|mac
    let agent_enc_pub_bytes = &response[12 + 4 + 4 + 16..12 + 4 + 4 + 16 + 32];
    let server_key_nonce = &response[12 + 4 + 4 + 16 + 32..12 + 4 + 4 + 16 + 32 + 32];
    let agent_pub = x25519_dalek::PublicKey::from(<[u8; 32]>::try_from(agent_enc_pub_bytes).unwrap());

    let client_secret = derive_shared_secret(&client_priv, &agent_pub, server_key_nonce, &client_key_nonce.0);

    let mut ack_payload = Vec::new();
    ack_payload.extend_from_slice(&(RequestId::HandshakeAck as u32).to_be_bytes());
    ack_payload.extend_from_slice(&0u32.to_be_bytes());
    let ciphertext = client_secret.seal(crypto::INITIAL_CLIENT_IV, &ack_payload).unwrap();
    write_auth_frame(
        &mut client,
        &AuthFrame {
            iv: crypto::INITIAL_CLIENT_IV,
            ciphertext,
        },
    )
    .await
    .unwrap();

    let server_ack = read_auth_frame(&mut client).await.unwrap();
    assert_eq!(server_ack.iv, crypto::INITIAL_SERVER_IV);
    let plaintext = client_secret.open(server_ack.iv, &server_ack.ciphertext).unwrap();
    assert_eq!(&plaintext[0..4], &(RequestId::HandshakeAck as u32).to_be_bytes());

    let result = server.await.unwrap().unwrap();
    assert_eq!(result.peer_uuid, entity_uuid);

    // both sides must agree on the derived secret: a value sealed under one
    // opens cleanly under the other (spec §9 invariant 1).
    let probe = result.shared_secret.seal(999, b"probe").unwrap();
    assert_eq!(client_secret.open(999, &probe).unwrap(), b"probe");
}

#[tokio::test]
async fn handshake_rejects_an_unregistered_entity() {
    let ctx = build_context().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_ctx = ctx.clone();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        handshake::perform(&server_ctx, &mut socket).await
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let unknown_uuid = Uuid::new_v4();
    let client_key_nonce = Nonce32::random();
    let client_challenge_nonce = Nonce32::random();

    let mut initiate = Vec::new();
    initiate.extend_from_slice(&(RequestId::HandshakeInitiate as u32).to_be_bytes());
    initiate.extend_from_slice(&0u32.to_be_bytes());
    initiate.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    initiate.extend_from_slice(&CRYPTO_SUITE_VELO_V1.to_be_bytes());
    initiate.extend_from_slice(unknown_uuid.as_bytes());
    initiate.extend_from_slice(&client_key_nonce.0);
    initiate.extend_from_slice(&client_challenge_nonce.0);
    write_boxed(&mut client, &initiate).await.unwrap();

    let response = read_boxed(&mut client).await.unwrap();
    let status = u32::from_be_bytes(response[4..8].try_into().unwrap());
    assert_ne!(status, 0, "unauthorized entity must not get a success status");

    let result = server.await.unwrap();
    assert!(result.is_err());
}
