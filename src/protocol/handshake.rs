//! The VELO_V1 three-step handshake (spec §4.3).
//!
//! Steps 1–2 are boxed-framed and plaintext; step 3 onward is
//! authenticated-framed under the freshly derived shared secret.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::crypto::{self, Nonce32, SharedSecret};
use crate::error::{Status, WireError};
use crate::framing::{read_auth_frame, read_boxed, write_auth_frame, write_boxed, AuthFrame};
use crate::protocol::context::ProtocolContext;
use crate::wire::RequestId;

pub const PROTOCOL_VERSION: u32 = 1;
pub const CRYPTO_SUITE_VELO_V1: u32 = 1;
const NONCE_LEN: usize = 32;

pub struct ClientInitiate {
    pub entity_uuid: Uuid,
    pub client_key_nonce: [u8; NONCE_LEN],
    pub client_challenge_nonce: [u8; NONCE_LEN],
}

fn decode_initiate(payload: &[u8]) -> Result<ClientInitiate, WireError> {
    // req_id|offset already stripped by the caller; remaining layout:
    // protocol_version:u32 | crypto_suite:u32 | entity_uuid[16] | client_key_nonce[32] | client_challenge_nonce[32]
    const LEN: usize = 4 + 4 + 16 + NONCE_LEN + NONCE_LEN;
    if payload.len() != LEN {
        return Err(WireError::Malformed("handshake initiate has wrong length"));
    }
    let protocol_version = u32::from_be_bytes(payload[0..4].try_into().unwrap());
    let crypto_suite = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    if protocol_version != PROTOCOL_VERSION || crypto_suite != CRYPTO_SUITE_VELO_V1 {
        return Err(WireError::Malformed("unsupported protocol version or crypto suite"));
    }
    let entity_uuid = Uuid::from_slice(&payload[8..24]).map_err(|_| WireError::Malformed("bad entity uuid"))?;
    let mut client_key_nonce = [0u8; NONCE_LEN];
    client_key_nonce.copy_from_slice(&payload[24..24 + NONCE_LEN]);
    let mut client_challenge_nonce = [0u8; NONCE_LEN];
    client_challenge_nonce.copy_from_slice(&payload[24 + NONCE_LEN..]);

    Ok(ClientInitiate {
        entity_uuid,
        client_key_nonce,
        client_challenge_nonce,
    })
}

fn encode_error(status: Status) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&(RequestId::HandshakeInitiate as u32).to_be_bytes());
    out.extend_from_slice(&status.as_u32().to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out
}

pub struct HandshakeResult {
    pub peer_uuid: Uuid,
    pub shared_secret: SharedSecret,
}

/// Drives the full three-step exchange over `stream`. On any validation
/// failure, writes the unencrypted/authenticated error response per spec
/// §4.3 and returns `Err`, leaving the caller to close the connection.
pub async fn perform<S>(ctx: &ProtocolContext, stream: &mut S) -> Result<HandshakeResult, WireError>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    // Step 1: client initiate.
    let frame = read_boxed(stream).await?;
    if frame.len() < 8 {
        return Err(WireError::Malformed("handshake initiate shorter than header"));
    }
    let request_id = u32::from_be_bytes(frame[0..4].try_into().unwrap());
    if request_id != RequestId::HandshakeInitiate as u32 {
        write_boxed(stream, &encode_error(Status::Malformed)).await?;
        return Err(WireError::Malformed("expected HANDSHAKE_INITIATE"));
    }
    let initiate = match decode_initiate(&frame[8..]) {
        Ok(i) => i,
        Err(e) => {
            write_boxed(stream, &encode_error(Status::Malformed)).await?;
            return Err(e);
        }
    };

    // Step 2: look up the entity, derive the shared secret, respond.
    let entity = match ctx.entities.lookup(&initiate.entity_uuid) {
        Some(e) => e,
        None => {
            write_boxed(stream, &encode_error(Status::Unauthorized)).await?;
            return Err(WireError::Unauthorized);
        }
    };

    // Nonces are sourced from the random-service endpoint rather than drawn
    // locally, per spec §4.3 "requests random bytes ... from the random
    // endpoint via a typed request/response message".
    let random_bytes = ctx
        .endpoints
        .randomservice
        .get_random_bytes(64)
        .await
        .map_err(|_| WireError::Fatal("random service unavailable"))?;
    if random_bytes.len() != 64 {
        return Err(WireError::Fatal("random service returned wrong number of bytes"));
    }
    let mut server_key_nonce = Nonce32([0u8; 32]);
    server_key_nonce.0.copy_from_slice(&random_bytes[0..32]);
    let mut server_challenge_nonce = Nonce32([0u8; 32]);
    server_challenge_nonce.0.copy_from_slice(&random_bytes[32..64]);

    let shared_secret = crypto::derive_shared_secret(
        &ctx.agent.encryption_private,
        &entity.encryption_pubkey,
        &server_key_nonce.0,
        &initiate.client_key_nonce,
    );

    let mut response = Vec::new();
    response.extend_from_slice(&(RequestId::HandshakeInitiate as u32).to_be_bytes());
    response.extend_from_slice(&Status::Success.as_u32().to_be_bytes());
    response.extend_from_slice(&0u32.to_be_bytes());
    response.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    response.extend_from_slice(&CRYPTO_SUITE_VELO_V1.to_be_bytes());
    response.extend_from_slice(ctx.agent.uuid.as_bytes());
    response.extend_from_slice(ctx.agent.encryption_public.as_bytes());
    response.extend_from_slice(&server_key_nonce.0);
    response.extend_from_slice(&server_challenge_nonce.0);

    let mac = crypto::short_mac(&shared_secret, &response, &initiate.client_challenge_nonce);
    response.extend_from_slice(&mac);

    write_boxed(stream, &response).await?;

    // Step 3: authenticated client ack under the initial client IV.
    let ack_frame = read_auth_frame(stream).await?;
    if ack_frame.iv != crypto::INITIAL_CLIENT_IV {
        return Err(WireError::Unauthorized);
    }
    if shared_secret.open(ack_frame.iv, &ack_frame.ciphertext).is_err() {
        return Err(WireError::Unauthorized);
    }

    let mut server_ack = Vec::with_capacity(12);
    server_ack.extend_from_slice(&(RequestId::HandshakeAck as u32).to_be_bytes());
    server_ack.extend_from_slice(&Status::Success.as_u32().to_be_bytes());
    server_ack.extend_from_slice(&0u32.to_be_bytes());
    let server_iv = crypto::INITIAL_SERVER_IV;
    let ciphertext = shared_secret
        .seal(server_iv, &server_ack)
        .map_err(|_| WireError::Fatal("ack encode failure"))?;
    write_auth_frame(stream, &AuthFrame { iv: server_iv, ciphertext }).await?;

    Ok(HandshakeResult {
        peer_uuid: initiate.entity_uuid,
        shared_secret,
    })
}

