//! Wire framings (spec §6): a boxed frame for the plaintext handshake phase
//! and an authenticated frame for everything after the session key is
//! established. Grounded on the length-prefixed read/write idiom in the
//! teacher's chunked Noise transport (`net::encrypted`), simplified here
//! because VELO_V1 frames are not chunked — the protocol bounds a single
//! request/response to one frame.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::WireError;

/// Largest boxed-frame payload accepted. Mirrors the teacher's DoS-sized
/// upper bound on a single message.
pub const MAX_BOXED_PAYLOAD: usize = 2 * 1024 * 1024;

/// Largest authenticated-frame ciphertext (including the 16-byte Poly1305
/// tag) accepted per frame.
pub const MAX_AUTH_CIPHERTEXT: usize = 2 * 1024 * 1024;

/// Reads a `u32`-length-prefixed opaque payload: `[len: u32 BE][payload]`.
/// Used for the pre-handshake hello/response exchange.
pub async fn read_boxed<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, WireError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_BOXED_PAYLOAD {
        return Err(WireError::Malformed("boxed frame exceeds maximum size"));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_boxed<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), WireError> {
    if payload.len() > MAX_BOXED_PAYLOAD {
        return Err(WireError::Malformed("boxed frame exceeds maximum size"));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// An authenticated frame as it appears on the wire: an 8-byte big-endian
/// IV followed by the ChaCha20-Poly1305 ciphertext (payload + 16-byte tag).
/// The IV is carried in the clear; it is also used as the AEAD nonce's
/// low-order bytes per spec §5.4.
pub struct AuthFrame {
    pub iv: u64,
    pub ciphertext: Vec<u8>,
}

pub async fn read_auth_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<AuthFrame, WireError> {
    let mut iv_bytes = [0u8; 8];
    reader.read_exact(&mut iv_bytes).await?;
    let iv = u64::from_be_bytes(iv_bytes);

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_AUTH_CIPHERTEXT {
        return Err(WireError::Malformed("authenticated frame exceeds maximum size"));
    }
    let mut ciphertext = vec![0u8; len];
    reader.read_exact(&mut ciphertext).await?;
    Ok(AuthFrame { iv, ciphertext })
}

pub async fn write_auth_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &AuthFrame,
) -> Result<(), WireError> {
    if frame.ciphertext.len() > MAX_AUTH_CIPHERTEXT {
        return Err(WireError::Malformed("authenticated frame exceeds maximum size"));
    }
    writer.write_all(&frame.iv.to_be_bytes()).await?;
    writer
        .write_all(&(frame.ciphertext.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&frame.ciphertext).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn boxed_frame_round_trips() {
        let mut buf = Vec::new();
        write_boxed(&mut buf, b"hello").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let out = read_boxed(&mut cursor).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn boxed_frame_rejects_oversized_length_prefix() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_BOXED_PAYLOAD as u32) + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_boxed(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }

    #[tokio::test]
    async fn auth_frame_round_trips() {
        let frame = AuthFrame {
            iv: 0x8000_0000_0000_0001,
            ciphertext: vec![1, 2, 3, 4],
        };
        let mut buf = Vec::new();
        write_auth_frame(&mut buf, &frame).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let out = read_auth_frame(&mut cursor).await.unwrap();
        assert_eq!(out.iv, frame.iv);
        assert_eq!(out.ciphertext, frame.ciphertext);
    }
}
