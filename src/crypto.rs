//! VELO_V1 handshake and frame cryptography (spec §5, §9).
//!
//! Key agreement and signing keys are kept separate, as in the original
//! protocol: X25519 for the per-session shared secret, Dilithium (kept from
//! the teacher's `crypto` module) for long-term entity signing keys used to
//! authorize handshake responses. HKDF-SHA3-256 stretches the raw ECDH
//! output into a shared secret; HMAC-SHA3-256 produces the handshake
//! short-MAC; ChaCha20-Poly1305 authenticates every post-handshake frame.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key as AeadKey, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pqcrypto_dilithium::dilithium3 as dilithium;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey as PkTrait, SecretKey as SkTrait};
use sha3::Sha3_256;
use thiserror::Error;
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret as XStaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const MLDSA65_PUBKEY_SIZE: usize = 1952;
pub const MLDSA65_SECRET_SIZE: usize = 4000;

pub type MlDsa65PublicKey = [u8; MLDSA65_PUBKEY_SIZE];
pub type MlDsa65Signature = Vec<u8>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("key agreement failed")]
    KeyAgreement,
    #[error("aead failure")]
    Aead,
}

/// A long-term Dilithium signing keypair, one per entity (agent, authorized
/// caller). Re-expression of the teacher's `Keypair`.
pub struct SigningKeypair {
    pub public: MlDsa65PublicKey,
    secret: dilithium::SecretKey,
}

impl SigningKeypair {
    pub fn generate() -> Self {
        let (pk, sk) = dilithium::keypair();
        let mut public = [0u8; MLDSA65_PUBKEY_SIZE];
        public.copy_from_slice(pk.as_bytes());
        Self { public, secret: sk }
    }

    pub fn sign(&self, message: &[u8]) -> MlDsa65Signature {
        dilithium::detached_sign(message, &self.secret)
            .as_bytes()
            .to_vec()
    }

    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }
}

pub fn verify_signature(
    pubkey: &MlDsa65PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let pk = dilithium::PublicKey::from_bytes(pubkey).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = dilithium::DetachedSignature::from_bytes(signature)
        .map_err(|_| CryptoError::InvalidSignature)?;
    dilithium::verify_detached_signature(&sig, message, &pk)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// The initial per-direction IVs, fixed by the protocol (spec §5.4): the
/// client writes starting at 1, the server writes starting at 2^63 + 1 so
/// the two streams can never collide on a nonce even under reordering.
pub const INITIAL_CLIENT_IV: u64 = 0x0000_0000_0000_0001;
pub const INITIAL_SERVER_IV: u64 = 0x8000_0000_0000_0001;

/// The 32-byte secret shared by both ends of a session after the handshake
/// completes. Zeroized on drop; never serialized or logged.
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(AeadKey::from_slice(&self.0))
    }

    /// Encrypts `plaintext` under the given direction IV, returning the
    /// ciphertext+tag. The IV is expanded to a 12-byte nonce by left-padding
    /// with zeros, matching the teacher's fixed-width nonce convention.
    pub fn seal(&self, iv: u64, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = iv_to_nonce(iv);
        self.cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Aead)
    }

    pub fn open(&self, iv: u64, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = iv_to_nonce(iv);
        self.cipher()
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| CryptoError::Aead)
    }
}

fn iv_to_nonce(iv: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&iv.to_be_bytes());
    nonce
}

/// Derives the session shared secret from the X25519 agreement output and
/// the two handshake key nonces, per `protocolservice_compute_shared_secret`:
/// the raw ECDH point is never used directly, it is stretched through
/// HKDF-SHA3-256 salted with the concatenation of both nonces.
pub fn derive_shared_secret(
    agent_enc_private: &XStaticSecret,
    peer_enc_public: &XPublicKey,
    server_key_nonce: &[u8],
    client_key_nonce: &[u8],
) -> SharedSecret {
    let dh = agent_enc_private.diffie_hellman(peer_enc_public);

    let mut salt = Vec::with_capacity(server_key_nonce.len() + client_key_nonce.len());
    salt.extend_from_slice(server_key_nonce);
    salt.extend_from_slice(client_key_nonce);

    let hk = Hkdf::<Sha3_256>::new(Some(&salt), dh.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(b"velo-v1 shared secret", &mut okm)
        .expect("32 is a valid SHA3-256 HKDF output length");

    SharedSecret(okm)
}

type HmacSha3_256 = Hmac<Sha3_256>;

/// Computes the handshake "short-MAC": an HMAC-SHA3-256 over the response
/// bytes and the client's challenge nonce, proving the responder holds the
/// shared secret without revealing it.
pub fn short_mac(shared_secret: &SharedSecret, response_bytes: &[u8], client_challenge_nonce: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha3_256::new_from_slice(&shared_secret.0)
        .expect("HMAC accepts any key length");
    mac.update(response_bytes);
    mac.update(client_challenge_nonce);
    mac.finalize().into_bytes().to_vec()
}

pub fn verify_short_mac(
    shared_secret: &SharedSecret,
    response_bytes: &[u8],
    client_challenge_nonce: &[u8],
    candidate: &[u8],
) -> bool {
    let mut mac = match HmacSha3_256::new_from_slice(&shared_secret.0) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(response_bytes);
    mac.update(client_challenge_nonce);
    mac.verify_slice(candidate).is_ok()
}

/// Generates a fresh X25519 encryption keypair for an agent or entity.
pub fn generate_encryption_keypair() -> (XPublicKey, XStaticSecret) {
    let secret = XStaticSecret::random_from_rng(rand::rngs::OsRng);
    let public = XPublicKey::from(&secret);
    (public, secret)
}

/// A random nonce used as a key or challenge nonce during the handshake.
/// Zeroized on drop since it contributes to key derivation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Nonce32(pub [u8; 32]);

impl Nonce32 {
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_agrees_from_both_sides() {
        let (server_pub, server_priv) = generate_encryption_keypair();
        let (client_pub, client_priv) = generate_encryption_keypair();
        let server_nonce = Nonce32::random();
        let client_nonce = Nonce32::random();

        let server_secret =
            derive_shared_secret(&server_priv, &client_pub, &server_nonce.0, &client_nonce.0);
        let client_secret =
            derive_shared_secret(&client_priv, &server_pub, &server_nonce.0, &client_nonce.0);

        let pt = b"ping";
        let ct = server_secret.seal(INITIAL_SERVER_IV, pt).unwrap();
        let back = client_secret.open(INITIAL_SERVER_IV, &ct).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn short_mac_round_trips_and_rejects_tamper() {
        let (pubk, privk) = generate_encryption_keypair();
        let nonce = Nonce32::random();
        let secret = derive_shared_secret(&privk, &pubk, &nonce.0, &nonce.0);
        let mac = short_mac(&secret, b"response", b"challenge");
        assert!(verify_short_mac(&secret, b"response", b"challenge", &mac));
        assert!(!verify_short_mac(&secret, b"response", b"other-challenge", &mac));
    }

    #[test]
    fn signing_keypair_round_trips() {
        let kp = SigningKeypair::generate();
        let sig = kp.sign(b"hello");
        assert!(verify_signature(&kp.public, b"hello", &sig).is_ok());
        assert!(verify_signature(&kp.public, b"tampered", &sig).is_err());
    }
}
