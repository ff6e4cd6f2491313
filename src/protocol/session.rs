//! Per-connection session state (spec §3 "Connection session"): shared by
//! the connection task and the write-endpoint task via `Arc<Session>`.
//! Teardown runs explicitly when the releasing side observes
//! `Arc::strong_count(&session) == 1`, re-expressing "destroyed after both
//! protocol fiber and write-endpoint fiber release their references"
//! without a literal refcounted C object.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use uuid::Uuid;

use crate::crypto::SharedSecret;
use crate::mailbox::Address;

pub struct Session {
    pub peer_uuid: Uuid,
    pub shared_secret: SharedSecret,
    pub client_iv: AtomicU64,
    pub server_iv: AtomicU64,
    pub dataservice_context_opened: AtomicBool,
    pub extended_api_enabled: AtomicBool,
    /// This connection's own mailbox address, used as the return address
    /// for endpoint requests (data-service, notification, extended-API).
    pub return_address: Address,
}

impl Session {
    pub fn new(peer_uuid: Uuid, shared_secret: SharedSecret, return_address: Address) -> Self {
        Self {
            peer_uuid,
            shared_secret,
            // One below the first IV the client is allowed to use, so the
            // first `advance_client_iv(INITIAL_CLIENT_IV)` call succeeds.
            client_iv: AtomicU64::new(crate::crypto::INITIAL_CLIENT_IV - 1),
            // The handshake's Step-3 ack is already sealed under
            // INITIAL_SERVER_IV (spec §4.3 step 3); the session starts one
            // past it so the first post-handshake writer frame never
            // reuses that nonce.
            server_iv: AtomicU64::new(crate::crypto::INITIAL_SERVER_IV + 1),
            dataservice_context_opened: AtomicBool::new(false),
            extended_api_enabled: AtomicBool::new(false),
            return_address,
        }
    }

    /// Returns the current server IV and post-increments it. IVs are
    /// strictly monotonic per direction (spec §8 invariant 1); IV rollover
    /// is explicitly out of scope (spec §4.3).
    pub fn next_server_iv(&self) -> u64 {
        self.server_iv.fetch_add(1, Ordering::SeqCst)
    }

    /// Validates that `frame_iv` is strictly greater than every IV
    /// previously accepted on this connection's client direction, and
    /// records it as the new high-water mark. Returns false (reject the
    /// frame) otherwise.
    pub fn advance_client_iv(&self, frame_iv: u64) -> bool {
        let prev = self.client_iv.load(Ordering::SeqCst);
        if frame_iv <= prev {
            return false;
        }
        self.client_iv.store(frame_iv, Ordering::SeqCst);
        true
    }
}
