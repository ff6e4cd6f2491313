//! Protocol service root context (spec §2, §3 "Root context"): crypto
//! suite config, long-term agent keypair, authorized-entity dictionary,
//! endpoint mailbox handles, lifecycle watch.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use uuid::Uuid;
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret as XStaticSecret};

use crate::lifecycle::LifecycleHandle;
use crate::mailbox::MailboxTable;
use crate::protocol::entity::EntityDictionary;
use crate::protocol::extendedapi::RouteTable;
use crate::protocol::writer::WriteEndpointMessage;

/// The service's own long-term encryption identity, used as the responder
/// side of every handshake (spec §4.3 step 2 "agentd private encryption
/// key").
pub struct AgentKeypair {
    pub uuid: Uuid,
    pub encryption_public: XPublicKey,
    pub encryption_private: XStaticSecret,
}

pub struct Endpoints {
    pub dataservice: crate::protocol::dataservice::Handle,
    pub randomservice: crate::protocol::randomservice::Handle,
    pub notifyclient: crate::protocol::notifyclient::Handle,
}

pub struct ProtocolContext {
    pub agent: AgentKeypair,
    pub entities: EntityDictionary,
    pub routes: RouteTable,
    pub lifecycle: LifecycleHandle,
    pub endpoints: Endpoints,
    /// Every connection's write-endpoint inbox, addressed by the small
    /// integer mailbox address handed out at connection setup. Endpoint
    /// tasks (data-service, notification client) use this to deliver
    /// asynchronous replies back to the connection that originated them,
    /// re-expressing the spec's "return mailbox" addressing (§4.4, §4.7).
    pub writers: Arc<MailboxTable<WriteEndpointMessage>>,
    /// Set by the control plane's `PRIVATE_KEY_SET` (spec §4.6); recorded so
    /// the control fiber can confirm the step ran, not consulted elsewhere.
    pub private_key_set: AtomicBool,
}

impl ProtocolContext {
    /// `writers` is shared with the notification-client endpoint, which
    /// needs to route invalidations back to a connection's write endpoint
    /// before `ProtocolContext` itself exists — so the caller constructs it
    /// first and hands the same handle to both.
    pub fn new(
        agent: AgentKeypair,
        lifecycle: LifecycleHandle,
        endpoints: Endpoints,
        writers: Arc<MailboxTable<WriteEndpointMessage>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent,
            entities: EntityDictionary::new(),
            routes: RouteTable::new(),
            lifecycle,
            endpoints,
            writers,
            private_key_set: AtomicBool::new(false),
        })
    }
}
