//! Per-socket instance state (spec §2, §3): one per attached consensus- or
//! protocol-side connection, owning an ordered assertion tree and a
//! capability bitset.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::capability::NotifyCapSet;
use crate::notify::assertion::AssertionEntry;

pub type InstanceId = u64;

/// Outbound traffic destined for an instance's write endpoint. The
/// notification service's write-endpoint discipline mirrors the protocol
/// service's: one task per instance is the sole writer to that socket.
pub enum OutboundMessage {
    /// Pre-encoded method reply, written as a boxed frame.
    Reply(Vec<u8>),
    Shutdown,
}

pub struct Instance {
    pub id: InstanceId,
    pub caps: Mutex<NotifyCapSet>,
    pub assertions: Mutex<BTreeMap<u32, AssertionEntry>>,
    pub outbound: mpsc::Sender<OutboundMessage>,
}

impl Instance {
    pub fn new(id: InstanceId, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id,
            caps: Mutex::new(NotifyCapSet::full()),
            assertions: Mutex::new(BTreeMap::new()),
            outbound,
        }
    }

    /// Atomically swaps out the assertion list, leaving an empty tree in
    /// its place. Load-bearing for `BLOCK_UPDATE`'s swap-then-walk
    /// ordering (spec §4.2/§8 property 5): callers must not intersperse
    /// new inserts between this call's completion and the walk it feeds,
    /// which holding the lock for the whole swap already guarantees.
    pub fn swap_assertions(&self) -> BTreeMap<u32, AssertionEntry> {
        let mut guard = self.assertions.lock().unwrap();
        std::mem::take(&mut *guard)
    }
}
