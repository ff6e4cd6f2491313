//! Extended-API routing (spec §4.4 family 3, §3 "Extended-API route" /
//! "Extended-API response xlat").

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use crate::mailbox::Address;

/// entity UUID → mailbox address of the connection task that enabled
/// extended-API routing for that entity. At most one route per entity.
#[derive(Default)]
pub struct RouteTable {
    routes: Mutex<BTreeMap<Uuid, Address>>,
    next_offset: AtomicU32,
    /// server offset → (caller mailbox, caller's client offset), per target
    /// entity. Keyed by the target's UUID since offsets are assigned by
    /// the target's monotonic counter (spec §3 "Offsets monotonically
    /// assigned per sentinel").
    xlat: Mutex<BTreeMap<(Uuid, u32), (Address, u32)>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self, entity: Uuid, mailbox: Address) {
        self.routes.lock().unwrap().insert(entity, mailbox);
    }

    pub fn disable(&self, entity: &Uuid) {
        self.routes.lock().unwrap().remove(entity);
    }

    pub fn lookup(&self, entity: &Uuid) -> Option<Address> {
        self.routes.lock().unwrap().get(entity).copied()
    }

    /// Assigns the next server offset for `target`, recording where the
    /// eventual `EXTENDED_API_SENDRESP` should be routed back to.
    pub fn record_sendrecv(&self, target: Uuid, caller_mailbox: Address, caller_offset: u32) -> u32 {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        self.xlat
            .lock()
            .unwrap()
            .insert((target, offset), (caller_mailbox, caller_offset));
        offset
    }

    /// Removes and returns the caller to reply to for `(target, offset)`.
    pub fn take_sendresp_target(&self, target: Uuid, offset: u32) -> Option<(Address, u32)> {
        self.xlat.lock().unwrap().remove(&(target, offset))
    }

    /// Removes every route and pending xlat entry belonging to `mailbox`,
    /// called on connection teardown so routes never outlive their
    /// connection (spec §3 "removed on disconnect").
    pub fn disconnect(&self, mailbox: Address) {
        self.routes.lock().unwrap().retain(|_, v| *v != mailbox);
        self.xlat.lock().unwrap().retain(|_, (caller, _)| *caller != mailbox);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sendrecv_then_sendresp_round_trips() {
        let table = RouteTable::new();
        let target = Uuid::new_v4();
        let caller_mailbox = Address::new(1).unwrap();
        let offset = table.record_sendrecv(target, caller_mailbox, 42);
        let (mailbox, client_offset) = table.take_sendresp_target(target, offset).unwrap();
        assert_eq!(mailbox, caller_mailbox);
        assert_eq!(client_offset, 42);
        assert!(table.take_sendresp_target(target, offset).is_none());
    }

    #[test]
    fn at_most_one_route_per_entity() {
        let table = RouteTable::new();
        let entity = Uuid::new_v4();
        table.enable(entity, Address::new(1).unwrap());
        table.enable(entity, Address::new(2).unwrap());
        assert_eq!(table.lookup(&entity), Some(Address::new(2).unwrap()));
    }
}
