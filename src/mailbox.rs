//! Integer-addressed mailbox discipline (spec §4.1, glossary "Mailbox"),
//! re-expressed over `tokio::sync::mpsc`. Address 0 means "none"; live
//! addresses are assigned starting at 1 and never reused while a sender
//! handle for them is still registered.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

pub type Address = NonZeroU32;

/// An owning envelope: receiving a message transfers ownership of its
/// payload to the receiver, matching the spec's "owning reference to a
/// payload resource" mailbox semantics.
pub struct Envelope<T> {
    pub from: Option<Address>,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(from: Option<Address>, payload: T) -> Self {
        Self { from, payload }
    }
}

/// A process-wide registry mapping small integer addresses to mailbox
/// senders. One instance lives on each service's root context.
pub struct MailboxTable<T> {
    next: AtomicU32,
    senders: Mutex<HashMap<u32, mpsc::Sender<Envelope<T>>>>,
}

impl<T> Default for MailboxTable<T> {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(1),
            senders: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> MailboxTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new mailbox, returning its address and the receiving
    /// half. Capacity bounds backpressure the discipline's `message_send`
    /// the way spec §5 describes ("may suspend if the receiving mailbox is
    /// full").
    pub fn create(&self, capacity: usize) -> (Address, mpsc::Receiver<Envelope<T>>) {
        let addr = self.next.fetch_add(1, Ordering::SeqCst);
        let addr = Address::new(addr).expect("mailbox address counter started at 1");
        let (tx, rx) = mpsc::channel(capacity);
        self.senders.lock().unwrap().insert(addr.get(), tx);
        (addr, rx)
    }

    pub fn close(&self, addr: Address) {
        self.senders.lock().unwrap().remove(&addr.get());
    }

    /// Sends an owning envelope to `to`. Returns an error if the mailbox
    /// does not exist or has been closed — the caller treats this as a
    /// resource-exhaustion/not-found condition per spec §7, never panics.
    pub async fn send(&self, to: Address, from: Option<Address>, payload: T) -> Result<(), T> {
        let sender = {
            let guard = self.senders.lock().unwrap();
            guard.get(&to.get()).cloned()
        };
        match sender {
            Some(tx) => tx
                .send(Envelope::new(from, payload))
                .await
                .map_err(|e| e.0.payload),
            None => Err(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_send_then_receive() {
        let table: MailboxTable<u32> = MailboxTable::new();
        let (addr, mut rx) = table.create(4);
        table.send(addr, None, 42).await.unwrap();
        let env = rx.recv().await.unwrap();
        assert_eq!(env.payload, 42);
    }

    #[tokio::test]
    async fn send_to_closed_mailbox_fails() {
        let table: MailboxTable<u32> = MailboxTable::new();
        let (addr, rx) = table.create(4);
        drop(rx);
        table.close(addr);
        let result = table.send(addr, None, 7).await;
        assert!(result.is_err());
    }

    #[test]
    fn addresses_are_assigned_starting_at_one_and_never_reused() {
        let table: MailboxTable<u32> = MailboxTable::new();
        let (a1, _r1) = table.create(1);
        let (a2, _r2) = table.create(1);
        assert_eq!(a1.get(), 1);
        assert_eq!(a2.get(), 2);
    }
}
