//! Notification-service client endpoint (spec §2, §4.4 family 2): forwards
//! `ASSERT_LATEST_BLOCK_ID`/`ASSERT_LATEST_BLOCK_ID_CANCEL` to the
//! notification service and routes invalidations back to the originating
//! connection's write endpoint by `server_offset`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::WireError;
use crate::framing::{read_boxed, write_boxed};
use crate::mailbox::{Address, MailboxTable};
use crate::notify::wire::{self as notify_wire, MethodId};
use crate::protocol::writer::WriteEndpointMessage;
use crate::wire::RequestId;

/// One live `(client mailbox, client offset)` translation, keyed by the
/// server offset the notification service will echo back in its
/// invalidation response (spec §3 "Notification translation entry").
struct TranslationEntry {
    client_mailbox: Address,
    client_offset: u32,
}

enum Request {
    Assert {
        client_mailbox: Address,
        client_offset: u32,
        block_id: [u8; 16],
        reply: oneshot::Sender<Result<(), WireError>>,
    },
    Cancel {
        client_mailbox: Address,
        client_offset: u32,
        reply: oneshot::Sender<Result<(), WireError>>,
    },
}

#[derive(Clone)]
pub struct Handle {
    tx: mpsc::Sender<Request>,
}

impl Handle {
    pub async fn assert_latest_block_id(
        &self,
        client_mailbox: Address,
        client_offset: u32,
        block_id: [u8; 16],
    ) -> Result<(), WireError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Assert { client_mailbox, client_offset, block_id, reply })
            .await
            .map_err(|_| WireError::Fatal("notification endpoint gone"))?;
        rx.await.map_err(|_| WireError::Fatal("notification endpoint dropped reply"))?
    }

    /// Cancels the assertion registered under `(client_mailbox,
    /// client_offset)`. Both must match: client offsets live in
    /// per-connection numbering spaces, so matching on `client_offset`
    /// alone would let one connection cancel another's assertion.
    pub async fn cancel(&self, client_mailbox: Address, client_offset: u32) -> Result<(), WireError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Cancel { client_mailbox, client_offset, reply })
            .await
            .map_err(|_| WireError::Fatal("notification endpoint gone"))?;
        rx.await.map_err(|_| WireError::Fatal("notification endpoint dropped reply"))?
    }
}

pub fn spawn(stream: TcpStream, writers: Arc<MailboxTable<WriteEndpointMessage>>) -> Handle {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(run(stream, rx, writers));
    Handle { tx }
}

async fn run(stream: TcpStream, mut inbox: mpsc::Receiver<Request>, writers: Arc<MailboxTable<WriteEndpointMessage>>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let translations: Arc<std::sync::Mutex<HashMap<u32, TranslationEntry>>> =
        Arc::new(std::sync::Mutex::new(HashMap::new()));
    let next_offset = Arc::new(AtomicU32::new(1));

    let reader_translations = translations.clone();
    let reader_writers = writers.clone();
    let reader = tokio::spawn(async move {
        loop {
            let frame = match read_boxed(&mut read_half).await {
                Ok(f) => f,
                Err(_) => break,
            };
            let header = match notify_wire::decode_method(&frame) {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, "malformed notification service reply");
                    continue;
                }
            };
            if header.method_id != MethodId::BlockAssertion {
                continue;
            }
            let entry = reader_translations.lock().unwrap().remove(&header.offset);
            if let Some(entry) = entry {
                let _ = reader_writers
                    .send(
                        entry.client_mailbox,
                        None,
                        WriteEndpointMessage::NotificationMsg {
                            request_id: RequestId::AssertLatestBlockId,
                            client_offset: entry.client_offset,
                        },
                    )
                    .await;
            }
        }
    });

    while let Some(req) = inbox.recv().await {
        match req {
            Request::Assert { client_mailbox, client_offset, block_id, reply } => {
                let offset = next_offset.fetch_add(1, Ordering::SeqCst);
                translations
                    .lock()
                    .unwrap()
                    .insert(offset, TranslationEntry { client_mailbox, client_offset });
                let mut frame = Vec::with_capacity(24);
                frame.extend_from_slice(&(MethodId::BlockAssertion as u32).to_be_bytes());
                frame.extend_from_slice(&offset.to_be_bytes());
                frame.extend_from_slice(&block_id);
                let _ = reply.send(write_boxed(&mut write_half, &frame).await);
            }
            Request::Cancel { client_mailbox, client_offset, reply } => {
                let offset = translations
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|(_, v)| v.client_mailbox == client_mailbox && v.client_offset == client_offset)
                    .map(|(k, _)| *k);
                if let Some(offset) = offset {
                    translations.lock().unwrap().remove(&offset);
                    let mut frame = Vec::with_capacity(8);
                    frame.extend_from_slice(&(MethodId::BlockAssertionCancel as u32).to_be_bytes());
                    frame.extend_from_slice(&offset.to_be_bytes());
                    let _ = reply.send(write_boxed(&mut write_half, &frame).await);
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
        }
    }
    reader.abort();
}
