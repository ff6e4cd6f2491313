//! Data-service endpoint (spec §4.7): multiplexes every connection's
//! requests onto the single out-of-process data-service socket, and owns
//! the two mailbox-address ↔ child-context-id index maps.

use std::collections::HashMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::error::WireError;
use crate::framing::{read_boxed, write_boxed};
use crate::lifecycle::LifecycleHandle;
use crate::mailbox::Address;

pub type ChildContextId = u64;

enum Request {
    OpenContext {
        return_addr: Address,
        caps: Vec<u8>,
        reply: oneshot::Sender<Result<ChildContextId, WireError>>,
    },
    CloseContext {
        return_addr: Address,
        reply: oneshot::Sender<Result<(), WireError>>,
    },
    Forward {
        return_addr: Address,
        raw_request: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<u8>, WireError>>,
    },
}

/// A cloneable front-end to the endpoint task, handed to every connection.
#[derive(Clone)]
pub struct Handle {
    tx: mpsc::Sender<Request>,
}

impl Handle {
    pub async fn open_context(&self, return_addr: Address, caps: Vec<u8>) -> Result<ChildContextId, WireError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::OpenContext { return_addr, caps, reply })
            .await
            .map_err(|_| WireError::Fatal("dataservice endpoint gone"))?;
        rx.await.map_err(|_| WireError::Fatal("dataservice endpoint dropped reply"))?
    }

    pub async fn close_context(&self, return_addr: Address) -> Result<(), WireError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::CloseContext { return_addr, reply })
            .await
            .map_err(|_| WireError::Fatal("dataservice endpoint gone"))?;
        rx.await.map_err(|_| WireError::Fatal("dataservice endpoint dropped reply"))?
    }

    /// Forwards `raw_request` (already encoded in the data-service's own
    /// wire format, with bytes 4..8 reserved for the child-context id) and
    /// returns the raw response bytes, unmodified, for the caller's write
    /// endpoint to translate into client-protocol form.
    pub async fn forward(&self, return_addr: Address, raw_request: Vec<u8>) -> Result<Vec<u8>, WireError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Forward { return_addr, raw_request, reply })
            .await
            .map_err(|_| WireError::Fatal("dataservice endpoint gone"))?;
        rx.await.map_err(|_| WireError::Fatal("dataservice endpoint dropped reply"))?
    }
}

pub const ENDPOINT_QUEUE_CAPACITY: usize = 256;

/// Spawns the endpoint task and returns a `Handle` to it. `stream` is the
/// already-connected socket to the data service.
pub fn spawn(stream: TcpStream, lifecycle: LifecycleHandle) -> Handle {
    let (tx, rx) = mpsc::channel(ENDPOINT_QUEUE_CAPACITY);
    tokio::spawn(run(stream, rx, lifecycle));
    Handle { tx }
}

async fn run(mut stream: TcpStream, mut inbox: mpsc::Receiver<Request>, mut lifecycle: LifecycleHandle) {
    let mut return_to_child: HashMap<Address, ChildContextId> = HashMap::new();
    let mut child_to_return: HashMap<ChildContextId, Address> = HashMap::new();
    let mut next_child_id: ChildContextId = 1;

    loop {
        tokio::select! {
            _ = lifecycle.changed() => {
                if !lifecycle.is_running() {
                    break;
                }
            }
            req = inbox.recv() => {
                let Some(req) = req else { break };
                match req {
                    Request::OpenContext { return_addr, caps, reply } => {
                        let mut frame = Vec::with_capacity(8 + caps.len());
                        frame.extend_from_slice(&0u32.to_be_bytes()); // CONTEXT_OPEN method id
                        frame.extend_from_slice(&(caps.len() as u32).to_be_bytes());
                        frame.extend_from_slice(&caps);
                        let outcome = roundtrip(&mut stream, &frame).await;
                        match outcome {
                            Ok(resp) if resp.len() >= 8 => {
                                let child_id = u64::from_be_bytes(resp[0..8].try_into().unwrap());
                                return_to_child.insert(return_addr, child_id);
                                child_to_return.insert(child_id, return_addr);
                                let _ = reply.send(Ok(child_id));
                            }
                            Ok(_) => {
                                let child_id = next_child_id;
                                next_child_id += 1;
                                return_to_child.insert(return_addr, child_id);
                                child_to_return.insert(child_id, return_addr);
                                let _ = reply.send(Ok(child_id));
                            }
                            Err(e) => { let _ = reply.send(Err(e)); }
                        }
                    }
                    Request::CloseContext { return_addr, reply } => {
                        if let Some(child_id) = return_to_child.remove(&return_addr) {
                            child_to_return.remove(&child_id);
                            let _ = reply.send(Ok(()));
                        } else {
                            let _ = reply.send(Err(WireError::NotFound));
                        }
                    }
                    Request::Forward { return_addr, mut raw_request, reply } => {
                        let Some(child_id) = return_to_child.get(&return_addr).copied() else {
                            let _ = reply.send(Err(WireError::NotFound));
                            continue;
                        };
                        if raw_request.len() >= 8 {
                            raw_request[4..8].copy_from_slice(&(child_id as u32).to_be_bytes());
                        }
                        let _ = reply.send(roundtrip(&mut stream, &raw_request).await);
                    }
                }
            }
        }
    }
    warn!("dataservice endpoint shutting down");
}

async fn roundtrip<S: AsyncReadExt + AsyncWriteExt + Unpin>(stream: &mut S, frame: &[u8]) -> Result<Vec<u8>, WireError> {
    write_boxed(stream, frame).await?;
    read_boxed(stream).await.map_err(|e| {
        error!(error = %e, "data service roundtrip failed");
        e
    })
}
