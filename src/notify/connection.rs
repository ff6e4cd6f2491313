//! Per-instance inbound/outbound task pair (spec §2 "Protocol inbound
//! fiber" / "Protocol outbound endpoint fiber"), re-expressed as two Tokio
//! tasks sharing an `Instance` through an `Arc`.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::framing::{read_boxed, write_boxed};
use crate::lifecycle::LifecycleHandle;
use crate::notify::context::NotifyContext;
use crate::notify::dispatch;
use crate::notify::instance::{Instance, OutboundMessage};
use crate::notify::wire;

const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Accepts one instance's socket, registers it in `ctx`, and drives its
/// inbound decode-dispatch loop plus outbound writer task until either
/// side closes or the process lifecycle leaves `Running`.
pub async fn run_instance(ctx: Arc<NotifyContext>, mut lifecycle: LifecycleHandle, socket: TcpStream) {
    let (mut read_half, write_half) = socket.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

    let instance_id = ctx.next_instance_id();
    let instance = Arc::new(Instance::new(instance_id, outbound_tx));
    ctx.register(instance.clone());

    let writer_lifecycle = lifecycle.clone_handle();
    let writer = tokio::spawn(run_writer(write_half, outbound_rx, writer_lifecycle));

    loop {
        tokio::select! {
            _ = lifecycle.changed() => {
                if !lifecycle.is_running() {
                    break;
                }
            }
            frame = read_boxed(&mut read_half) => {
                match frame {
                    Ok(bytes) => {
                        let header = match wire::decode_method(&bytes) {
                            Ok(h) => h,
                            Err(e) => {
                                dispatch::log_fatal(instance_id, &e);
                                break;
                            }
                        };
                        match dispatch::dispatch(&ctx, &instance, header).await {
                            Ok(Some(reply)) => {
                                if instance
                                    .outbound
                                    .send(OutboundMessage::Reply(reply))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                dispatch::log_fatal(instance_id, &e);
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }

    let _ = instance.outbound.send(OutboundMessage::Shutdown).await;
    ctx.deregister(instance_id);
    let _ = writer.await;
    info!(instance = instance_id, "notification instance closed");
}

async fn run_writer(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    mut lifecycle: LifecycleHandle,
) {
    loop {
        tokio::select! {
            _ = lifecycle.changed() => {
                if !lifecycle.is_running() {
                    break;
                }
            }
            msg = outbound_rx.recv() => {
                match msg {
                    Some(OutboundMessage::Reply(bytes)) => {
                        if write_boxed(&mut write_half, &bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(OutboundMessage::Shutdown) | None => break,
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}

pub async fn accept_loop(
    ctx: Arc<NotifyContext>,
    lifecycle: LifecycleHandle,
    listener: tokio::net::TcpListener,
    max_instances: usize,
) {
    let mut shutdown = lifecycle.clone_handle();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if !shutdown.is_running() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        if ctx.all_instances().len() >= max_instances {
                            warn!(%peer, max_instances, "rejecting connection, instance limit reached");
                            continue;
                        }
                        info!(%peer, "notification instance connected");
                        let ctx = ctx.clone();
                        let lifecycle = lifecycle.clone_handle();
                        tokio::spawn(run_instance(ctx, lifecycle, socket));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}
