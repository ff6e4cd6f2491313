//! Per-connection protocol fiber (spec §2 "Protocol inbound fiber" / "Protocol
//! outbound endpoint fiber", §4.3, §4.4): drives one client's handshake,
//! dispatch loop, and teardown.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::capability::NotifyCapSet;
use crate::framing::read_auth_frame;
use crate::lifecycle::LifecycleHandle;
use crate::protocol::context::ProtocolContext;
use crate::protocol::dispatch;
use crate::protocol::handshake;
use crate::protocol::session::Session;
use crate::protocol::writer::{self, WriteEndpointMessage, WRITE_QUEUE_CAPACITY};
use crate::wire;

/// Accepts one client socket, completes the VELO_V1 handshake, and runs its
/// dispatch loop until the peer disconnects, `CLOSE` is received, or the
/// process lifecycle leaves `Running`.
pub async fn run_connection(ctx: Arc<ProtocolContext>, mut lifecycle: LifecycleHandle, mut socket: TcpStream) {
    let handshake_result = match handshake::perform(&ctx, &mut socket).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "handshake failed");
            return;
        }
    };

    let (writer_addr, writer_inbox) = ctx.writers.create(WRITE_QUEUE_CAPACITY);
    let session = Arc::new(Session::new(handshake_result.peer_uuid, handshake_result.shared_secret, writer_addr));

    // Baseline data-service capability bitset (spec §4.4: "current policy: a
    // fixed baseline set; future work derives from the entity certificate").
    let caps_bitset = NotifyCapSet::full().bits().to_be_bytes().to_vec();
    match ctx.endpoints.dataservice.open_context(writer_addr, caps_bitset).await {
        Ok(_) => session.dataservice_context_opened.store(true, Ordering::SeqCst),
        Err(e) => {
            warn!(error = %e, "failed to open data-service context");
            ctx.writers.close(writer_addr);
            return;
        }
    }

    let (read_half, write_half) = socket.into_split();
    let writer_lifecycle = lifecycle.clone_handle();
    let writer_session = session.clone();
    let writer_task = tokio::spawn(writer::run_writer(writer_session, write_half, writer_inbox));

    run_dispatch_loop(&ctx, &session, &mut lifecycle, read_half).await;

    teardown(&ctx, &session, writer_task).await;
}

async fn run_dispatch_loop<R>(
    ctx: &Arc<ProtocolContext>,
    session: &Arc<Session>,
    lifecycle: &mut LifecycleHandle,
    mut read_half: R,
) where
    R: tokio::io::AsyncReadExt + Unpin,
{
    loop {
        tokio::select! {
            _ = lifecycle.changed() => {
                if !lifecycle.is_running() {
                    break;
                }
            }
            frame = read_auth_frame(&mut read_half) => {
                let frame = match frame {
                    Ok(f) => f,
                    Err(_) => break,
                };
                if !session.advance_client_iv(frame.iv) {
                    warn!(peer = %session.peer_uuid, "client iv did not advance, closing connection");
                    break;
                }
                let plaintext = match session.shared_secret.open(frame.iv, &frame.ciphertext) {
                    Ok(p) => p,
                    Err(_) => {
                        warn!(peer = %session.peer_uuid, "failed to authenticate client frame");
                        break;
                    }
                };
                let header = match wire::decode_request(&plaintext) {
                    Ok(h) => h,
                    Err(e) => {
                        warn!(peer = %session.peer_uuid, error = %e, "malformed client request");
                        break;
                    }
                };
                match dispatch::dispatch(ctx, session, header).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(peer = %session.peer_uuid, error = %e, "fatal dispatch error, closing connection");
                        break;
                    }
                }
            }
        }
    }
}

async fn teardown(ctx: &Arc<ProtocolContext>, session: &Arc<Session>, writer_task: tokio::task::JoinHandle<()>) {
    let _ = ctx
        .writers
        .send(session.return_address, None, WriteEndpointMessage::Shutdown)
        .await;
    let _ = writer_task.await;

    if session.dataservice_context_opened.load(Ordering::SeqCst) {
        let _ = ctx.endpoints.dataservice.close_context(session.return_address).await;
    }
    ctx.routes.disconnect(session.return_address);
    ctx.writers.close(session.return_address);

    info!(peer = %session.peer_uuid, "connection closed");
}
