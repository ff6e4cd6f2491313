//! Protocol service accept loop (spec §2 "Protocol service listener
//! fiber"): spawns one connection task per accepted client socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::lifecycle::LifecycleHandle;
use crate::protocol::connection::run_connection;
use crate::protocol::context::ProtocolContext;

pub async fn accept_loop(
    ctx: Arc<ProtocolContext>,
    lifecycle: LifecycleHandle,
    listener: TcpListener,
    max_connections: usize,
) {
    let mut shutdown = lifecycle.clone_handle();
    let active = Arc::new(AtomicUsize::new(0));
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
                        if active.load(Ordering::SeqCst) >= max_connections {
                            warn!(%peer, max_connections, "rejecting connection, connection limit reached");
                            continue;
                        }
                        info!(%peer, "protocol client connected");
                        active.fetch_add(1, Ordering::SeqCst);
                        let ctx = ctx.clone();
                        let lifecycle = lifecycle.clone_handle();
                        let active = active.clone();
                        tokio::spawn(async move {
                            run_connection(ctx, lifecycle, socket).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}
