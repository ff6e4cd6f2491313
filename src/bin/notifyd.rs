//! Notification service entry point (spec §2, §4.2).

use std::sync::Arc;

use agentd::config::{self, NotifydArgs};
use agentd::lifecycle;
use agentd::notify::connection::accept_loop;
use agentd::notify::context::NotifyContext;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::init_tracing("notifyd=info");
    let args = NotifydArgs::parse();

    let (controller, lifecycle_handle) = lifecycle::channel();
    let ctx = Arc::new(NotifyContext::new(lifecycle_handle.clone_handle()));

    let listener = match TcpListener::bind(args.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %args.listen, "failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(addr = %args.listen, "notification service listening");

    tokio::spawn(accept_loop(ctx, lifecycle_handle, listener, args.max_instances));

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    controller.terminate();
}
