//! Protocol service entry point (spec §2, §4.3–§4.7).

use std::sync::Arc;

use agentd::config::{self, AgentdArgs};
use agentd::lifecycle;
use agentd::mailbox::MailboxTable;
use agentd::protocol::context::{Endpoints, ProtocolContext};
use agentd::protocol::{accept, control, dataservice, notifyclient, randomservice};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::init_tracing("agentd=info");
    let args = AgentdArgs::parse();

    let agent = match config::read_agent_keyfile(&args.keyfile) {
        Ok(kp) => kp,
        Err(e) => {
            error!(error = %e, keyfile = %args.keyfile.display(), "failed to load agent keyfile");
            std::process::exit(1);
        }
    };
    info!(agent = %agent.uuid, "loaded agent identity");

    let dataservice_stream = match tokio::net::TcpStream::connect(args.dataservice).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, addr = %args.dataservice, "failed to connect to data service");
            std::process::exit(1);
        }
    };
    let randomservice_stream = match tokio::net::TcpStream::connect(args.randomservice).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, addr = %args.randomservice, "failed to connect to random service");
            std::process::exit(1);
        }
    };
    let notify_stream = match tokio::net::TcpStream::connect(args.notify).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, addr = %args.notify, "failed to connect to notification service");
            std::process::exit(1);
        }
    };

    let (controller, lifecycle_handle) = lifecycle::channel();

    let dataservice_handle = dataservice::spawn(dataservice_stream, lifecycle_handle.clone_handle());
    let randomservice_handle = randomservice::spawn(randomservice_stream);

    let writers: Arc<MailboxTable<_>> = Arc::new(MailboxTable::new());
    let notifyclient_handle = notifyclient::spawn(notify_stream, writers.clone());

    let endpoints = Endpoints {
        dataservice: dataservice_handle,
        randomservice: randomservice_handle,
        notifyclient: notifyclient_handle,
    };
    let ctx = ProtocolContext::new(agent, lifecycle_handle.clone_handle(), endpoints, writers);

    let listener = match TcpListener::bind(args.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %args.listen, "failed to bind client listener");
            std::process::exit(1);
        }
    };
    info!(addr = %args.listen, "protocol service listening");

    let control_listener = match TcpListener::bind(args.control).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %args.control, "failed to bind control listener");
            std::process::exit(1);
        }
    };
    info!(addr = %args.control, "control plane listening");

    let accept_ctx = ctx.clone();
    let accept_lifecycle = lifecycle_handle.clone_handle();
    tokio::spawn(accept::accept_loop(accept_ctx, accept_lifecycle, listener, args.max_connections));

    let control_ctx = ctx.clone();
    tokio::spawn(async move {
        if let Ok((socket, peer)) = control_listener.accept().await {
            info!(%peer, "control plane connected");
            control::run_control(control_ctx, socket).await;
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    controller.terminate();
}
