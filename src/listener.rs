//! Process-level listener (external collaborator per spec.md §1/§6):
//! accepts connections on the configured source address and invokes C5's
//! `create` once per accepted connection. Grounded on the teacher's
//! `net/tcp/mod.rs::receiver` accept loop (bind, loop on `accept`, spawn a
//! per-connection handler, log and continue on a single connection's
//! failure rather than tearing down the whole listener).

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::conn::{self, CreateParams};
use crate::dial;
use crate::logging::{print_debug, print_loud, PrintSender};
use crate::secret::SharedSecret;

pub struct ListenerConfig {
    pub source: String,
    pub targets: Vec<String>,
    pub decr: bool,
    pub nopfs: bool,
    pub requirepfs: bool,
    pub nokeepalive: bool,
    pub secret: SharedSecret,
    pub timeout: std::time::Duration,
    pub print_tx: PrintSender,
}

/// Binds `config.source` and loops accepting connections until the socket
/// errors fatally (bind failure) or the process is asked to shut down. Each
/// accepted connection becomes one call to `conn::create`; a failure to
/// resolve the target list or to start a connection is logged and the
/// listener keeps running, matching the teacher's "one bad peer doesn't
/// bring down the receiver" posture.
pub async fn run(config: ListenerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.source).await.map_err(|e| {
        anyhow::anyhow!("can't listen on {}: {e}", config.source)
    })?;
    print_loud(&config.print_tx, format!("listening on {}", config.source)).await;

    let targets = Arc::new(config.targets);
    let secret = config.secret;
    let print_tx = config.print_tx;

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                print_debug(&print_tx, format!("error accepting connection: {e}")).await;
                continue;
            }
        };
        print_debug(&print_tx, format!("accepted connection from {peer_addr}")).await;

        let targets = Arc::clone(&targets);
        let secret = secret.clone();
        let decr = config.decr;
        let nopfs = config.nopfs;
        let requirepfs = config.requirepfs;
        let nokeepalive = config.nokeepalive;
        let timeout = config.timeout;
        let print_tx = print_tx.clone();

        tokio::spawn(async move {
            let target_addrs = match resolve_all(&targets).await {
                Ok(addrs) if !addrs.is_empty() => addrs,
                Ok(_) => {
                    print_debug(&print_tx, "target address list resolved empty".to_string()).await;
                    return;
                }
                Err(e) => {
                    print_debug(&print_tx, format!("failed to resolve target: {e}")).await;
                    return;
                }
            };

            let params = CreateParams {
                s: stream,
                target_addrs,
                bind_addr: None,
                decr,
                nopfs,
                requirepfs,
                nokeepalive,
                secret,
                timeout,
                print_tx: print_tx.clone(),
            };
            // `drop_conn` already logs the reason; the listener has nothing
            // further to do once a connection dies, so `on_dead` is a noop.
            if let Err(e) = conn::create(params, move |_reason: crate::error::DropReason| {}) {
                print_debug(&print_tx, format!("failed to start connection to {peer_addr}: {e}")).await;
            }
        });
    }
}

async fn resolve_all(targets: &[String]) -> anyhow::Result<Vec<crate::addr::Address>> {
    let mut out = Vec::new();
    for target in targets {
        out.extend(dial::resolve(target).await?);
    }
    Ok(out)
}
