// Spray-and-Wait Linux node: UDP link, stdin application, engine event loop.

mod app;
mod config;
mod link;
mod node;

use std::future::Future;
use std::net::SocketAddrV4;

use anyhow::anyhow;
use spray_core::SprayWaitCore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("spray-linux {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = config::load();
    let address = cfg.node_address()?;
    let engine = SprayWaitCore::with_config(address, cfg.engine());
    let dest = SocketAddrV4::new(cfg.broadcast_addr, cfg.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let socket = link::bind(cfg.port)?;
        info!(%address, port = cfg.port, "node starting");

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let link_task = tokio::spawn(link::run_link(
            socket,
            address,
            dest,
            cfg.retransmit_interval(),
            link_rx,
            input_tx.clone(),
        ));
        let app_tx = input_tx.clone();
        let app_task = tokio::spawn(async move {
            if let Err(e) = app::run_app(app_tx).await {
                warn!(error = %e, "stdin failed, no more local commands");
            }
        });
        let node_task = tokio::spawn(node::Node::new(engine, link_tx).run(input_rx));

        let outcome = supervise(link_task, shutdown_signal()).await;
        info!("shutting down");
        let _ = input_tx.send(node::Input::Shutdown);
        node_task.await?;
        app_task.abort();
        outcome
    })?;
    Ok(())
}

/// Run until `shutdown` completes. The link task ending first is an error.
async fn supervise(
    mut link_task: JoinHandle<()>,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<()> {
    tokio::select! {
        r = shutdown => {
            link_task.abort();
            r.map_err(anyhow::Error::from)
        }
        r = &mut link_task => match r {
            Ok(()) => Err(anyhow!("link stopped unexpectedly")),
            Err(e) => Err(anyhow::Error::new(e).context("link task failed")),
        },
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
