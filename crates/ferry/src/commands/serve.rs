//! Serve command - run the local proxy until interrupted.

use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use clap::Args;
use ferry_oauth::{AuthorizedCaller, ProxyConfig, ProxyServer, UpstreamTarget};

use super::Context;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (default: [proxy] bind from config)
    #[arg(long)]
    pub bind: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    let bind = args.bind.unwrap_or_else(|| config.proxy.bind.clone());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;

    let proxy_config = config
        .enabled_servers()
        .fold(
            ProxyConfig::new(bind_addr).with_cors(config.proxy.cors),
            |proxy, (name, server)| {
                proxy.with_target(name, UpstreamTarget::new(&server.url, server.oauth.clone()))
            },
        );
    if proxy_config.targets.is_empty() {
        tracing::warn!("No enabled servers; the proxy will only answer /health and /servers");
    }

    let caller = AuthorizedCaller::new(ctx.lifecycle(&config));
    let server = ProxyServer::new(proxy_config, caller);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, handle) = server
        .run_with_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .with_context(|| format!("failed to bind proxy on {}", bind_addr))?;

    println!("ferry proxy listening on http://{}", addr);
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down proxy, draining in-flight requests");
    let _ = shutdown_tx.send(());
    handle.await.context("proxy task failed")??;

    Ok(())
}
