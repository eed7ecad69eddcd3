//! Auth command - per-server OAuth token management.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};
use ferry_oauth::{AuthorizationFlow, CallbackMode, TokenStatus};

use super::{Context, with_hint};

/// Arguments for the auth command.
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Authorize a server via OAuth (PKCE)
    Login(LoginArgs),

    /// Show token status for one or all servers
    Status {
        /// Server name (default: all servers)
        server: Option<String>,
    },

    /// Refresh a server's access token now
    Refresh {
        /// Server name
        server: String,
    },

    /// Delete a server's stored token
    Logout {
        /// Server name
        server: String,
    },
}

/// Arguments for `ferry auth login`.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Server name
    pub server: String,

    /// Callback port (default: [callback] port from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Paste the redirect URL instead of running a local listener
    #[arg(long)]
    pub manual: bool,

    /// Seconds to wait for the redirect (default: [callback] timeout_secs)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the URL without trying to open a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Re-authorize even if a valid token exists
    #[arg(long)]
    pub force: bool,
}

/// Run the auth command.
pub async fn run(args: AuthArgs, ctx: &Context) -> Result<()> {
    match args.command {
        AuthCommand::Login(login) => cmd_login(login, ctx).await,
        AuthCommand::Status { server } => cmd_status(server, ctx).await,
        AuthCommand::Refresh { server } => cmd_refresh(server, ctx).await,
        AuthCommand::Logout { server } => cmd_logout(server, ctx).await,
    }
}

async fn cmd_login(args: LoginArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let server = config.server(&args.server)?;
    let lifecycle = ctx.lifecycle(&config);

    if !args.force
        && let Some(status) = lifecycle.token_status(&args.server).await?
        && !status.is_expired
    {
        println!(
            "Already authenticated with '{}' (expires in {})",
            args.server,
            status.expires_in_display()
        );
        println!("Pass --force to re-authorize.");
        return Ok(());
    }

    let port = args.port.unwrap_or(config.callback.port);
    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.callback.timeout());
    let mode = if args.manual {
        CallbackMode::Manual
    } else {
        CallbackMode::Listener
    };

    let pending = AuthorizationFlow::new(lifecycle, args.server.clone(), server.oauth.clone())
        .with_port(port)
        .with_timeout(timeout)
        .begin(mode)
        .await
        .map_err(|e| with_hint(e, &args.server))?;

    println!("Authorize '{}'", args.server);
    println!();
    println!("Open this URL in your browser:");
    println!();
    println!("  {}", pending.url());
    println!();

    if !args.no_browser && open_url(pending.url()).is_err() {
        println!("(Could not open browser automatically)");
        println!();
    }

    let result = if pending.is_manual() {
        println!("After approving, copy the full URL from the browser's address bar");
        println!("(it starts with http://localhost:{}/callback) and paste it here:", port);
        println!();
        print!("redirect> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let input = input.trim();
        if input.is_empty() {
            println!("No input provided, aborting.");
            return Ok(());
        }
        pending.complete_with_redirect(input).await
    } else {
        println!(
            "Waiting for the redirect on http://localhost:{}/callback (timeout {}s)...",
            pending.port(),
            timeout.as_secs()
        );
        pending.complete().await
    };
    let record = result.map_err(|e| with_hint(e, &args.server))?;

    println!();
    println!("Authentication successful!");
    match record.expires_in {
        Some(secs) => println!("Token expires in: {} seconds", secs),
        None => println!("Token expires in: no expiry reported"),
    }
    if let Some(scope) = &record.scope {
        println!("Scope: {}", scope);
    }
    if !record.can_refresh() {
        println!("No refresh token was issued; run login again when it expires.");
    }

    Ok(())
}

async fn cmd_status(server: Option<String>, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let names: Vec<String> = match server {
        Some(name) => {
            config.server(&name)?;
            vec![name]
        }
        None => config.servers.keys().cloned().collect(),
    };

    if names.is_empty() {
        println!("No servers configured. Add one with 'ferry servers add'.");
        return Ok(());
    }

    let lifecycle = ctx.lifecycle(&config);
    let mut statuses = Vec::with_capacity(names.len());
    for name in names {
        let status = lifecycle
            .token_status(&name)
            .await
            .map_err(|e| with_hint(e, &name))?;
        statuses.push((name, status));
    }

    if ctx.json_output {
        let output: Vec<_> = statuses
            .iter()
            .map(|(name, status)| status_json(name, status.as_ref()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Authentication Status");
    println!("---------------------");
    for (name, status) in &statuses {
        match status {
            Some(info) => {
                println!("{}: authenticated", name);
                println!("  Expires: {}", info.expires_in_display());
                println!(
                    "  Refresh token: {}",
                    if info.has_refresh_token { "yes" } else { "no" }
                );
                if let Some(scope) = &info.scope {
                    println!("  Scope: {}", scope);
                }
                if ctx.verbose
                    && let Some(created) = &info.created_at
                {
                    println!("  Created: {}", created);
                }
            }
            None => {
                println!("{}: not authenticated", name);
                println!("  Run 'ferry auth login {}' to authorize", name);
            }
        }
    }

    Ok(())
}

fn status_json(name: &str, status: Option<&TokenStatus>) -> serde_json::Value {
    match status {
        Some(info) => serde_json::json!({
            "server": name,
            "authenticated": true,
            "expired": info.is_expired,
            "expires_at": info.expires_at,
            "expires_in_secs": info.expires_in_secs,
            "refreshable": info.has_refresh_token,
            "scope": info.scope,
        }),
        None => serde_json::json!({
            "server": name,
            "authenticated": false,
        }),
    }
}

async fn cmd_refresh(server: String, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let entry = config.server(&server)?;
    let lifecycle = ctx.lifecycle(&config);

    let record = lifecycle
        .refresh(&server, &entry.oauth)
        .await
        .map_err(|e| with_hint(e, &server))?;

    match record.expires_in {
        Some(secs) => println!("Token for '{}' refreshed (expires in {} seconds).", server, secs),
        None => println!("Token for '{}' refreshed.", server),
    }
    Ok(())
}

async fn cmd_logout(server: String, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    config.server(&server)?;
    let lifecycle = ctx.lifecycle(&config);

    if lifecycle.forget(&server).await? {
        println!("Token for '{}' removed.", server);
    } else {
        println!("No token stored for '{}'.", server);
    }

    Ok(())
}

/// Try to open a URL in the default browser.
fn open_url(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).status()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).status()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .status()?;
    }
    Ok(())
}
