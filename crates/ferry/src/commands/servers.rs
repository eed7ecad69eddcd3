//! Upstream server registry commands.
//!
//! - `ferry servers list` - List registered servers and whether they hold a token
//! - `ferry servers add` - Register a server and its OAuth descriptor
//! - `ferry servers remove` - Unregister a server and delete its token

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use ferry_config::ServerConfig;
use ferry_oauth::{OAuthDescriptor, TokenStore};

use super::Context;

/// Server registry commands.
#[derive(Args, Debug)]
pub struct ServersArgs {
    #[command(subcommand)]
    pub command: ServersCommand,
}

#[derive(Subcommand, Debug)]
pub enum ServersCommand {
    /// List registered servers
    List,

    /// Register an upstream server
    Add(AddArgs),

    /// Unregister a server and delete its stored token
    Remove(RemoveArgs),
}

/// Arguments for `ferry servers add`.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique name for this server (also its token identity)
    pub name: String,

    /// Endpoint that receives forwarded requests
    #[arg(long)]
    pub url: String,

    /// OAuth authorization endpoint
    #[arg(long)]
    pub authorization_endpoint: String,

    /// OAuth token endpoint
    #[arg(long)]
    pub token_endpoint: String,

    /// OAuth client id
    #[arg(long)]
    pub client_id: String,

    /// OAuth client secret (confidential clients only)
    #[arg(long)]
    pub client_secret: Option<String>,

    /// Scope to request (repeatable)
    #[arg(long = "scope")]
    pub scopes: Vec<String>,

    /// Store this server's token at an explicit path
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Register the server disabled (excluded from `ferry serve`)
    #[arg(long)]
    pub disabled: bool,

    /// Overwrite an existing server with the same name
    #[arg(long)]
    pub replace: bool,
}

/// Arguments for `ferry servers remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Name of the server to remove
    pub name: String,
}

/// Run the servers command.
pub async fn run(args: ServersArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ServersCommand::List => run_list(ctx).await,
        ServersCommand::Add(add_args) => run_add(add_args, ctx).await,
        ServersCommand::Remove(remove_args) => run_remove(remove_args, ctx).await,
    }
}

/// Run `ferry servers list`.
async fn run_list(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    if config.servers.is_empty() {
        if ctx.json_output {
            println!("[]");
        } else {
            println!("No servers configured.");
            println!();
            println!("Add a server with:");
            println!(
                "  ferry servers add <name> --url <url> --authorization-endpoint <url> \\"
            );
            println!("      --token-endpoint <url> --client-id <id>");
        }
        return Ok(());
    }

    let store = config.token_store(&ferry_config::token_dir_in(&ctx.config_dir));

    if ctx.json_output {
        let output: Vec<_> = config
            .servers
            .iter()
            .map(|(name, server)| {
                serde_json::json!({
                    "name": name,
                    "url": server.url,
                    "enabled": server.enabled,
                    "authenticated": store.has_token(name),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{:<20} {:<10} {:<6} {:<40}", "NAME", "STATUS", "TOKEN", "URL");
    println!("{}", "-".repeat(80));

    for (name, server) in &config.servers {
        let status = if server.enabled { "enabled" } else { "disabled" };
        let token = if store.has_token(name) { "yes" } else { "no" };
        println!(
            "{:<20} {:<10} {:<6} {:<40}",
            truncate(name, 20),
            status,
            token,
            truncate(&server.url, 40)
        );

        if ctx.verbose {
            println!("  Authorize: {}", server.oauth.authorization_endpoint);
            println!("  Token:     {}", server.oauth.token_endpoint);
            println!("  Client:    {}", server.oauth.client_id);
            if !server.oauth.scopes.is_empty() {
                println!("  Scopes:    {}", server.oauth.scopes.join(" "));
            }
        }
    }

    Ok(())
}

/// Run `ferry servers add`.
async fn run_add(args: AddArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;

    let mut oauth = OAuthDescriptor::new(
        args.authorization_endpoint,
        args.token_endpoint,
        args.client_id,
    )
    .with_scopes(args.scopes);
    if let Some(secret) = args.client_secret {
        oauth = oauth.with_client_secret(secret);
    }
    oauth.token_file = args.token_file;

    let server = ServerConfig::new(args.url, oauth).with_enabled(!args.disabled);
    config.add_server(args.name.clone(), server, args.replace)?;
    ctx.save_config(&config)?;

    tracing::info!(server = %args.name, "Server registered");
    if ctx.json_output {
        println!("{}", serde_json::json!({ "added": args.name }));
    } else {
        println!("Added server '{}'.", args.name);
        println!("Authorize it with: ferry auth login {}", args.name);
    }

    Ok(())
}

/// Run `ferry servers remove`.
async fn run_remove(args: RemoveArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;
    // Build the lifecycle first so a token_file override is still known.
    let lifecycle = ctx.lifecycle(&config);

    config.remove_server(&args.name)?;
    ctx.save_config(&config)?;
    let token_removed = lifecycle.forget(&args.name).await?;

    tracing::info!(server = %args.name, token_removed, "Server removed");
    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "removed": args.name, "token_removed": token_removed })
        );
    } else {
        println!("Removed server '{}'.", args.name);
        if token_removed {
            println!("Its stored token was deleted.");
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
