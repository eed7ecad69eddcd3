//! Call command - one authorized JSON request.

use anyhow::{Context as _, Result};
use clap::Args;
use ferry_oauth::AuthorizedCaller;

use super::{Context, with_hint};

/// Arguments for the call command.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Server name
    pub server: String,

    /// JSON payload to POST
    pub payload: String,
}

/// Run the call command.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(&args.payload).context("payload is not valid JSON")?;

    let config = ctx.load_config()?;
    let server = config.server(&args.server)?;
    if !server.enabled {
        anyhow::bail!(
            "server '{}' is disabled; enable it in {}",
            args.server,
            ctx.config_path().display()
        );
    }

    let caller = AuthorizedCaller::new(ctx.lifecycle(&config));
    let response = caller
        .post_json(&args.server, &server.oauth, &server.url, &payload)
        .await
        .map_err(|e| with_hint(e, &args.server))?;

    if ctx.json_output {
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}
