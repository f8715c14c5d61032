mod config;
mod http;
mod resources;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use platform_obs::{ObsConfig, init_tracing};
use tracing::info;

use crate::{config::AppConfig, http::ServeConfig};

#[derive(Parser, Debug)]
#[command(name = "iam-server", version, about = "Route-derived IAM demo server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server with the IAM interceptor installed.
    Serve(ServeCommand),
    /// Print the permission catalog derived from the route table.
    Policies {
        #[arg(long, help = "Include the handler behind each permission")]
        raw: bool,
    },
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

impl From<ServeCommand> for ServeConfig {
    fn from(value: ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(ObsConfig::from_env("iam-server"))?;
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    match cli.command {
        Command::Serve(cmd) => {
            info!(
                granted = config.granted_permissions.len(),
                disable_filtering = config.iam.disable_filtering,
                "starting iam server"
            );
            http::serve(cmd.into(), &config).await
        }
        Command::Policies { raw } => print_policies(&config, raw),
    }
}

fn print_policies(config: &AppConfig, raw: bool) -> Result<()> {
    let (iam, _) = http::install_iam(config).context("failed to install IAM interceptor")?;
    let output = if raw {
        serde_json::to_string_pretty(&iam.raw_policies())?
    } else {
        serde_json::to_string_pretty(&iam.policies())?
    };
    println!("{output}");
    Ok(())
}
