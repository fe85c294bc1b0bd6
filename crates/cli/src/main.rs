mod config;
mod logging;
mod serve;

use std::path::PathBuf;
use std::process;

use caseflow_engine::flags::{FlagDefinition, FLAG_REGISTRY};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Case stage transition service.
#[derive(Parser)]
#[command(name = "caseflow", version, about = "Case stage transition service")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Port to listen on (overrides config and CASEFLOW_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// JSON file of cases, tasks and flags to pre-load
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// List the registered feature flags and their defaults
    Registry,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, seed } => {
            logging::init();
            let mut config = match Config::load(config.as_deref()) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(1);
                }
            };
            if let Some(port) = port {
                config.server.port = port;
            }

            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {e}");
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config, seed)) {
                tracing::error!(error = %e, "server error");
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::Registry => cmd_registry(FLAG_REGISTRY, cli.output),
    }
}

fn cmd_registry(registry: &[FlagDefinition], output: OutputFormat) {
    match output {
        OutputFormat::Json => {
            let flags: Vec<serde_json::Value> = registry
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "key": d.key,
                        "name": d.name,
                        "description": d.description,
                        "defaultValue": d.default_value,
                        "version": d.version,
                        "createdAt": d.created_at,
                        "owner": d.owner,
                    })
                })
                .collect();
            match serde_json::to_string_pretty(&serde_json::json!({ "flags": flags })) {
                Ok(s) => println!("{s}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(1);
                }
            }
        }
        OutputFormat::Text => {
            for d in registry {
                println!(
                    "{}  default={}  v{}  owner={}",
                    d.key, d.default_value, d.version, d.owner
                );
                println!("    {}", d.description);
            }
        }
    }
}
