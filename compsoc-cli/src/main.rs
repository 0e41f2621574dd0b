mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands, ConfigCommands};
use colored::Colorize;
use compsoc_config::{try_load_default_config, BridgeConfig};
use compsoc_identity::init_tracing;
use error::{CliError, Result};
use serde_json::Value;
use std::path::Path;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    match cli.command {
        Commands::Token { command } => {
            commands::handle_token_command(command, cli.config.as_deref(), cli.json, cli.verbose)
                .await
        }
        Commands::Directory { command } => {
            let config = load_config(cli.config.as_deref())?;
            commands::handle_directory_command(command, &config, cli.json).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Check => check_config(cli.config.as_deref(), cli.json),
        },
    }
}

/// Load the configuration from `path`, or from the standard locations.
pub(crate) fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => Ok(BridgeConfig::load(path)?),
        None => try_load_default_config().ok_or(CliError::NoConfig),
    }
}

const SECRETS: &[(&str, &str)] = &[
    ("signing_key", "password"),
    ("google", "client_secret"),
    ("keycloak", "client_secret"),
    ("ldap", "bind_password"),
    ("portal", "password"),
];

fn check_config(path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_config(path)?;
    config.validate()?;

    let mut shown = serde_json::to_value(&config)?;
    for (section, field) in SECRETS {
        if let Some(value) = shown.get_mut(*section).and_then(|s| s.get_mut(*field)) {
            if !value.is_null() {
                *value = Value::String("********".to_string());
            }
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else {
        println!("{}", "✓ Configuration is valid".green());
        println!("  Issuer:   {}", config.home_url.bright_cyan());
        println!("  Keycloak: {}", config.keycloak.realm_url);
        println!("  LDAP:     {} ({})", config.ldap.url, config.ldap.base_dn);
        println!(
            "  Portal:   {}",
            config
                .portal
                .as_ref()
                .map(|p| p.endpoint.as_str())
                .unwrap_or("(not set)")
        );
        println!("{}", serde_json::to_string_pretty(&shown)?);
    }

    Ok(())
}
