use crate::cli::TokenCommands;
use crate::error::{CliError, Result};
use crate::load_config;
use chrono::{Duration, Utc};
use colored::Colorize;
use compsoc_identity::{Claims, IdentityBridge};
use compsoc_token::{decode_unverified_header, decode_unverified_payload, TokenError};
use serde_json::{json, Value};
use std::io::Read;
use std::path::Path;

pub async fn handle_token_command(
    command: TokenCommands,
    config_path: Option<&Path>,
    json_output: bool,
    verbose: bool,
) -> Result<()> {
    match command {
        TokenCommands::Issue {
            subject,
            ttl,
            claims,
            token_only,
        } => issue(config_path, subject, ttl, claims, token_only, json_output).await,

        TokenCommands::Verify { token } => {
            verify(config_path, read_token(token)?, json_output, verbose).await
        }

        TokenCommands::Inspect { token } => inspect(&read_token(token)?, json_output),
    }
}

/// Use the token given on the command line, or read it from stdin.
fn read_token(token: Option<String>) -> Result<String> {
    let token = match token {
        Some(token) => token,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(CliError::InvalidInput("no token given".to_string()));
    }
    Ok(token.to_string())
}

/// `name=value`; the value is taken as JSON when it parses, otherwise as a string.
fn parse_claim(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| CliError::InvalidInput(format!("claim must be NAME=VALUE: {raw}")))?;
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

async fn issue(
    config_path: Option<&Path>,
    subject: String,
    ttl: i64,
    extra: Vec<String>,
    token_only: bool,
    json_output: bool,
) -> Result<()> {
    if ttl <= 0 {
        return Err(CliError::InvalidInput("ttl must be positive".to_string()));
    }

    let config = load_config(config_path)?;
    let bridge = IdentityBridge::from_config(&config)?;

    let mut claims = Claims::new(subject.as_str(), Utc::now() + Duration::seconds(ttl));
    for raw in &extra {
        let (name, value) = parse_claim(raw)?;
        claims = claims.with_claim(name, value);
    }

    let token = bridge.tokens().issue(claims).await?;

    if token_only {
        println!("{token}");
    } else if json_output {
        let output = json!({
            "success": true,
            "subject": subject,
            "expires_in": ttl,
            "token": token,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", "✓ Token issued".green());
        println!("  Subject: {}", subject.bright_cyan());
        println!("  Expires in: {ttl}s");
        println!("\n{token}");
    }

    Ok(())
}

async fn verify(
    config_path: Option<&Path>,
    token: String,
    json_output: bool,
    verbose: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let bridge = IdentityBridge::from_config(&config)?;

    // The precise cause is only shown with --verbose
    match bridge.tokens().verifier().diagnose(&token, Utc::now()).await {
        Ok(verified) => {
            let claims = verified.claims();
            if json_output {
                let output = json!({
                    "success": true,
                    "valid": true,
                    "issuer": verified.issuer(),
                    "subject": verified.subject(),
                    "is_admin": claims.is_admin(),
                    "is_committee": claims.is_committee(),
                    "claims": claims,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", "✓ Token is valid!".green());
                println!("  Issuer:  {}", verified.issuer());
                println!("  Subject: {}", verified.subject().bright_cyan());
                println!("  Admin: {}  Committee: {}", claims.is_admin(), claims.is_committee());
                if verbose {
                    println!("{}", serde_json::to_string_pretty(claims)?);
                }
            }
            Ok(())
        }
        Err(e) => {
            let reason = if verbose {
                e.to_string()
            } else {
                "invalid token".to_string()
            };
            if json_output {
                let output = json!({
                    "success": false,
                    "valid": false,
                    "error": reason,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{} Token verification failed: {reason}", "✗".red());
            }
            Err(CliError::Token(if verbose { e } else { TokenError::Invalid }))
        }
    }
}

fn inspect(token: &str, json_output: bool) -> Result<()> {
    let header = decode_unverified_header(token)?;
    let payload = decode_unverified_payload(token)?;

    if json_output {
        let output = json!({ "header": header, "payload": payload });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", "! Signature NOT checked".yellow());
        println!("Header:\n{}", serde_json::to_string_pretty(&header)?);
        println!("Payload:\n{}", serde_json::to_string_pretty(&payload)?);
    }

    Ok(())
}
