use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "compsoc",
    version,
    about = "CompSoc identity bridge operator tools",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Bridge configuration file (JSON or TOML). Defaults to the standard locations.
    #[arg(short, long, global = true, env = "COMPSOC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Issue, verify and inspect bearer tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Read-only directory queries
    Directory {
        #[command(subcommand)]
        command: DirectoryCommands,
    },

    /// Configuration checks
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Sign a token for a member, stamped with their current privileges
    Issue {
        /// Subject (the member's uid)
        subject: String,

        /// Lifetime in seconds
        #[arg(long, default_value = "3600")]
        ttl: i64,

        /// Extra claim as name=value; repeatable
        #[arg(long = "claim", value_name = "NAME=VALUE")]
        claims: Vec<String>,

        /// Output only the token without any formatting (useful for piping)
        #[arg(long)]
        token_only: bool,
    },

    /// Verify a token against every trusted issuer
    Verify {
        /// The token to verify (reads from stdin if not provided)
        token: Option<String>,
    },

    /// Decode a token without checking it
    Inspect {
        /// The token to decode (reads from stdin if not provided)
        token: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DirectoryCommands {
    /// Show a person or society entry
    Lookup {
        uid: String,

        /// Look in the societies OU instead of people
        #[arg(long)]
        society: bool,
    },

    /// Show admin and committee privileges for a uid
    Privileges { uid: String },

    /// List every group and its members
    Groups,

    /// Show the uidNumber the next registration would get
    NextId,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Load and validate the configuration, then print it with secrets hidden
    Check,
}
