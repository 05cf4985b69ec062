//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new base64 AES-256 key
    Keygen,

    /// Encrypt a value into an enc:// reference
    Encrypt {
        /// Plaintext to encrypt
        plaintext: String,

        /// Base64 key (defaults to the configured encryption key)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Resolve a literal or secret reference
    Resolve {
        /// Value to resolve, e.g. env://HOME or kv://db-password
        value: String,

        /// Logical setting name used in messages
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Resolve every value in a YAML settings file
    ResolveFile {
        /// Path to the settings file
        path: PathBuf,
    },

    /// Issue a locally signed token
    Token {
        /// Signing algorithm (RS256 or ES256)
        #[arg(short, long)]
        algorithm: Option<String>,

        /// PEM file holding the private key
        #[arg(long, conflicts_with = "key_ref")]
        key_file: Option<PathBuf>,

        /// Secret reference resolving to the PEM private key
        #[arg(long)]
        key_ref: Option<String>,

        /// Issuer claim
        #[arg(long)]
        issuer: Option<String>,

        /// Audience claim
        #[arg(long)]
        audience: Option<String>,

        /// Subject claim
        #[arg(long)]
        subject: Option<String>,

        /// Display name claim
        #[arg(long)]
        name: Option<String>,

        /// Role claim
        #[arg(long)]
        role: Option<String>,

        /// Client id, emitted as azp
        #[arg(long)]
        client_id: Option<String>,

        /// Key id header
        #[arg(long)]
        kid: Option<String>,

        /// Lifetime in minutes (5-240)
        #[arg(short, long)]
        lifetime: Option<i64>,

        /// Extra claim as key=value (repeatable)
        #[arg(long = "claim", value_name = "KEY=VALUE")]
        claims: Vec<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,
}
