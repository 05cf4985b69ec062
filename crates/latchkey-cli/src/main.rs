//! Latchkey CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands};
use config::CliConfig;
use handlers::TokenArgs;

#[derive(Parser)]
#[command(name = "latchkey")]
#[command(author, version, about = "Resolve secret references and issue local tokens", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => handlers::keygen()?,
        Commands::Encrypt { plaintext, key } => {
            let config = CliConfig::load()?;
            handlers::encrypt(&config, &plaintext, key)?
        }
        Commands::Resolve { value, name } => {
            let config = CliConfig::load()?;
            handlers::resolve(&config, &value, name).await?
        }
        Commands::ResolveFile { path } => {
            let config = CliConfig::load()?;
            handlers::resolve_file(&config, &path).await?
        }
        Commands::Token {
            algorithm,
            key_file,
            key_ref,
            issuer,
            audience,
            subject,
            name,
            role,
            client_id,
            kid,
            lifetime,
            claims,
        } => {
            let config = CliConfig::load()?;
            let args = TokenArgs {
                algorithm,
                key_file,
                key_ref,
                issuer,
                audience,
                subject,
                name,
                role,
                client_id,
                kid,
                lifetime,
                claims,
            };
            handlers::token(&config, args).await?
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&CliConfig::load()?)?,
            ConfigCommands::Path => handlers::config_path()?,
        },
    }

    Ok(())
}
