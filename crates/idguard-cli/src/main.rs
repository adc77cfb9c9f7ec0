mod cli;
mod commands;
mod config;
mod logging;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use idguard_auth::{IdentityService, TokenKind};
use output::print_error;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level);

    let loaded = config::load(cli.config.as_deref())?;
    tracing::debug!(config = ?cli.config, "Loaded configuration");
    let identity = config::load_identity(&loaded.identity)?;
    let service = IdentityService::new(&loaded.engine, identity)?;
    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::Token => commands::token::token(&service).await?,
        Commands::VerifyIdToken(args) => {
            commands::verify::verify(&service, TokenKind::IdToken, args, format).await?;
        }
        Commands::VerifySession(args) => {
            commands::verify::verify(&service, TokenKind::SessionCookie, args, format).await?;
        }
        Commands::IssueCookie(args) => {
            commands::account::issue_cookie(&service, &args.id_token, args.lifetime).await?;
        }
        Commands::Revoke(args) => commands::account::revoke(&service, &args.uid).await?,
        Commands::SetRole(args) => {
            commands::account::set_role(&service, &args.uid, &args.role).await?;
        }
    }

    Ok(())
}
