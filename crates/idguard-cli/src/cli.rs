use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "idguard")]
#[command(about = "idguard: verify identity tokens and manage service credentials")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file (endpoints, caching, optional [identity] section)
    #[arg(short, long, global = true, env = "IDGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "IDGUARD_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print a fresh access token for the service identity
    Token,
    /// Verify an identity token
    VerifyIdToken(VerifyArgs),
    /// Verify a session cookie
    VerifySession(VerifyArgs),
    /// Exchange an identity token for a session cookie
    IssueCookie(IssueCookieArgs),
    /// Revoke every session of a user
    Revoke(RevokeArgs),
    /// Set the role claim of a user
    SetRole(SetRoleArgs),
}

#[derive(Debug, clap::Args)]
pub struct VerifyArgs {
    /// The token or cookie value
    pub token: String,
    /// Also check the directory for revocation and disabled accounts
    #[arg(long)]
    pub check_revoked: bool,
}

#[derive(Debug, clap::Args)]
pub struct IssueCookieArgs {
    /// A valid identity token
    pub id_token: String,
    /// Cookie lifetime (e.g. 1h, 5d); clamped to 1 minute..14 days
    #[arg(long, default_value = "5d", value_parser = humantime::parse_duration)]
    pub lifetime: Duration,
}

#[derive(Debug, clap::Args)]
pub struct RevokeArgs {
    /// User id
    pub uid: String,
}

#[derive(Debug, clap::Args)]
pub struct SetRoleArgs {
    /// User id
    pub uid: String,
    /// Role to assign
    pub role: String,
}
