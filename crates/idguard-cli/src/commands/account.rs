use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use idguard_auth::IdentityService;

use crate::output::print_success;

pub async fn issue_cookie(
    service: &IdentityService,
    id_token: &str,
    lifetime: Duration,
) -> Result<()> {
    let cookie = service
        .issue_session_cookie(id_token, lifetime)
        .await
        .context("Failed to issue a session cookie")?;
    println!("{cookie}");
    print_success(&format!(
        "Issued session cookie (requested lifetime {})",
        humantime::format_duration(lifetime)
    ));
    Ok(())
}

pub async fn revoke(service: &IdentityService, uid: &str) -> Result<()> {
    service
        .revoke_sessions_for(uid)
        .await
        .with_context(|| format!("Failed to revoke sessions for {uid}"))?;
    print_success(&format!("Revoked all sessions for {}", uid.cyan()));
    Ok(())
}

pub async fn set_role(service: &IdentityService, uid: &str, role: &str) -> Result<()> {
    service
        .set_role_claim(uid, role)
        .await
        .with_context(|| format!("Failed to set role for {uid}"))?;
    print_success(&format!("Set role of {} to {}", uid.cyan(), role.green()));
    Ok(())
}
