use anyhow::{Context, Result};
use idguard_auth::IdentityService;

pub async fn token(service: &IdentityService) -> Result<()> {
    let token = service
        .access_token()
        .await
        .context("Failed to obtain an access token")?;
    println!("{token}");
    Ok(())
}
