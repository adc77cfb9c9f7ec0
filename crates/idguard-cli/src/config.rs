use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use idguard_auth::credentials::{ENV_CLIENT_EMAIL, ENV_PRIVATE_KEY, ENV_PROJECT_ID};
use idguard_auth::{IdentityConfig, ServiceIdentity};

/// Optional `[identity]` table of the configuration file. Environment
/// variables take precedence over it.
#[derive(Debug, Default, Deserialize)]
pub struct IdentitySection {
    pub project_id: Option<String>,
    pub client_email: Option<String>,
    /// Base64-encoded PEM private key.
    pub private_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityFile {
    #[serde(default)]
    identity: IdentitySection,
}

pub struct LoadedConfig {
    pub engine: IdentityConfig,
    pub identity: IdentitySection,
}

pub fn load(path: Option<&Path>) -> Result<LoadedConfig> {
    let Some(path) = path else {
        return Ok(LoadedConfig {
            engine: IdentityConfig::default(),
            identity: IdentitySection::default(),
        });
    };

    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file {}", path.display()))?;
    parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

fn parse(text: &str) -> Result<LoadedConfig> {
    let engine = IdentityConfig::from_toml_str(text)?;
    engine.validate()?;
    let file: IdentityFile = toml::from_str(text)?;
    Ok(LoadedConfig {
        engine,
        identity: file.identity,
    })
}

/// Resolves one identity value: environment first, then the config file.
fn lookup<E>(env: &E, section: &IdentitySection, name: &str) -> Option<String>
where
    E: Fn(&str) -> Option<String>,
{
    env(name).filter(|v| !v.trim().is_empty()).or_else(|| match name {
        ENV_PROJECT_ID => section.project_id.clone(),
        ENV_CLIENT_EMAIL => section.client_email.clone(),
        ENV_PRIVATE_KEY => section.private_key.clone(),
        _ => None,
    })
}

pub fn load_identity(section: &IdentitySection) -> Result<ServiceIdentity> {
    let env = |name: &str| std::env::var(name).ok();
    ServiceIdentity::from_lookup(|name| lookup(&env, section, name)).context(
        "Service identity is not configured. Set IDGUARD_PROJECT_ID, IDGUARD_CLIENT_EMAIL and \
         IDGUARD_PRIVATE_KEY, or add an [identity] section to the config file",
    )
}
