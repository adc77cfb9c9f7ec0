use anyhow::Result;
use colored::Colorize;
use idguard_auth::{AuthError, IdentityService, TokenKind, VerificationResult};

use crate::cli::{OutputFormat, VerifyArgs};
use crate::output::{print_success, print_value};

pub async fn verify(
    service: &IdentityService,
    kind: TokenKind,
    args: &VerifyArgs,
    format: OutputFormat,
) -> Result<()> {
    let result = match kind {
        TokenKind::IdToken => service.verify_id_token(&args.token, args.check_revoked).await,
        TokenKind::SessionCookie => {
            service
                .verify_session_cookie(&args.token, args.check_revoked)
                .await
        }
    };

    let verified = result.map_err(|e| rejection(kind, &e))?;
    print_result(&verified, format)?;
    print_success(&format!("{kind} is valid for {}", verified.subject_id.cyan()));
    Ok(())
}

fn rejection(kind: TokenKind, err: &AuthError) -> anyhow::Error {
    if err.is_verification_failure() {
        anyhow::anyhow!("{kind} rejected [{}]: {err}", err.category())
    } else {
        anyhow::anyhow!("{kind} could not be verified [{}]: {err}", err.category())
    }
}

fn print_result(verified: &VerificationResult, format: OutputFormat) -> Result<()> {
    let value = serde_json::to_value(verified)?;
    print_value(&value, format);
    Ok(())
}
