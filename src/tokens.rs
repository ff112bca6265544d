//! Password-reset token lifecycle: issued -> valid -> (consumed | expired).

use base64::Engine as _;
use chrono::{Duration, Utc};
use rand::RngCore;

use crate::models::{Id, ResetToken};
use crate::repo::{Repo, RepoResult};

/// Tokens are honoured for one hour after issuance.
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Generate an unguessable URL-safe token from 32 bytes of OS entropy.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Issue a fresh token for `user_id` with the standard TTL.
pub async fn issue(repo: &dyn Repo, user_id: Id) -> RepoResult<String> {
    issue_with_ttl(repo, user_id, Duration::seconds(TOKEN_TTL_SECS)).await
}

/// Issue with an explicit TTL. Exposed so expiry behaviour can be exercised
/// without sleeping for an hour.
pub async fn issue_with_ttl(repo: &dyn Repo, user_id: Id, ttl: Duration) -> RepoResult<String> {
    let token = generate_token();
    let now = Utc::now();
    repo.insert_reset_token(ResetToken {
        token: token.clone(),
        user_id,
        created_at: now,
        expires_at: now + ttl,
    })
    .await?;
    Ok(token)
}

/// Resolve a token to its owning user. Returns `None` for unknown and for
/// expired tokens alike; callers must not be able to tell the two apart.
pub async fn validate(repo: &dyn Repo, token: &str) -> Option<Id> {
    match repo.get_reset_token(token).await {
        Ok(record) if Utc::now() < record.expires_at => Some(record.user_id),
        _ => None,
    }
}

/// Delete the token record. Idempotent: consuming an already-gone token is a
/// no-op.
pub async fn consume(repo: &dyn Repo, token: &str) -> RepoResult<()> {
    repo.delete_reset_token(token).await
}
