//! Usage Limits Client (spec §4.12): reads an OAuth token, queries the
//! upstream usage endpoint, and memoizes the result for 30 s. Every failure
//! mode collapses to `None` — this is a best-effort status ping, never a
//! dependency the rest of the daemon blocks on.

use std::time::Duration;

use fs_err as fs;
use serde::Deserialize;
use tracing::debug;

const MEMO_TTL_MS: i64 = 30_000;
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
const UPSTREAM_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const TOKEN_ENV_VAR: &str = "CLAUDE_CODE_OAUTH_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct UsageSnapshot {
    pub five_hour_limit_percent: Option<f64>,
    pub seven_day_limit_percent: Option<f64>,
    pub resets_at: Option<String>,
}

fn credentials_file_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join(".credentials.json"))
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(rename = "oauthToken")]
    oauth_token: Option<String>,
}

fn read_token_from_credentials_file() -> Option<String> {
    let path = credentials_file_path()?;
    let content = fs::read_to_string(path).ok()?;
    let parsed: CredentialsFile = serde_json::from_str(&content).ok()?;
    parsed.oauth_token.filter(|t| !t.is_empty())
}

#[cfg(target_os = "macos")]
fn read_token_from_keychain() -> Option<String> {
    use std::process::Command;
    let output = Command::new("security")
        .args(["find-generic-password", "-s", "Claude Code", "-w"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(not(target_os = "macos"))]
fn read_token_from_keychain() -> Option<String> {
    None
}

fn read_token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty())
}

/// Resolves an OAuth token in priority order: credentials file, platform
/// keychain, environment variable.
pub fn resolve_oauth_token() -> Option<String> {
    read_token_from_credentials_file()
        .or_else(read_token_from_keychain)
        .or_else(read_token_from_env)
}

pub struct UsageClient {
    client: reqwest::Client,
    cached: Option<(i64, Option<UsageSnapshot>)>,
}

impl UsageClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, cached: None }
    }

    /// Returns the memoized snapshot if still within TTL, otherwise queries
    /// upstream. Never returns an `Err` — any failure collapses to `None`.
    pub async fn get_usage(&mut self, now_ms: i64) -> Option<UsageSnapshot> {
        if let Some((fetched_at, snapshot)) = &self.cached {
            if now_ms - fetched_at < MEMO_TTL_MS {
                return snapshot.clone();
            }
        }

        let snapshot = self.fetch(now_ms).await;
        self.cached = Some((now_ms, snapshot.clone()));
        snapshot
    }

    async fn fetch(&self, _now_ms: i64) -> Option<UsageSnapshot> {
        let token = resolve_oauth_token()?;

        let response = self
            .client
            .get(UPSTREAM_URL)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| debug!(error = %err, "usage limits request failed"))
            .ok()?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "usage limits request returned non-success");
            return None;
        }

        response.json::<UsageSnapshot>().await.ok()
    }
}

impl Default for UsageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_token_is_used_when_no_credentials_file_exists() {
        std::env::set_var(TOKEN_ENV_VAR, "test-token-value");
        let token = read_token_from_env();
        assert_eq!(token.as_deref(), Some("test-token-value"));
        std::env::remove_var(TOKEN_ENV_VAR);
    }

    #[test]
    fn empty_env_token_is_treated_as_absent() {
        std::env::set_var(TOKEN_ENV_VAR, "");
        assert!(read_token_from_env().is_none());
        std::env::remove_var(TOKEN_ENV_VAR);
    }
}
