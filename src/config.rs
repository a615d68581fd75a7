// src/config.rs
//! Environment configuration. Binaries call `dotenvy::dotenv()` first so a
//! local `.env` works in development; in production the variables come from
//! the process environment. Configuration errors abort the run.

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Push hub
    pub hub_user: String,
    pub hub_password: String,
    pub hub_url: String,
    pub callback_url: String,
    pub webhook_port: u16,

    // Processing
    pub process_delay_seconds: u64,
    pub storage_ttl_seconds: u64,
    pub batch_limit: i64,
    pub database_path: String,

    // Rewrite endpoint
    pub rewrite_base_url: String,
    pub rewrite_api_keys: Vec<String>,
    pub rewrite_model: String,
    pub tone_hint: Option<String>,

    // Platforms
    pub platforms: Vec<String>,
    pub photo_account_ids: Vec<String>,
    pub photo_account_tokens: Vec<String>,
    pub text_bearer_tokens: Vec<String>,

    // Pull mode
    pub feeds: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            hub_user: env_str("HUB_USER"),
            hub_password: env_str("HUB_PASSWORD"),
            hub_url: env_or("HUB_URL", "https://push.superfeedr.com"),
            callback_url: env_str("CALLBACK_URL"),
            webhook_port: env_parse("WEBHOOK_PORT", 8000)?,
            process_delay_seconds: env_parse("PROCESS_DELAY_SECONDS", 15)?,
            storage_ttl_seconds: env_parse("STORAGE_TTL_SECONDS", 86_400)?,
            batch_limit: env_parse("BATCH_LIMIT", 50)?,
            database_path: env_or("DATABASE_PATH", "feedrelay.sqlite3"),
            rewrite_base_url: env_str("REWRITE_BASE_URL"),
            rewrite_api_keys: env_list("REWRITE_API_KEYS"),
            rewrite_model: env_or("REWRITE_MODEL", "llama-3.3-70b-versatile"),
            tone_hint: Some(env_str("TONE_HINT")).filter(|s| !s.is_empty()),
            platforms: env_list("PLATFORMS")
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            photo_account_ids: env_list("PHOTO_ACCOUNT_IDS"),
            photo_account_tokens: env_list("PHOTO_ACCOUNT_TOKENS"),
            text_bearer_tokens: env_list("TEXT_BEARER_TOKENS"),
            feeds: env_list("FEEDS"),
        };
        if cfg.batch_limit <= 0 {
            bail!("BATCH_LIMIT must be positive (got {})", cfg.batch_limit);
        }
        Ok(cfg)
    }

    /// The rewrite endpoint is required by both operating modes.
    pub fn require_rewrite(&self) -> Result<()> {
        if self.rewrite_base_url.is_empty() {
            bail!("REWRITE_BASE_URL is not set");
        }
        if self.rewrite_api_keys.is_empty() {
            bail!("REWRITE_API_KEYS is empty");
        }
        Ok(())
    }

    /// Hub credentials and callback, required by push mode and the
    /// subscription manager.
    pub fn require_hub(&self) -> Result<()> {
        if self.hub_user.is_empty() || self.hub_password.is_empty() {
            bail!("HUB_USER and HUB_PASSWORD must be set");
        }
        if self.callback_url.is_empty() {
            bail!("CALLBACK_URL must be set (e.g. https://example.com/webhook)");
        }
        Ok(())
    }
}

fn env_str(key: &str) -> String {
    std::env::var(key).unwrap_or_default().trim().to_string()
}

fn env_or(key: &str, default: &str) -> String {
    let v = env_str(key);
    if v.is_empty() {
        default.to_string()
    } else {
        v
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let v = env_str(key);
    if v.is_empty() {
        return Ok(default);
    }
    v.parse::<T>().with_context(|| format!("parsing {key}={v}"))
}

/// Comma-separated list: trimmed, empties dropped.
fn env_list(key: &str) -> Vec<String> {
    env_str(key)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn list_parsing_trims_and_drops_empties() {
        env::set_var("FEEDRELAY_TEST_LIST", " a , , b,c ,");
        assert_eq!(env_list("FEEDRELAY_TEST_LIST"), vec!["a", "b", "c"]);
        env::remove_var("FEEDRELAY_TEST_LIST");
        assert!(env_list("FEEDRELAY_TEST_LIST").is_empty());
    }

    #[test]
    fn non_positive_batch_limit_is_rejected() {
        env::set_var("BATCH_LIMIT", "-5");
        assert!(AppConfig::from_env().is_err());
        env::set_var("BATCH_LIMIT", "0");
        assert!(AppConfig::from_env().is_err());
        env::remove_var("BATCH_LIMIT");
        assert_eq!(AppConfig::from_env().unwrap().batch_limit, 50);
    }

    #[test]
    fn parse_falls_back_to_default_and_rejects_garbage() {
        env::remove_var("FEEDRELAY_TEST_PORT");
        assert_eq!(env_parse("FEEDRELAY_TEST_PORT", 8000u16).unwrap(), 8000);
        env::set_var("FEEDRELAY_TEST_PORT", "9001");
        assert_eq!(env_parse("FEEDRELAY_TEST_PORT", 8000u16).unwrap(), 9001);
        env::set_var("FEEDRELAY_TEST_PORT", "not-a-port");
        assert!(env_parse("FEEDRELAY_TEST_PORT", 8000u16).is_err());
        env::remove_var("FEEDRELAY_TEST_PORT");
    }
}
