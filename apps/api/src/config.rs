use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::PatchConfig;
use crate::llm_client::gemini::{DEFAULT_BASE_URL, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};

/// Application configuration loaded from environment variables.
/// Fails at startup if the API key is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub patch_max_retries: u32,
    pub patch_retry_base_ms: u64,
    pub patch_reject_identical: bool,
    pub max_upload_bytes: usize,
    pub session_ttl_secs: u64,
    pub session_sweep_secs: u64,
    /// `["*"]` allows any origin.
    pub cors_allowed_origins: Vec<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            gemini_base_url: env_or("GEMINI_BASE_URL", DEFAULT_BASE_URL),
            gemini_text_model: env_or("GEMINI_TEXT_MODEL", DEFAULT_TEXT_MODEL),
            gemini_image_model: env_or("GEMINI_IMAGE_MODEL", DEFAULT_IMAGE_MODEL),
            patch_max_retries: env_or("PATCH_MAX_RETRIES", "2")
                .parse::<u32>()
                .context("PATCH_MAX_RETRIES must be a non-negative integer")?,
            patch_retry_base_ms: env_or("PATCH_RETRY_BASE_MS", "1000")
                .parse::<u64>()
                .context("PATCH_RETRY_BASE_MS must be a number of milliseconds")?,
            patch_reject_identical: env_or("PATCH_REJECT_IDENTICAL", "true")
                .parse::<bool>()
                .context("PATCH_REJECT_IDENTICAL must be 'true' or 'false'")?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", "41943040")
                .parse::<usize>()
                .context("MAX_UPLOAD_BYTES must be a number of bytes")?,
            session_ttl_secs: env_or("SESSION_TTL_SECS", "3600")
                .parse::<u64>()
                .context("SESSION_TTL_SECS must be a number of seconds")?,
            session_sweep_secs: env_or("SESSION_SWEEP_SECS", "60")
                .parse::<u64>()
                .context("SESSION_SWEEP_SECS must be a number of seconds")?,
            cors_allowed_origins: parse_list(&env_or("CORS_ALLOWED_ORIGINS", "*")),
            port: env_or("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_sweep_period(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs.max(1))
    }

    pub fn patch_config(&self) -> PatchConfig {
        PatchConfig {
            max_retries: self.patch_max_retries,
            retry_base_delay: Duration::from_millis(self.patch_retry_base_ms),
            reject_identical_output: self.patch_reject_identical,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_trims_and_skips_empty() {
        assert_eq!(
            parse_list(" https://a.example , ,https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(parse_list("*"), vec!["*"]);
        assert!(parse_list("").is_empty());
    }
}
