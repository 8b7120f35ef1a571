//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./outpost.toml";
const ENV_PREFIX: &str = "OUTPOST";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub image_generation: ImageGenerationConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 0 disables the per-attempt timeout
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_fixed_hashtag")]
    pub fixed_hashtag: String,

    #[serde(default = "default_category")]
    pub default_category: String,

    #[serde(default = "default_max_category_tags")]
    pub max_category_tags: usize,

    #[serde(default = "default_true")]
    pub attach_media: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// "x" for the real API, "stub" for offline runs
    #[serde(default = "default_platform_provider")]
    pub provider: String,

    #[serde(default = "default_platform_base_url")]
    pub base_url: String,

    #[serde(default = "default_consumer_key_env")]
    pub consumer_key_env: String,

    #[serde(default = "default_consumer_secret_env")]
    pub consumer_secret_env: String,

    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    #[serde(default = "default_access_token_secret_env")]
    pub access_token_secret_env: String,

    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationConfig {
    /// Providers tried in order (dalle, together, stub)
    #[serde(default = "default_image_providers")]
    pub providers: Vec<String>,

    #[serde(default = "default_dalle_config")]
    pub dalle: ImageProviderConfig,

    #[serde(default = "default_together_config")]
    pub together: ImageProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageProviderConfig {
    pub base_url: String,

    pub model: String,

    pub api_key_env: String,

    #[serde(default = "default_image_width")]
    pub width: u32,

    #[serde(default = "default_image_height")]
    pub height: u32,

    #[serde(default = "default_image_steps")]
    pub steps: u32,

    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: String,
}

// Default value functions
fn default_state_db_path() -> PathBuf {
    PathBuf::from("./outpost.sqlite")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    2
}

fn default_attempt_timeout() -> u64 {
    120
}

fn default_max_chars() -> usize {
    280
}

fn default_fixed_hashtag() -> String {
    "#ChinaEV".to_string()
}

fn default_category() -> String {
    "EV News".to_string()
}

fn default_max_category_tags() -> usize {
    3
}

fn default_platform_provider() -> String {
    "x".to_string()
}

fn default_platform_base_url() -> String {
    "https://api.x.com".to_string()
}

fn default_consumer_key_env() -> String {
    "X_CONSUMER_KEY".to_string()
}

fn default_consumer_secret_env() -> String {
    "X_CONSUMER_SECRET".to_string()
}

fn default_access_token_env() -> String {
    "X_ACCESS_TOKEN".to_string()
}

fn default_access_token_secret_env() -> String {
    "X_ACCESS_TOKEN_SECRET".to_string()
}

fn default_max_image_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_http_timeout() -> u64 {
    30
}

fn default_image_providers() -> Vec<String> {
    vec!["dalle".to_string(), "together".to_string()]
}

fn default_image_width() -> u32 {
    1024
}

fn default_image_height() -> u32 {
    1024
}

fn default_image_steps() -> u32 {
    4
}

fn default_image_timeout() -> u64 {
    90
}

fn default_dalle_config() -> ImageProviderConfig {
    ImageProviderConfig {
        base_url: "https://api.openai.com/v1".to_string(),
        model: "dall-e-3".to_string(),
        api_key_env: "OPENAI_API_KEY".to_string(),
        width: default_image_width(),
        height: default_image_height(),
        steps: default_image_steps(),
        timeout_secs: default_image_timeout(),
    }
}

fn default_together_config() -> ImageProviderConfig {
    ImageProviderConfig {
        base_url: "https://api.together.xyz/v1".to_string(),
        model: "black-forest-labs/FLUX.1-schnell".to_string(),
        api_key_env: "TOGETHER_API_KEY".to_string(),
        width: default_image_width(),
        height: 768,
        steps: default_image_steps(),
        timeout_secs: default_image_timeout(),
    }
}

fn default_webhook_url_env() -> String {
    "DISCORD_WEBHOOK_URL".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_db_path: default_state_db_path(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            max_chars: default_max_chars(),
            fixed_hashtag: default_fixed_hashtag(),
            default_category: default_category(),
            max_category_tags: default_max_category_tags(),
            attach_media: default_true(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            provider: default_platform_provider(),
            base_url: default_platform_base_url(),
            consumer_key_env: default_consumer_key_env(),
            consumer_secret_env: default_consumer_secret_env(),
            access_token_env: default_access_token_env(),
            access_token_secret_env: default_access_token_secret_env(),
            max_image_bytes: default_max_image_bytes(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for ImageGenerationConfig {
    fn default() -> Self {
        Self {
            providers: default_image_providers(),
            dalle: default_dalle_config(),
            together: default_together_config(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url_env: default_webhook_url_env(),
        }
    }
}

impl PlatformConfig {
    /// Credential env vars as (name, value-env) pairs
    pub fn credential_envs(&self) -> [(&'static str, &str); 4] {
        [
            ("consumer_key", self.consumer_key_env.as_str()),
            ("consumer_secret", self.consumer_secret_env.as_str()),
            ("access_token", self.access_token_env.as_str()),
            ("access_token_secret", self.access_token_secret_env.as_str()),
        ]
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.publish.max_attempts == 0 {
            anyhow::bail!("publish.max_attempts must be at least 1");
        }
        if self.publish.max_chars == 0 {
            anyhow::bail!("publish.max_chars must be greater than 0");
        }
        match self.platform.provider.as_str() {
            "x" | "stub" => {}
            other => anyhow::bail!("Unknown platform provider: {}", other),
        }
        for provider in &self.image_generation.providers {
            match provider.as_str() {
                "dalle" | "together" | "stub" => {}
                other => anyhow::bail!("Unknown image generation provider: {}", other),
            }
        }
        Ok(())
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r##"# outpost configuration

[general]
state_db_path = "./outpost.sqlite"
log_level = "info"

[publish]
# Automatic attempts stop here; manual retries are not capped
max_attempts = 2
# Bound on media resolution + publish call, 0 disables
attempt_timeout_secs = 120
max_chars = 280
fixed_hashtag = "#ChinaEV"
default_category = "EV News"
max_category_tags = 3
attach_media = true

[platform]
provider = "x"  # x, stub
base_url = "https://api.x.com"
consumer_key_env = "X_CONSUMER_KEY"
consumer_secret_env = "X_CONSUMER_SECRET"
access_token_env = "X_ACCESS_TOKEN"
access_token_secret_env = "X_ACCESS_TOKEN_SECRET"
max_image_bytes = 5242880
http_timeout_secs = 30

[image_generation]
# Tried in order when no post image uploads
providers = ["dalle", "together"]

[image_generation.dalle]
base_url = "https://api.openai.com/v1"
model = "dall-e-3"
api_key_env = "OPENAI_API_KEY"
width = 1024
height = 1024

[image_generation.together]
base_url = "https://api.together.xyz/v1"
model = "black-forest-labs/FLUX.1-schnell"
api_key_env = "TOGETHER_API_KEY"
width = 1024
height = 768
steps = 4

[notify]
enabled = false
webhook_url_env = "DISCORD_WEBHOOK_URL"
"##
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert_eq!(config.publish.max_attempts, 2);
        assert_eq!(config.publish.max_chars, 280);
        assert_eq!(config.image_generation.providers, vec!["dalle", "together"]);
        assert_eq!(config.image_generation.together.height, 768);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.publish.attempt_timeout_secs, 120);
        assert_eq!(config.platform.provider, "x");
        assert_eq!(config.platform.max_image_bytes, 5 * 1024 * 1024);
        assert!(!config.notify.enabled);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("[publish]\nmax_attempts = 3\n").unwrap();
        assert_eq!(config.publish.max_attempts, 3);
        assert_eq!(config.publish.fixed_hashtag, "#ChinaEV");
        assert_eq!(config.image_generation.dalle.model, "dall-e-3");
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = AppConfig::default();
        config.image_generation.providers = vec!["midjourney".to_string()];
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.publish.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/outpost.toml")));
        assert!(result.is_err());
    }
}
