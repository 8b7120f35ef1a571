//! Builds adapters from configuration and wires them into the tracker

use anyhow::{Context, Result, bail};
use outpost_adapters::imagegen::{
    DalleImageGenerator, ImageGenConfig, StubImageGenerator, TogetherImageGenerator,
};
use outpost_adapters::notify::WebhookNotifier;
use outpost_adapters::state::SqliteRecordStore;
use outpost_adapters::x::{
    OAuthCredentials, RequestSigner, StubMediaUploader, StubXPublisher, XMediaUploader,
    XPublisher, build_http_client,
};
use outpost_domain::usecases::{FormatConfig, MediaResolver, PublicationTracker, TrackerConfig};
use outpost_domain::{
    ChatNotifier, ImageGenerator, MediaUploader, PipelineError, Publisher, RecordStore,
    SystemClock,
};
use reqwest::Client;
use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, ImageProviderConfig, PlatformConfig};

pub type Tracker =
    PublicationTracker<dyn RecordStore, dyn Publisher, dyn MediaUploader, SystemClock>;

/// Everything a command needs
pub struct App {
    pub config: AppConfig,
    pub store: Arc<SqliteRecordStore>,
    pub tracker: Tracker,
}

impl App {
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = AppConfig::load(config_path)?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let store = open_store(&config).await?;
        let client = build_http_client(Duration::from_secs(config.platform.http_timeout_secs))
            .context("Failed to build HTTP client")?;

        let (publisher, uploader) =
            build_platform(&config.platform, config.publish.max_chars, &client);
        let generators = build_generators(&config, &client);
        let media = MediaResolver::new(uploader, generators);

        let record_store: Arc<dyn RecordStore> = store.clone();
        let mut tracker = PublicationTracker::new(
            record_store,
            publisher,
            media,
            Arc::new(SystemClock),
            tracker_config(&config),
        );

        if let Some(notifier) = build_notifier(&config, &client)? {
            tracker = tracker.with_notifier(notifier);
        }

        Ok(Self {
            config,
            store,
            tracker,
        })
    }
}

pub async fn open_store(config: &AppConfig) -> Result<Arc<SqliteRecordStore>> {
    let store = SqliteRecordStore::new(&config.general.state_db_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open record store at {}",
                config.general.state_db_path.display()
            )
        })?;
    Ok(Arc::new(store))
}

pub fn tracker_config(config: &AppConfig) -> TrackerConfig {
    let publish = &config.publish;
    TrackerConfig {
        max_attempts: publish.max_attempts,
        attempt_timeout: (publish.attempt_timeout_secs > 0)
            .then(|| Duration::from_secs(publish.attempt_timeout_secs)),
        attach_media: publish.attach_media,
        format: FormatConfig {
            max_chars: publish.max_chars,
            fixed_hashtag: publish.fixed_hashtag.clone(),
            default_category: publish.default_category.clone(),
            max_category_tags: publish.max_category_tags,
        },
    }
}

/// Env vars named in config that are unset or empty
pub fn missing_credentials(platform: &PlatformConfig) -> Vec<String> {
    platform
        .credential_envs()
        .iter()
        .filter(|(_, env_var)| optional_secret(env_var).is_none())
        .map(|(_, env_var)| env_var.to_string())
        .collect()
}

fn load_credentials(platform: &PlatformConfig) -> OAuthCredentials {
    let read = |env_var: &str| {
        optional_secret(env_var).unwrap_or_else(|| SecretString::new("".into()))
    };
    OAuthCredentials {
        consumer_key: read(&platform.consumer_key_env),
        consumer_secret: read(&platform.consumer_secret_env),
        access_token: read(&platform.access_token_env),
        access_token_secret: read(&platform.access_token_secret_env),
    }
}

/// Publisher and uploader for the configured platform. Missing credentials
/// produce a disabled publisher, which the tracker reports as a config error.
pub fn build_platform(
    platform: &PlatformConfig,
    max_chars: usize,
    client: &Client,
) -> (Arc<dyn Publisher>, Arc<dyn MediaUploader>) {
    if platform.provider == "stub" {
        tracing::info!("Using stub platform publisher");
        return (
            Arc::new(StubXPublisher::new(true)),
            Arc::new(StubMediaUploader),
        );
    }

    let missing = missing_credentials(platform);
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "Platform credentials not set, publishing disabled");
    }

    let credentials = load_credentials(platform);
    let uploader = XMediaUploader::new(
        client.clone(),
        RequestSigner::new(credentials.clone()),
        platform.base_url.clone(),
        platform.max_image_bytes,
    );
    let publisher = XPublisher::with_base_url(
        client.clone(),
        credentials,
        platform.base_url.clone(),
        max_chars,
    );

    (Arc::new(publisher), Arc::new(uploader))
}

fn image_gen_config(provider: &ImageProviderConfig) -> ImageGenConfig {
    ImageGenConfig {
        model: provider.model.clone(),
        width: provider.width,
        height: provider.height,
        steps: provider.steps,
        timeout_secs: provider.timeout_secs,
    }
}

pub fn build_generators(config: &AppConfig, client: &Client) -> Vec<Arc<dyn ImageGenerator>> {
    let image = &config.image_generation;

    image
        .providers
        .iter()
        .filter_map(|name| -> Option<Arc<dyn ImageGenerator>> {
            match name.as_str() {
                "dalle" => Some(Arc::new(DalleImageGenerator::with_base_url(
                    client.clone(),
                    optional_secret(&image.dalle.api_key_env),
                    image.dalle.base_url.clone(),
                    image_gen_config(&image.dalle),
                ))),
                "together" => Some(Arc::new(TogetherImageGenerator::with_base_url(
                    client.clone(),
                    optional_secret(&image.together.api_key_env),
                    image.together.base_url.clone(),
                    image_gen_config(&image.together),
                ))),
                "stub" => Some(Arc::new(StubImageGenerator::unavailable())),
                other => {
                    tracing::warn!(provider = %other, "Unknown image provider ignored");
                    None
                }
            }
        })
        .collect()
}

pub fn build_notifier(
    config: &AppConfig,
    client: &Client,
) -> Result<Option<Arc<dyn ChatNotifier>>> {
    if !config.notify.enabled {
        return Ok(None);
    }

    let url = load_secret(&config.notify.webhook_url_env, "chat webhook")?;
    Ok(Some(Arc::new(WebhookNotifier::new(client.clone(), url))))
}

/// Read a required secret from the named env var
pub fn load_secret(env_var: &str, what: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No env var configured for {}", what);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing env var {} for {}", env_var, what))?;

    if value.trim().is_empty() {
        bail!("Env var {} is empty for {}", env_var, what);
    }

    Ok(SecretString::new(value.into()))
}

/// Read an optional secret; unset and empty both mean absent
pub fn optional_secret(env_var: &str) -> Option<SecretString> {
    if env_var.trim().is_empty() {
        return None;
    }
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::new(v.into()))
}

/// Print a pipeline failure and exit with a code per error kind
pub fn exit_with_pipeline_error(error: &PipelineError, json: bool) -> ! {
    if json {
        match serde_json::to_string_pretty(error) {
            Ok(body) => println!("{}", body),
            Err(_) => println!("{{\"message\": {:?}}}", error.message),
        }
    } else {
        eprintln!("Error ({}): {}", error.kind.as_str(), error.message);
        eprintln!(
            "Attempts: {}{}",
            error.attempts,
            if error.max_reached {
                " (automatic retries exhausted)"
            } else {
                ""
            }
        );
        if let Some(url) = &error.external_url {
            eprintln!("Existing post: {}", url);
        }
    }

    std::process::exit(exit_code(error.kind))
}

fn exit_code(kind: outpost_domain::ErrorKind) -> i32 {
    use outpost_domain::ErrorKind;
    match kind {
        ErrorKind::Transient => 2,
        ErrorKind::Config => 3,
        ErrorKind::InvariantViolation => 4,
        ErrorKind::PartialSuccess => 5,
    }
}
