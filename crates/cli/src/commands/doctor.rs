//! Doctor command - validate configuration and show status

use anyhow::Result;
use outpost_adapters::state::SqliteRecordStore;
use serde::Serialize;
use std::path::Path;

use crate::args::DoctorArgs;
use crate::config::{AppConfig, ImageProviderConfig};
use crate::wiring::{missing_credentials, optional_secret};

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    credentials: CheckResult,
    store: CheckResult,
    image_generation: CheckResult,
    notify: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<&Path>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        credentials: CheckResult::error("Not checked"),
        store: CheckResult::error("Not checked"),
        image_generation: CheckResult::error("Not checked"),
        notify: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.credentials = check_credentials(config);
        report.store = check_store(config).await;
        report.image_generation = check_image_generation(config);
        report.notify = check_notify(config);
    }

    let checks = [
        &report.config,
        &report.credentials,
        &report.store,
        &report.image_generation,
        &report.notify,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn check_credentials(config: &AppConfig) -> CheckResult {
    let platform = &config.platform;
    if platform.provider == "stub" {
        return CheckResult::ok("Provider: stub (offline)");
    }

    let missing = missing_credentials(platform);
    if missing.is_empty() {
        CheckResult::ok(format!(
            "Provider: {}, all 4 credentials set",
            platform.provider
        ))
    } else {
        // Publishing refuses to run without all four
        CheckResult::error(format!(
            "Provider: {}, missing: {}",
            platform.provider,
            missing.join(", ")
        ))
        .with_details(serde_json::json!({ "missing": missing }))
    }
}

async fn check_store(config: &AppConfig) -> CheckResult {
    let path = &config.general.state_db_path;
    if !path.exists() {
        return CheckResult::ok(format!(
            "SQLite store: {} (not created yet, created on first use)",
            path.display()
        ));
    }

    match SqliteRecordStore::open_read_only(path).await {
        Ok(store) => match store.ping().await {
            Ok(()) => CheckResult::ok(format!("SQLite store: {}", path.display())),
            Err(e) => CheckResult::error(format!("Store not responding: {}", e)),
        },
        Err(e) => CheckResult::error(format!(
            "Failed to open store at {}: {}",
            path.display(),
            e
        )),
    }
}

fn check_image_generation(config: &AppConfig) -> CheckResult {
    let image = &config.image_generation;
    if !config.publish.attach_media {
        return CheckResult::ok("Media attachment disabled");
    }
    if image.providers.is_empty() {
        return CheckResult::ok("No image generation providers, post images only");
    }

    let mut ready = Vec::new();
    let mut unset = Vec::new();
    for name in &image.providers {
        let provider: Option<&ImageProviderConfig> = match name.as_str() {
            "dalle" => Some(&image.dalle),
            "together" => Some(&image.together),
            _ => None,
        };
        match provider {
            Some(p) if optional_secret(&p.api_key_env).is_some() => ready.push(name.clone()),
            Some(p) => unset.push(format!("{} ({})", name, p.api_key_env)),
            None => ready.push(name.clone()),
        }
    }

    let details = serde_json::json!({ "ready": ready, "unset": unset });
    if unset.is_empty() {
        CheckResult::ok(format!("Providers: {}", ready.join(", "))).with_details(details)
    } else {
        CheckResult::warn(format!("API key not set: {}", unset.join(", "))).with_details(details)
    }
}

fn check_notify(config: &AppConfig) -> CheckResult {
    if !config.notify.enabled {
        return CheckResult::ok("Chat notifications disabled");
    }

    let env_var = &config.notify.webhook_url_env;
    if env_var.is_empty() {
        return CheckResult::error("No webhook URL env var configured");
    }

    match optional_secret(env_var) {
        Some(_) => CheckResult::ok(format!("Webhook URL: {} (set)", env_var)),
        None => CheckResult::error(format!("Webhook URL: {} (not set)", env_var)),
    }
}

fn print_report(report: &DoctorReport) {
    println!("outpost Doctor Report");
    println!("=====================");
    println!();

    print_check("Config", &report.config);
    print_check("Credentials", &report.credentials);
    print_check("Record Store", &report.store);
    print_check("Image Generation", &report.image_generation);
    print_check("Notifications", &report.notify);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
