//! Verify command - probe platform credentials

use anyhow::Result;
use std::path::Path;

use crate::args::VerifyArgs;
use crate::wiring::{App, missing_credentials};

pub async fn execute(args: VerifyArgs, config_path: Option<&Path>) -> Result<()> {
    let app = App::load(config_path).await?;

    let missing = if app.config.platform.provider == "stub" {
        Vec::new()
    } else {
        missing_credentials(&app.config.platform)
    };
    let valid = missing.is_empty() && app.tracker.verify_credentials().await;

    if args.json {
        let body = serde_json::json!({
            "provider": app.config.platform.provider,
            "valid": valid,
            "missing": missing,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else if valid {
        println!("Credentials OK ({})", app.config.platform.provider);
    } else if !missing.is_empty() {
        println!("Credentials missing: {}", missing.join(", "));
    } else {
        println!("Credentials rejected by {}", app.config.platform.provider);
    }

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}
