//! Publish commands - automatic attempt, approve, and manual retry

use anyhow::Result;
use outpost_domain::usecases::{PublishOutcome, PublishRequest};
use outpost_domain::PipelineError;
use std::path::Path;

use crate::args::{ManualPublishArgs, PublishArgs};
use crate::wiring::{App, exit_with_pipeline_error};

pub async fn publish(args: PublishArgs, config_path: Option<&Path>) -> Result<()> {
    let app = App::load(config_path).await?;
    let result = app
        .tracker
        .publish(&args.post_id, PublishRequest::automatic())
        .await;
    finish(result, args.json)
}

pub async fn approve(args: ManualPublishArgs, config_path: Option<&Path>) -> Result<()> {
    let app = App::load(config_path).await?;
    let result = app
        .tracker
        .approve_and_publish(&args.post_id, args.image)
        .await;
    finish(result, args.json)
}

pub async fn retry(args: ManualPublishArgs, config_path: Option<&Path>) -> Result<()> {
    let app = App::load(config_path).await?;

    let eligibility = app.tracker.check_retry_eligibility(&args.post_id).await;
    if let Ok(eligibility) = &eligibility {
        if eligibility.allowed && eligibility.max_reached && !args.json {
            eprintln!(
                "Warning: automatic retries exhausted ({}/{}), retrying manually",
                eligibility.attempts,
                app.config.publish.max_attempts
            );
        }
    }

    let result = app.tracker.retry(&args.post_id, args.image).await;
    finish(result, args.json)
}

fn finish(result: Result<PublishOutcome, PipelineError>, json: bool) -> Result<()> {
    match result {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("Published post {}", outcome.post_id);
                println!("  URL:      {}", outcome.external_url);
                println!("  Media:    {}", outcome.media_source.as_str());
                println!("  Attempts: {}", outcome.attempts);
            }
            Ok(())
        }
        Err(e) => exit_with_pipeline_error(&e, json),
    }
}
