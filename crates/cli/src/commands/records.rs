//! Record commands - history, skip, preview

use anyhow::Result;
use outpost_domain::PublicationRecord;
use std::path::Path;

use crate::args::{PostIdArgs, SkipArgs};
use crate::wiring::{App, exit_with_pipeline_error};

pub async fn history(args: PostIdArgs, config_path: Option<&Path>) -> Result<()> {
    let app = App::load(config_path).await?;

    let record = match app.tracker.history(&args.post_id).await {
        Ok(record) => record,
        Err(e) => exit_with_pipeline_error(&e, args.json),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    match record {
        Some(record) => print_record(&record, app.config.publish.max_attempts),
        None => println!("No publication record for post {}", args.post_id),
    }
    Ok(())
}

pub async fn skip(args: SkipArgs, config_path: Option<&Path>) -> Result<()> {
    let app = App::load(config_path).await?;

    let record = match app.tracker.skip(&args.post_id, &args.reason).await {
        Ok(record) => record,
        Err(e) => exit_with_pipeline_error(&e, args.json),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Skipped post {}", args.post_id);
    }
    Ok(())
}

pub async fn preview(args: PostIdArgs, config_path: Option<&Path>) -> Result<()> {
    let app = App::load(config_path).await?;

    let text = match app.tracker.preview(&args.post_id).await {
        Ok(text) => text,
        Err(e) => exit_with_pipeline_error(&e, args.json),
    };

    if args.json {
        let body = serde_json::json!({
            "post_id": args.post_id,
            "text": text,
            "chars": text.chars().count(),
            "max_chars": app.config.publish.max_chars,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{}", text);
        println!();
        println!(
            "({}/{} characters)",
            text.chars().count(),
            app.config.publish.max_chars
        );
    }
    Ok(())
}

pub fn print_record(record: &PublicationRecord, max_attempts: u32) {
    println!("Post:       {}", record.post_id());
    println!("Status:     {}", record.status().as_str());
    println!(
        "Attempts:   {}{}",
        record.attempts(),
        if record.max_reached(max_attempts) {
            " (automatic retries exhausted)"
        } else {
            ""
        }
    );
    println!("Media:      {}", record.media_source().as_str());
    if let Some(url) = record.external_url() {
        println!("URL:        {}", url);
    }
    if let Some(error) = record.last_error() {
        println!("Last error: {}", error);
    }
    println!("Updated:    {}", record.updated_at());
}
