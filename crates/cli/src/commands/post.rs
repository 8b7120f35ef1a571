//! Post commands - import and inspect stored posts

use anyhow::{Context, Result, bail};
use outpost_domain::{Post, PostStatus, RecordStore, StoreError};
use serde::Deserialize;
use std::path::Path;

use crate::args::{PostArgs, PostCommands};
use crate::commands::records::print_record;
use crate::config::AppConfig;
use crate::wiring::open_store;

/// Import files hold one post or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Many(Vec<Post>),
    One(Box<Post>),
}

impl ImportFile {
    fn into_posts(self) -> Vec<Post> {
        match self {
            ImportFile::Many(posts) => posts,
            ImportFile::One(post) => vec![*post],
        }
    }
}

pub async fn execute(args: PostArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    match args.command {
        PostCommands::Import { file } => import(&config, &file).await,
        PostCommands::Show { post_id, json } => show(&config, &post_id, json).await,
    }
}

async fn import(config: &AppConfig, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let parsed: ImportFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse posts from {}", file.display()))?;

    let store = open_store(config).await?;
    let mut imported = 0usize;
    let mut skipped = 0usize;

    for mut post in parsed.into_posts() {
        if post.id.trim().is_empty() {
            bail!("Post without an id in {}", file.display());
        }
        // Publication state is owned by the pipeline, never by the import file
        post.status = PostStatus::AwaitingReview;
        post.external_post_id = None;

        match store.insert_post(&post).await {
            Ok(()) => {
                tracing::debug!(post_id = %post.id, "Post imported");
                imported += 1;
            }
            Err(StoreError::Conflict(_)) => {
                tracing::warn!(post_id = %post.id, "Post already exists, skipping");
                skipped += 1;
            }
            Err(e) => return Err(e).context("Failed to store post"),
        }
    }

    println!("Imported {} post(s), {} already present", imported, skipped);
    Ok(())
}

async fn show(config: &AppConfig, post_id: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;

    let Some(post) = store.get_post(post_id).await? else {
        bail!("Post not found: {}", post_id);
    };
    let record = store.get_publication_record(post_id).await?;

    if json {
        let body = serde_json::json!({ "post": post, "record": record });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Post:       {}", post.id);
    println!("Review:     {}", post.status.as_str());
    if let Some(title) = &post.title {
        println!("Title:      {}", title);
    }
    println!("Source:     {} {}", post.source.label(), post.source_url);
    if !post.categories.is_empty() {
        println!("Categories: {}", post.categories.join(", "));
    }
    println!("Images:     {}", post.image_urls.len());
    println!();
    println!("{}", post.summary);
    println!();

    match record {
        Some(record) => print_record(&record, config.publish.max_attempts),
        None => println!("Never attempted"),
    }
    Ok(())
}
