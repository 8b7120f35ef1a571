//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// outpost: signed, idempotent publication of reviewed news posts
#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Automatic publish attempt for an approved post
    Publish(PublishArgs),

    /// Approve a post under review and publish it
    Approve(ManualPublishArgs),

    /// Manually retry publishing a post
    Retry(ManualPublishArgs),

    /// Show the publication record of a post
    History(PostIdArgs),

    /// Stop publishing a post
    Skip(SkipArgs),

    /// Render the text that would be published, without publishing
    Preview(PostIdArgs),

    /// Manage stored posts
    Post(PostArgs),

    /// Check platform credentials
    Verify(VerifyArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Post ID
    pub post_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ManualPublishArgs {
    /// Post ID
    pub post_id: String,

    /// Image URL to attach instead of the post's own images
    #[arg(long)]
    pub image: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PostIdArgs {
    /// Post ID
    pub post_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SkipArgs {
    /// Post ID
    pub post_id: String,

    /// Why the post is skipped
    #[arg(long)]
    pub reason: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PostArgs {
    #[command(subcommand)]
    pub command: PostCommands,
}

#[derive(Subcommand, Debug)]
pub enum PostCommands {
    /// Import posts from a JSON file (one post or an array)
    Import {
        /// JSON file to read
        file: PathBuf,
    },

    /// Show a post and its publication record
    Show {
        /// Post ID
        post_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./outpost.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
