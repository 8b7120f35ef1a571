//! Application use cases / business logic

pub mod format;
pub mod media;
pub mod tracker;

pub use format::{ContentFormatter, FormatConfig, FormatInput};
pub use media::MediaResolver;
pub use tracker::{
    PublicationTracker, PublishOutcome, PublishRequest, RetryEligibility, TrackerConfig,
};
