//! outpost adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `state`: SQLite and in-memory record stores
//! - `x`: X (Twitter) API adapters (signing, media upload, publishing)
//! - `imagegen`: Image-generation providers
//! - `notify`: Chat webhook notifier

mod notify_webhook;
mod state_memory;
mod state_sqlite;

pub mod imagegen;
pub mod x_api;

/// Re-exports for state adapters
pub mod state {
    pub use crate::state_memory::InMemoryRecordStore;
    pub use crate::state_sqlite::SqliteRecordStore;
}

/// Re-exports for X API adapters
pub mod x {
    pub use crate::x_api::{
        OAuthCredentials, RequestSigner, StubMediaUploader, StubXPublisher, XMediaUploader,
        XPublisher, build_http_client,
    };
}

/// Re-exports for notification adapters
pub mod notify {
    pub use crate::notify_webhook::{StubNotifier, WebhookNotifier, render_notice};
}
