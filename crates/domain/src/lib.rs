//! outpost domain crate
//!
//! Core publication logic, following hexagonal architecture:
//! - `model`: Posts, media and outgoing content
//! - `publication`: The publication record and its state machine
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `error`: Pipeline error surfaced to administrative callers
//! - `usecases`: Formatting, media resolution and the publication tracker

pub mod error;
pub mod model;
pub mod ports;
pub mod publication;
pub mod usecases;

pub use error::{ErrorKind, PipelineError};
pub use model::*;
pub use ports::*;
pub use publication::{
    AttemptTrigger, PublicationRecord, PublicationState, PublicationStatus, RecordPatch,
    StoredRecord, TransitionError,
};
