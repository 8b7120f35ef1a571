//! Subcommand implementations

pub mod config;
pub mod doctor;
pub mod post;
pub mod publish;
pub mod records;
pub mod verify;
