//! Persistent data model.

pub mod commit;
pub mod identity;
pub mod job;
pub mod project;
pub mod pull_request;
pub mod settings;
pub mod statistics;
