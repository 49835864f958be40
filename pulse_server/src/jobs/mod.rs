//! Job engine: durable queue, enqueue operations and failure messages.

pub mod enqueue;
pub mod failure;
#[cfg(test)]
pub mod memory;
pub mod store;

pub use enqueue::JobService;
pub use store::{JobStore, PgJobStore};
