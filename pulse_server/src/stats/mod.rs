//! Per-person daily statistics: filters, the deterministic compute and
//! read-side grain aggregation.

pub mod engine;
pub mod filters;
pub mod grain;

pub use engine::{compute, StatsInput};
pub use grain::{Grain, PersonTotals};
