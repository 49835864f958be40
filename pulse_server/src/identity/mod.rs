//! Identity resolution: email merges, account associations and suggestions.

pub mod merge_graph;
pub mod resolver;
pub mod similarity;

pub use merge_graph::MergeGraph;
pub use resolver::Resolver;
