pub mod criteria;
pub mod executor;
pub mod graph;
