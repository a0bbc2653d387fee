pub mod classify;
pub mod orchestrator;
pub mod ranker;
pub mod stats;
pub mod store;
pub mod types;
pub mod vector;
