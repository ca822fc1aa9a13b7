//! Bankruptcy risk pipeline: reconcile heterogeneous financial sources,
//! consolidate them into one labeled row per company, train a
//! class-weighted random forest and bucket scores into risk tiers.

pub mod artifact;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod event;
pub mod export;
pub mod features;
pub mod forest;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod reconcile;
pub mod rng;
pub mod scorer;
pub mod store;
pub mod table;
pub mod trainer;
pub mod tree;
pub mod types;
