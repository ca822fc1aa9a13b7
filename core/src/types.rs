//! Shared primitive types used across the entire pipeline.

/// A stable, unique identifier for a company.
pub type EntityId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Canonical name of the entity key column after reconciliation.
pub const ENTITY_ID: &str = "entity_id";

/// Fresh run identifier: `run-<uuid v4>`.
pub fn new_run_id() -> RunId {
    format!("run-{}", uuid::Uuid::new_v4())
}
