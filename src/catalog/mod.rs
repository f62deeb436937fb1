//! CHPL catalog reconciliation: wire decoding, equality, precedence and the
//! per-entity ingestors that write products, vendors and criteria.

pub mod chpl;
pub mod criteria;
pub mod endpoint_list;
pub mod equality;
pub mod ingest;
pub mod precedence;
pub mod product;
pub mod types;
pub mod vendor;

pub(crate) use crate::TARGET_CATALOG;

pub use ingest::{BatchReport, CatalogIngestor, CatalogRun, IngestOutcome};
pub use precedence::needs_update;
pub use types::{CatalogEntityKind, Criterion, CriterionLink, Location, Product, Vendor};
