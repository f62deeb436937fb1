pub mod linker;
pub mod normalizer;
pub mod persist;
pub mod similarity;
pub mod types;

pub(crate) use crate::TARGET_LINKER;

pub use linker::{link_organizations, match_by_name, merge_matches, DEFAULT_LINK_THRESHOLD};
pub use normalizer::{normalize, NormalizedName};
pub use persist::{link_all_orgs_and_endpoints, match_by_id};
pub use similarity::{intersection_count, jaccard, score};
pub use types::{EndpointRecord, LinkResult, LinkingSummary, OrganizationRecord};
