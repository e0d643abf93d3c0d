pub mod bundled;
pub mod cwe;
pub mod merge;
pub mod resolve;

pub use bundled::BundledReference;
pub use cwe::{WeaknessReference, enrich, referenced_cwe_ids};
pub use merge::{
    Evidence, append_fragment, cert_alerts, enrich_content, merge, merge_existing, merge_into,
};
pub use resolve::{resolve, resolve_methods};
