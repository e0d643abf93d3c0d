mod diff;
mod error;
mod schema;
mod store;

pub use diff::{DiffMode, diff};
pub use error::StoreError;
pub use store::{RunInfo, RunSummary, ScanStore, SnapshotStore};
