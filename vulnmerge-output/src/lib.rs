pub mod config;
pub mod filter;
pub mod json;
pub mod manager;
pub mod stdout;
pub mod traits;

pub use config::OutputConfig;
pub use filter::{FilterOutcome, FilterPipeline, FilterStage, RecordSet, StageReport, UnscoredPolicy};
pub use json::{JsonFormatter, JsonReportWriter};
pub use manager::ReportManager;
pub use stdout::SummaryFormatter;
pub use traits::{OutputError, OutputFormatter, ReportSink};
