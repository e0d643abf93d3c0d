pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod source;

pub use config::{ContainerConfig, DetectConfig, HostScope, ServerConfig};
pub use engine::Detector;
pub use error::{DetectError, SourceError};
pub use policy::{Coverage, SkipReason};
pub use source::{
    CodeHostingSource, CveDictionary, CveDictionarySession, ExploitFeed, ExploitSession, Findings,
    KnownExploitedFeed, KnownExploitedSession, PackageSession, PackageSource, PluginTracker,
    Session, SessionGuard,
};
