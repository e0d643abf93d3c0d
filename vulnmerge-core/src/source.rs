// ---------------------------------------------------------------------------
// Evidence-source collaborators
// ---------------------------------------------------------------------------
//
// Every database-backed source hands out a short-lived session. Sessions are
// only ever used through a `SessionGuard`, which closes them on every exit
// path of the detection step that opened them.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use tracing::{debug, error};
use vulnmerge_types::{CveDetail, Exploit, HostScanResult, KnownExploited, OsFamily};
use vulnmerge_vuln::Evidence;

use crate::error::SourceError;
use crate::policy::{self, Coverage};

/// Evidence keyed by vulnerability identifier, as returned by a source.
pub type Findings = Vec<(String, Evidence)>;

/// A connection-like handle to one evidence database.
pub trait Session {
    fn close(&mut self) -> Result<(), SourceError>;
}

/// Owns an open session and closes it when dropped.
///
/// A failed close is logged and swallowed: it never fails the host.
pub struct SessionGuard<S: Session + ?Sized> {
    source: String,
    session: Box<S>,
}

impl<S: Session + ?Sized> SessionGuard<S> {
    pub fn new(source: impl Into<String>, session: Box<S>) -> Self {
        let source = source.into();
        debug!(source = %source, "session opened");
        Self { source, session }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl<S: Session + ?Sized> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: Session + ?Sized> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session + ?Sized> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        match self.session.close() {
            Ok(()) => debug!(source = %self.source, "session closed"),
            Err(e) => error!(source = %self.source, error = %e, "failed to close the {} DB", self.source),
        }
    }
}

// ---------------------------------------------------------------------------
// OS-package sources (OVAL, distribution security trackers)
// ---------------------------------------------------------------------------

pub trait PackageSource {
    /// Short name used in logs and errors, e.g. "oval".
    fn name(&self) -> &str;

    fn open(&self, family: OsFamily) -> Result<Box<dyn PackageSession + '_>, SourceError>;

    /// How a missing database for `family` is treated.
    fn coverage(&self, family: OsFamily) -> Coverage {
        policy::coverage(family)
    }
}

pub trait PackageSession: Session {
    /// Whether the database holds entries for this family and release.
    fn is_fetched(&mut self, family: OsFamily, release: &str) -> Result<bool, SourceError>;

    /// Match the host's packages. The host may be a filtered view of the
    /// real one (see `HostScanResult::without_raspbian_packages`).
    fn detect(&mut self, host: &HostScanResult) -> Result<Findings, SourceError>;
}

// ---------------------------------------------------------------------------
// CVE dictionary (NVD primary, JVN secondary)
// ---------------------------------------------------------------------------

pub trait CveDictionary {
    fn open(&self) -> Result<Box<dyn CveDictionarySession + '_>, SourceError>;
}

pub trait CveDictionarySession: Session {
    /// Dictionary entries affecting a CPE URI. JVN entries are only
    /// returned when `use_jvn` is set.
    fn detect_by_cpe(&mut self, cpe_uri: &str, use_jvn: bool)
    -> Result<Vec<CveDetail>, SourceError>;

    /// Full entries for the given identifiers. Unknown ids are omitted.
    fn fetch_details(&mut self, cve_ids: &[String]) -> Result<Vec<CveDetail>, SourceError>;
}

// ---------------------------------------------------------------------------
// Auxiliary sources
// ---------------------------------------------------------------------------

/// Code-hosting security alerts for one repository.
pub trait CodeHostingSource {
    fn detect(
        &self,
        host: &HostScanResult,
        owner: &str,
        repo: &str,
    ) -> Result<Findings, SourceError>;
}

/// Vulnerability tracker for web-application plugins.
pub trait PluginTracker {
    fn detect(&self, host: &HostScanResult) -> Result<Findings, SourceError>;
}

pub trait ExploitFeed {
    fn open(&self) -> Result<Box<dyn ExploitSession + '_>, SourceError>;
}

pub trait ExploitSession: Session {
    /// Public exploits and proof-of-concepts per identifier.
    fn exploits(&mut self, cve_ids: &[String])
    -> Result<BTreeMap<String, Vec<Exploit>>, SourceError>;
}

pub trait KnownExploitedFeed {
    fn open(&self) -> Result<Box<dyn KnownExploitedSession + '_>, SourceError>;
}

pub trait KnownExploitedSession: Session {
    fn known_exploited(
        &mut self,
        cve_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<KnownExploited>>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counted {
        closes: Rc<Cell<usize>>,
        fail: bool,
    }

    impl Session for Counted {
        fn close(&mut self) -> Result<(), SourceError> {
            self.closes.set(self.closes.get() + 1);
            if self.fail {
                Err(SourceError::Query("connection reset".into()))
            } else {
                Ok(())
            }
        }
    }

    fn guarded(closes: &Rc<Cell<usize>>, fail: bool) -> SessionGuard<Counted> {
        SessionGuard::new(
            "test",
            Box::new(Counted {
                closes: closes.clone(),
                fail,
            }),
        )
    }

    #[test]
    fn closes_on_drop() {
        let closes = Rc::new(Cell::new(0));
        {
            let guard = guarded(&closes, false);
            assert_eq!(guard.source(), "test");
        }
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn closes_on_early_error_return() {
        fn step(closes: &Rc<Cell<usize>>, fail: bool) -> Result<(), SourceError> {
            let _guard = guarded(closes, false);
            if fail {
                return Err(SourceError::Unavailable("db".into()));
            }
            Ok(())
        }
        let closes = Rc::new(Cell::new(0));
        assert!(step(&closes, true).is_err());
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn failed_close_is_swallowed() {
        let closes = Rc::new(Cell::new(0));
        drop(guarded(&closes, true));
        assert_eq!(closes.get(), 1);
    }
}
