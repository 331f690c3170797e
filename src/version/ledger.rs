//! Merged, position-ranked catalog of known releases

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::version::semver::{clean, is_prerelease};
use crate::version::sources::ReleaseSource;
use crate::version::vulnerability::VulnerabilityTable;

/// One known release, keyed in the ledger by its normalized version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEntry {
    /// Owning repository identifier
    pub repo: String,
    /// Position within the repository's release list, 0 = newest
    pub count: u32,
    /// Position used for scoring; pre-releases of the primary repository
    /// do not advance it
    pub value_count: u32,
    pub has_vulnerability: bool,
}

/// The frozen release catalog, shared read-only by all evaluations.
///
/// Built once per run by [`build_ledger`]; never mutated afterwards.
#[derive(Debug, Default, Serialize)]
pub struct ReleaseLedger {
    entries: IndexMap<String, ReleaseEntry>,
    /// Raw tag listing per repository, kept verbatim for the report
    pub raw_tags: IndexMap<String, Vec<String>>,
    pub primary_repo: String,
}

impl ReleaseLedger {
    pub fn new(primary_repo: &str) -> Self {
        Self {
            primary_repo: primary_repo.to_string(),
            ..Default::default()
        }
    }

    pub fn get(&self, version: &str) -> Option<&ReleaseEntry> {
        self.entries.get(version)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ReleaseEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts an entry; an existing entry for the same key is replaced.
    /// The merge is insertion-order-sensitive: later repositories win.
    pub fn insert(&mut self, version: &str, entry: ReleaseEntry) {
        self.entries.insert(version.to_string(), entry);
    }
}

/// Builds the ledger from `sources`, processed strictly in the given
/// order. The primary repository must come last so its entries (with
/// authoritative vulnerability data) overwrite duplicated version keys
/// from forks. A source failing outright is logged and skipped; the
/// build never aborts.
pub async fn build_ledger(
    sources: &[Box<dyn ReleaseSource>],
    vulnerabilities: &VulnerabilityTable,
    primary_repo: &str,
) -> ReleaseLedger {
    let mut ledger = ReleaseLedger::new(primary_repo);

    for source in sources {
        let repo = source.repo();
        let tags = match source.fetch_tags().await {
            Ok(tags) => tags,
            Err(e) => {
                error!(repo, error = %e, "failed to list releases, skipping repository");
                continue;
            }
        };
        info!(repo, tags = tags.len(), "merging releases into ledger");

        let mut count = 0u32;
        let mut value_count = 0u32;
        for tag in &tags {
            let Some(version) = clean(tag) else {
                warn!(repo, tag, "unparseable tag skipped");
                continue;
            };

            ledger.insert(
                &version,
                ReleaseEntry {
                    repo: repo.clone(),
                    count,
                    value_count,
                    has_vulnerability: vulnerabilities.is_vulnerable(&repo, &version),
                },
            );

            count += 1;
            // Pre-releases of the primary line share their value_count
            // with the stable release that follows them in the list, so
            // instances tracking stable are not penalized for cut
            // pre-releases.
            if !(repo == primary_repo && is_prerelease(&version)) {
                value_count += 1;
            }
        }

        ledger.raw_tags.insert(repo, tags);
    }

    ledger
}
