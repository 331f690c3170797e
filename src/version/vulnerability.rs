//! Hand-maintained table of vulnerable version ranges per repository

use std::collections::HashMap;

use semver::{Version, VersionReq};
use tracing::warn;

/// Vulnerable version ranges, keyed by repository identifier.
///
/// Each repository maps to an OR-list of requirements; commas inside one
/// requirement are AND, per standard semver range grammar. The table is
/// injectable data, not core logic: callers may supply their own.
#[derive(Debug, Clone)]
pub struct VulnerabilityTable {
    ranges: HashMap<String, Vec<VersionReq>>,
}

impl VulnerabilityTable {
    pub fn empty() -> Self {
        Self {
            ranges: HashMap::new(),
        }
    }

    pub fn insert(&mut self, repo: &str, ranges: &[&str]) -> Result<(), semver::Error> {
        let parsed = ranges
            .iter()
            .map(|r| VersionReq::parse(r))
            .collect::<Result<Vec<_>, _>>()?;
        self.ranges.insert(repo.to_string(), parsed);
        Ok(())
    }

    /// Whether `version` of `repo` falls in a known-vulnerable range.
    /// Unlisted repositories and unparseable versions yield false.
    pub fn is_vulnerable(&self, repo: &str, version: &str) -> bool {
        let Some(requirements) = self.ranges.get(repo) else {
            return false;
        };
        let Ok(version) = Version::parse(version) else {
            warn!(repo, version, "unparseable version in vulnerability check");
            return false;
        };
        requirements.iter().any(|req| req.matches(&version))
    }
}

impl Default for VulnerabilityTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (repo, ranges) in [
            (
                "misskey-dev/misskey",
                &[
                    "<12.119.1",
                    ">=10.46.0, <10.102.4",
                    ">=11.0.0-alpha.1, <11.20.2",
                ][..],
            ),
            (
                "mei23/misskey",
                &["<10.102.606-m544", "<10.102.338-m544"][..],
            ),
            (
                "mei23/misskey-v11",
                &["<11.37.1-20221202185541", "<11.37.1-20210825162615"][..],
            ),
            ("FoundKeyGang/FoundKey", &["<13.0.0-preview3"][..]),
        ] {
            table
                .insert(repo, ranges)
                .expect("hand-maintained ranges parse");
        }
        table
    }
}
