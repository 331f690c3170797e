//! Fuzzy resolution of reported version strings against the ledger
//!
//! Instances report build metadata, fork suffixes and outright malformed
//! strings. Exact lookup is tried first; failing that, prefix matching
//! against the known-exact catalog approximates the closest known
//! ancestor release without full range computation.

use serde::Serialize;

use crate::config::UNKNOWN_VERSION_RANK;
use crate::version::ledger::{ReleaseEntry, ReleaseLedger};
use crate::version::semver::{clean, coerce};

/// Where a reported version string landed in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResolution {
    /// True only when the normalized string matched a ledger key exactly
    pub exact: bool,
    pub repo: String,
    pub count: u32,
    pub value_count: u32,
    pub has_vulnerability: bool,
}

/// Resolves `reported` to a ledger position. Never fails: a string that
/// matches nothing yields the sentinel resolution, anchored to the
/// primary repository at a rank far beyond any real release.
pub fn resolve(ledger: &ReleaseLedger, reported: &str) -> VersionResolution {
    let normalized = clean(reported);

    if let Some(normalized) = &normalized
        && let Some(entry) = ledger.get(normalized)
    {
        return from_entry(entry, true);
    }

    let coerced = coerce(reported).map(|v| v.to_string());

    let mut best: Option<&ReleaseEntry> = None;
    for (key, entry) in ledger.iter() {
        let direct = normalized
            .as_deref()
            .is_some_and(|n| n.starts_with(key.as_str()));
        // The coerced form is too lossy to trust against fork histories;
        // it only matches entries of the primary repository.
        let via_coercion = entry.repo == ledger.primary_repo
            && coerced
                .as_deref()
                .is_some_and(|c| c.starts_with(key.as_str()));

        if !direct && !via_coercion {
            continue;
        }
        if entry.value_count == 0 {
            // newest release; nothing can beat it
            return from_entry(entry, false);
        }
        if best.is_none_or(|b| b.value_count >= entry.value_count) {
            best = Some(entry);
        }
    }

    match best {
        Some(entry) => from_entry(entry, false),
        None => VersionResolution {
            exact: false,
            repo: ledger.primary_repo.clone(),
            count: UNKNOWN_VERSION_RANK,
            value_count: UNKNOWN_VERSION_RANK,
            has_vulnerability: false,
        },
    }
}

fn from_entry(entry: &ReleaseEntry, exact: bool) -> VersionResolution {
    VersionResolution {
        exact,
        repo: entry.repo.clone(),
        count: entry.count,
        value_count: entry.value_count,
        has_vulnerability: entry.has_vulnerability,
    }
}
