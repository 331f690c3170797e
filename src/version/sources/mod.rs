//! Release listing sources for upstream forges

pub mod forgejo;
pub mod github;

pub use forgejo::ForgejoTagSource;
pub use github::GithubReleaseSource;

#[cfg(test)]
use mockall::automock;

use crate::version::error::SourceError;

/// Repository whose ledger entries are authoritative for vulnerability
/// data and fuzzy resolution. Must be the last source processed.
pub const PRIMARY_REPO: &str = "misskey-dev/misskey";

/// Page cap for repositories whose full history is not interesting
const SECONDARY_PAGE_LIMIT: u32 = 4;

/// Trait for listing a repository's release tags, newest first
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Repository identifier, e.g. "misskey-dev/misskey"
    fn repo(&self) -> String;

    /// Fetches raw tag names in descending-recency order.
    async fn fetch_tags(&self) -> Result<Vec<String>, SourceError>;
}

/// The tracked upstream repositories, in merge priority order.
/// [`PRIMARY_REPO`] stays last so its entries win conflicting keys.
pub fn default_sources() -> Vec<Box<dyn ReleaseSource>> {
    vec![
        Box::new(ForgejoTagSource::new(
            "codeberg.org",
            "thatonecalculator/calckey",
        )),
        Box::new(ForgejoTagSource::new("akkoma.dev", "FoundKeyGang/FoundKey")),
        Box::new(GithubReleaseSource::new("mei23/misskey", SECONDARY_PAGE_LIMIT)),
        Box::new(GithubReleaseSource::new(
            "mei23/misskey-v11",
            SECONDARY_PAGE_LIMIT,
        )),
        Box::new(GithubReleaseSource::new(PRIMARY_REPO, u32::MAX)),
    ]
}
