//! GitHub Releases API source with link-header pagination

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::{FETCH_TIMEOUT_MS, LEDGER_PAGE_CONCURRENCY};
use crate::version::error::SourceError;
use crate::version::sources::ReleaseSource;

/// Default base URL for the GitHub API
const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Response item from the releases endpoint
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Lists a repository's releases, following the `link` response header
/// up to a per-source page cap. Pages after the first are fetched with a
/// small inner concurrency bound so one forge is never hammered.
pub struct GithubReleaseSource {
    client: reqwest::Client,
    base_url: String,
    repo: String,
    page_limit: u32,
    token: Option<String>,
}

impl GithubReleaseSource {
    pub fn new(repo: &str, page_limit: u32) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, repo, page_limit)
    }

    pub fn with_base_url(base_url: &str, repo: &str, page_limit: u32) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("instance-scout")
                .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.to_string(),
            repo: repo.to_string(),
            page_limit,
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<String>, SourceError> {
        let response = self.request(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let releases: Vec<Release> = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        Ok(releases.into_iter().map(|r| r.tag_name).collect())
    }
}

#[async_trait::async_trait]
impl ReleaseSource for GithubReleaseSource {
    fn repo(&self) -> String {
        self.repo.clone()
    }

    async fn fetch_tags(&self) -> Result<Vec<String>, SourceError> {
        let first_url = format!("{}/repos/{}/releases", self.base_url, self.repo);

        let response = self.request(&first_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let last_page = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(last_page_from_link)
            .map(|last| last.min(self.page_limit))
            .unwrap_or(1);

        let releases: Vec<Release> = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
        let mut tags: Vec<String> = releases.into_iter().map(|r| r.tag_name).collect();

        // Remaining pages overlap, bounded by the inner pool. A failing
        // page contributes nothing; page order is preserved so ledger
        // positions stay stable.
        let permits = Arc::new(Semaphore::new(LEDGER_PAGE_CONCURRENCY));
        let pages = (2..=last_page).map(|page| {
            let url = format!("{first_url}?page={page}");
            let permits = Arc::clone(&permits);
            async move {
                let _permit = permits.acquire_owned().await.ok();
                match self.fetch_page(&url).await {
                    Ok(tags) => tags,
                    Err(e) => {
                        warn!(repo = %self.repo, page, error = %e, "release page fetch failed");
                        Vec::new()
                    }
                }
            }
        });

        for page_tags in join_all(pages).await {
            tags.extend(page_tags);
        }

        Ok(tags)
    }
}

/// Extracts the last page number from a GitHub-style `link` header.
fn last_page_from_link(link: &str) -> Option<u32> {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    let re = LINK_RE
        .get_or_init(|| Regex::new(r#"[?&]page=(\d+)>; rel="last""#).expect("valid link regex"));
    re.captures(link).and_then(|caps| caps[1].parse().ok())
}
