//! Gitea/Forgejo-style tag listing source

use std::time::Duration;

use serde::Deserialize;

use crate::config::FETCH_TIMEOUT_MS;
use crate::version::error::SourceError;
use crate::version::sources::ReleaseSource;

/// Tags returned beyond this are ignored; forks cut few releases
const TAG_LIMIT: usize = 40;

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Lists a repository's tags from a gitea-style host. No pagination;
/// the endpoint returns a plain array and only the newest [`TAG_LIMIT`]
/// entries are kept.
pub struct ForgejoTagSource {
    client: reqwest::Client,
    base_url: String,
    repo: String,
}

impl ForgejoTagSource {
    pub fn new(host: &str, repo: &str) -> Self {
        Self::with_base_url(&format!("https://{host}"), repo)
    }

    pub fn with_base_url(base_url: &str, repo: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("instance-scout")
                .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.to_string(),
            repo: repo.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ReleaseSource for ForgejoTagSource {
    fn repo(&self) -> String {
        self.repo.clone()
    }

    async fn fetch_tags(&self) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/api/v1/repos/{}/tags", self.base_url, self.repo);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        // A non-array body (login page, error object) is a source failure
        let tags: Vec<Tag> = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        Ok(tags
            .into_iter()
            .take(TAG_LIMIT)
            .map(|t| t.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn fetch_tags_returns_tag_names_in_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/repos/FoundKeyGang/FoundKey/tags")
            .with_status(200)
            .with_body(r#"[{"name": "v13.0.0-preview5"}, {"name": "v13.0.0-preview4"}]"#)
            .create_async()
            .await;

        let source = ForgejoTagSource::with_base_url(&server.url(), "FoundKeyGang/FoundKey");
        let tags = source.fetch_tags().await.unwrap();

        mock.assert_async().await;
        assert_eq!(tags, vec!["v13.0.0-preview5", "v13.0.0-preview4"]);
    }

    #[tokio::test]
    async fn fetch_tags_rejects_non_array_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/repos/some/repo/tags")
            .with_status(200)
            .with_body(r#"{"message": "not what you expected"}"#)
            .create_async()
            .await;

        let source = ForgejoTagSource::with_base_url(&server.url(), "some/repo");
        let result = source.fetch_tags().await;

        mock.assert_async().await;
        assert!(matches!(result, Err(SourceError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn fetch_tags_errors_on_non_ok_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/repos/some/repo/tags")
            .with_status(502)
            .create_async()
            .await;

        let source = ForgejoTagSource::with_base_url(&server.url(), "some/repo");
        let result = source.fetch_tags().await;

        mock.assert_async().await;
        assert!(matches!(result, Err(SourceError::InvalidResponse(_))));
    }
}
