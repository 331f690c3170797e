//! Nodeinfo-style two-step liveness/identity discovery
//!
//! A well-known document lists typed links to the actual identity
//! document; the link carrying the highest schema version is followed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fetch::RetryFetcher;

/// An instance's self-description
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeInfo {
    pub software: Software,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Software {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Usage {
    pub users: Users,
    pub local_posts: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Users {
    pub total: Option<u64>,
    pub active_month: Option<u64>,
}

/// Fetches an instance's identity document. Any failure along the way
/// (unreachable well-known document, no usable link, malformed identity
/// document) yields None; the caller treats that as a dead instance.
pub async fn discover(fetcher: &RetryFetcher, base_url: &str) -> Option<NodeInfo> {
    let well_known = fetcher
        .get_json(&format!("{base_url}/.well-known/nodeinfo"))
        .await
        .into_value()?;

    let links = well_known.get("links")?.as_array()?;
    let href = links
        .iter()
        .filter_map(|link| {
            let rel = link.get("rel")?.as_str()?;
            let href = link.get("href")?.as_str()?;
            Some((schema_version(rel), href))
        })
        .max_by_key(|(version, _)| *version)
        .map(|(_, href)| href)?;

    let document = fetcher.get_json(href).await.into_value()?;
    match serde_json::from_value::<NodeInfo>(document) {
        Ok(info) => Some(info),
        Err(e) => {
            debug!(base_url, error = %e, "malformed nodeinfo document");
            None
        }
    }
}

/// Schema version from a nodeinfo link rel, e.g.
/// "http://nodeinfo.diaspora.software/ns/schema/2.1" -> (2, 1)
fn schema_version(rel: &str) -> (u32, u32) {
    let tail = rel.rsplit('/').next().unwrap_or_default();
    let mut parts = tail.split('.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::time::Duration;

    fn test_fetcher() -> RetryFetcher {
        RetryFetcher::new(4).with_retry_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn discover_follows_the_highest_schema_link() {
        let mut server = Server::new_async().await;
        let well_known = server
            .mock("GET", "/.well-known/nodeinfo")
            .with_status(200)
            .with_body(format!(
                r#"{{"links": [
                    {{"rel": "http://nodeinfo.diaspora.software/ns/schema/2.0", "href": "{0}/nodeinfo/2.0"}},
                    {{"rel": "http://nodeinfo.diaspora.software/ns/schema/2.1", "href": "{0}/nodeinfo/2.1"}}
                ]}}"#,
                server.url()
            ))
            .create_async()
            .await;
        let old_schema = server
            .mock("GET", "/nodeinfo/2.0")
            .expect(0)
            .create_async()
            .await;
        let new_schema = server
            .mock("GET", "/nodeinfo/2.1")
            .with_status(200)
            .with_body(
                r#"{"software": {"name": "misskey", "version": "13.2.0"},
                    "usage": {"users": {"total": 120, "activeMonth": 40}, "localPosts": 9000}}"#,
            )
            .create_async()
            .await;

        let fetcher = test_fetcher();
        let info = discover(&fetcher, &server.url()).await.unwrap();

        well_known.assert_async().await;
        old_schema.assert_async().await;
        new_schema.assert_async().await;
        assert_eq!(info.software.name, "misskey");
        assert_eq!(info.software.version, "13.2.0");
        assert_eq!(info.usage.users.total, Some(120));
        assert_eq!(info.usage.local_posts, Some(9000));
    }

    #[tokio::test]
    async fn discover_returns_none_when_well_known_is_missing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/.well-known/nodeinfo")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = test_fetcher();
        assert!(discover(&fetcher, &server.url()).await.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn discover_returns_none_on_malformed_identity_document() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/.well-known/nodeinfo")
            .with_status(200)
            .with_body(format!(
                r#"{{"links": [{{"rel": "http://nodeinfo.diaspora.software/ns/schema/2.0", "href": "{}/nodeinfo/2.0"}}]}}"#,
                server.url()
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/nodeinfo/2.0")
            .with_status(200)
            .with_body(r#"{"no_software_here": true}"#)
            .create_async()
            .await;

        let fetcher = test_fetcher();
        assert!(discover(&fetcher, &server.url()).await.is_none());
    }

    #[test]
    fn schema_version_parses_the_trailing_segment() {
        assert_eq!(
            schema_version("http://nodeinfo.diaspora.software/ns/schema/2.1"),
            (2, 1)
        );
        assert_eq!(schema_version("garbage"), (0, 0));
    }
}
