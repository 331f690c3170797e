//! Federation-peer audit
//!
//! Pages through a hub instance's federation listing and collects
//! responding misskey hosts that appear neither in the configured
//! instance list nor the ignore-list. Best effort: any page failure
//! ends the walk with whatever was found so far.

use std::collections::BTreeSet;

use serde_json::{Value, json};
use tracing::warn;

use crate::config::Instance;
use crate::fetch::RetryFetcher;

/// Peers fetched per page; one extra is requested to detect the last page
const PAGE_SIZE: usize = 60;

pub async fn find_unlisted_hosts(
    fetcher: &RetryFetcher,
    scheme: &str,
    hub: &str,
    instances: &[Instance],
    ignored: &[String],
) -> Vec<String> {
    let url = format!("{scheme}://{hub}/api/federation/instances");
    let mut found = BTreeSet::new();
    let mut offset = 0usize;

    loop {
        let body = json!({
            "sort": "+pubSub",
            "limit": PAGE_SIZE + 1,
            "offset": offset,
        });

        let Some(page) = fetcher.post_json(&url, Some(&body)).await.into_value() else {
            warn!(hub, offset, "federation page fetch failed, stopping audit");
            break;
        };
        let Some(peers) = page.as_array() else {
            warn!(hub, offset, "federation page is not an array, stopping audit");
            break;
        };

        let has_next = peers.len() == PAGE_SIZE + 1;
        for peer in peers.iter().take(PAGE_SIZE) {
            let Some(host) = peer.get("host").and_then(Value::as_str) else {
                continue;
            };

            let is_misskey = peer.get("softwareName").and_then(Value::as_str) == Some("misskey");
            // a literal null status means "not yet delivered to", which
            // still counts as responding; an absent key does not
            let responding = peer.get("latestStatus").is_some_and(Value::is_null)
                || peer.get("isNotResponding").and_then(Value::as_bool) == Some(false);

            if is_misskey
                && responding
                && !ignored.iter().any(|h| h == host)
                && !instances.iter().any(|i| i.url == host)
            {
                found.insert(host.to_string());
            }
        }

        if !has_next {
            break;
        }
        offset += PAGE_SIZE;
    }

    found.into_iter().collect()
}

/// Urls that appear more than once in the configured instance list.
pub fn duplicated_urls(instances: &[Instance]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for instance in instances {
        if !seen.insert(instance.url.as_str()) {
            duplicated.insert(instance.url.clone());
        }
    }
    duplicated.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn test_fetcher() -> RetryFetcher {
        RetryFetcher::new(4).with_retry_delay(Duration::ZERO)
    }

    fn listed(url: &str) -> Instance {
        Instance {
            url: url.to_string(),
            name: None,
            langs: None,
            description: None,
        }
    }

    fn peer(host: &str, software: &str, not_responding: bool) -> Value {
        json!({
            "host": host,
            "softwareName": software,
            "latestStatus": 200,
            "isNotResponding": not_responding,
        })
    }

    #[tokio::test]
    async fn audit_pages_until_a_short_page_and_filters_peers() {
        let mut server = Server::new_async().await;

        // full first page: one fresh host padded with known ones
        let mut first: Vec<Value> = vec![peer("fresh.example", "misskey", false)];
        first.extend((0..PAGE_SIZE).map(|i| peer(&format!("pad{i}.example"), "misskey", false)));
        server
            .mock("POST", "/api/federation/instances")
            .match_body(Matcher::PartialJson(json!({"offset": 0})))
            .with_status(200)
            .with_body(serde_json::to_string(&first).unwrap())
            .create_async()
            .await;

        // short second page ends the walk; it also carries peers that
        // must be filtered out
        let second = vec![
            peer("mastodon.example", "mastodon", false),
            peer("down.example", "misskey", true),
            peer("ignored.example", "misskey", false),
            peer("listed.example", "misskey", false),
            // never delivered to: null status counts as responding
            json!({
                "host": "fresh-null.example",
                "softwareName": "misskey",
                "latestStatus": null,
                "isNotResponding": true,
            }),
            // no status fields at all: not known to respond
            json!({"host": "silent.example", "softwareName": "misskey"}),
        ];
        server
            .mock("POST", "/api/federation/instances")
            .match_body(Matcher::PartialJson(json!({"offset": PAGE_SIZE})))
            .with_status(200)
            .with_body(serde_json::to_string(&second).unwrap())
            .create_async()
            .await;

        let fetcher = test_fetcher();
        let hosts = find_unlisted_hosts(
            &fetcher,
            "http",
            &server.host_with_port(),
            &[listed("listed.example")],
            &["ignored.example".to_string()],
        )
        .await;

        assert!(hosts.contains(&"fresh.example".to_string()));
        assert!(hosts.contains(&"pad0.example".to_string()));
        assert!(hosts.contains(&"fresh-null.example".to_string()));
        assert!(!hosts.contains(&"silent.example".to_string()));
        assert!(!hosts.contains(&"mastodon.example".to_string()));
        assert!(!hosts.contains(&"down.example".to_string()));
        assert!(!hosts.contains(&"ignored.example".to_string()));
        assert!(!hosts.contains(&"listed.example".to_string()));
    }

    #[tokio::test]
    async fn audit_stops_cleanly_when_the_hub_is_unreachable() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/federation/instances")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = test_fetcher();
        let hosts =
            find_unlisted_hosts(&fetcher, "http", &server.host_with_port(), &[], &[]).await;

        assert!(hosts.is_empty());
    }

    #[test]
    fn duplicated_urls_finds_repeated_entries() {
        let instances = vec![
            listed("a.example"),
            listed("b.example"),
            listed("a.example"),
        ];

        assert_eq!(duplicated_urls(&instances), vec!["a.example"]);
    }
}
