//! Instance evaluation pipeline
//!
//! The ledger is built once and frozen, then every configured instance
//! is evaluated concurrently against it. The only cross-instance
//! coupling is the fetcher's global request cap.
//!
//! # Modules
//!
//! - [`nodeinfo`]: two-step liveness/identity discovery
//! - [`evaluator`]: the per-instance state machine
//! - [`federation`]: audit for responding hosts missing from the list

pub mod evaluator;
pub mod federation;
pub mod nodeinfo;

use std::cmp::Ordering;
use std::collections::BTreeSet;

use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::config::{CrawlerConfig, Instance};
use crate::crawler::evaluator::{Category, EvaluatedInstance, InstanceEvaluator};
use crate::fetch::RetryFetcher;
use crate::version::ledger::{self, ReleaseLedger};
use crate::version::sources::ReleaseSource;
use crate::version::vulnerability::VulnerabilityTable;

/// Everything one crawl produces, handed to the persistence and
/// notification collaborators.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub alive: Vec<EvaluatedInstance>,
    pub dead: Vec<EvaluatedInstance>,
    pub not_misskey: Vec<EvaluatedInstance>,
    pub outdated: Vec<EvaluatedInstance>,
    /// Raw per-repository release-tag listing
    pub raw_tags: IndexMap<String, Vec<String>>,
    /// Union of the languages discovered across alive instances
    pub langs: Vec<String>,
    /// Responding hosts found by the federation audit but missing from
    /// the configured list (empty unless the audit ran)
    pub unlisted: Vec<String>,
}

pub struct Crawler {
    fetcher: RetryFetcher,
    config: CrawlerConfig,
}

impl Crawler {
    pub fn new(config: CrawlerConfig) -> Self {
        let fetcher = RetryFetcher::new(config.concurrency);
        Self::with_fetcher(config, fetcher)
    }

    pub fn with_fetcher(config: CrawlerConfig, fetcher: RetryFetcher) -> Self {
        Self { fetcher, config }
    }

    pub fn fetcher(&self) -> &RetryFetcher {
        &self.fetcher
    }

    /// Builds the ledger, then evaluates every instance against it.
    pub async fn run(
        &self,
        instances: Vec<Instance>,
        ignored: &[String],
        sources: &[Box<dyn ReleaseSource>],
        vulnerabilities: &VulnerabilityTable,
        primary_repo: &str,
    ) -> CrawlReport {
        let ledger = ledger::build_ledger(sources, vulnerabilities, primary_repo).await;
        info!(releases = ledger.len(), "release ledger frozen");
        self.run_with_ledger(instances, ignored, ledger).await
    }

    /// Evaluates every non-ignored instance concurrently against a
    /// pre-built ledger and partitions the results.
    pub async fn run_with_ledger(
        &self,
        instances: Vec<Instance>,
        ignored: &[String],
        ledger: ReleaseLedger,
    ) -> CrawlReport {
        let instances: Vec<Instance> = instances
            .into_iter()
            .filter(|i| !ignored.iter().any(|h| h == &i.url))
            .collect();
        info!(instances = instances.len(), "starting evaluation");

        let evaluator = InstanceEvaluator {
            fetcher: &self.fetcher,
            ledger: &ledger,
            config: &self.config,
        };
        let evaluations = join_all(
            instances
                .into_iter()
                .map(|instance| evaluator.evaluate(instance)),
        )
        .await;

        let mut report = CrawlReport {
            alive: Vec::new(),
            dead: Vec::new(),
            not_misskey: Vec::new(),
            outdated: Vec::new(),
            raw_tags: ledger.raw_tags,
            langs: Vec::new(),
            unlisted: Vec::new(),
        };

        let mut langs = BTreeSet::new();
        for evaluated in evaluations {
            match evaluated.category {
                Category::Alive => {
                    langs.extend(evaluated.langs.iter().cloned());
                    report.alive.push(evaluated);
                }
                Category::Dead => report.dead.push(evaluated),
                Category::NotMisskey => report.not_misskey.push(evaluated),
                Category::Outdated => report.outdated.push(evaluated),
            }
        }
        report.langs = langs.into_iter().collect();

        // ties broken by url so repeated runs order identically
        report.alive.sort_by(|a, b| {
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.url.cmp(&b.url))
        });

        info!(
            alive = report.alive.len(),
            dead = report.dead.len(),
            not_misskey = report.not_misskey.len(),
            outdated = report.outdated.len(),
            "evaluation finished"
        );

        report
    }
}
