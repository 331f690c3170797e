//! Per-instance evaluation state machine
//!
//! Fixed sequence with early exits: Discover → IdentityCheck →
//! VersionGate → MetricFetch → Score → LanguageClassify → Finalize.
//! Every instance terminates in exactly one category; no failure here
//! may abort another instance's evaluation.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{ACTIVITY_WINDOW, CrawlerConfig, Instance, NOTE_TEXT_LIMIT};
use crate::crawler::nodeinfo::{self, NodeInfo};
use crate::fetch::RetryFetcher;
use crate::lang::LanguageVoter;
use crate::version::ledger::ReleaseLedger;
use crate::version::resolver::{self, VersionResolution};

/// Terminal state of one instance's evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// Passed every gate and was scored
    Alive,
    /// Unreachable, or reachable but missing required metric documents
    Dead,
    /// Runs something other than the target software; kept for audit
    NotMisskey,
    /// Reports a version with a known vulnerability; not probed further
    Outdated,
}

/// Everything known about one instance after evaluation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedInstance {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub langs: Vec<String>,
    pub category: Category,
    pub value: f64,
    pub npd15: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_info: Option<NodeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<VersionResolution>,
}

impl EvaluatedInstance {
    fn terminal(instance: Instance, category: Category) -> Self {
        Self {
            url: instance.url,
            name: instance.name,
            description: instance.description,
            langs: instance.langs.unwrap_or_default(),
            category,
            value: 0.0,
            npd15: 0.0,
            node_info: None,
            meta: None,
            stats: None,
            resolution: None,
        }
    }

    fn dead(instance: Instance) -> Self {
        Self::terminal(instance, Category::Dead)
    }

    fn not_misskey(instance: Instance, node_info: NodeInfo) -> Self {
        Self {
            node_info: Some(node_info),
            ..Self::terminal(instance, Category::NotMisskey)
        }
    }

    fn outdated(instance: Instance, node_info: NodeInfo, resolution: VersionResolution) -> Self {
        Self {
            node_info: Some(node_info),
            resolution: Some(resolution),
            ..Self::terminal(instance, Category::Outdated)
        }
    }
}

/// Evaluates one instance against the frozen ledger. Shares the fetcher
/// (and thereby the global request cap) with every other evaluation.
pub struct InstanceEvaluator<'a> {
    pub fetcher: &'a RetryFetcher,
    pub ledger: &'a ReleaseLedger,
    pub config: &'a CrawlerConfig,
}

impl InstanceEvaluator<'_> {
    pub async fn evaluate(&self, instance: Instance) -> EvaluatedInstance {
        let base = format!("{}://{}", self.config.scheme, instance.url);

        // Discover
        let Some(node_info) = nodeinfo::discover(self.fetcher, &base).await else {
            return EvaluatedInstance::dead(instance);
        };

        // IdentityCheck
        if node_info.software.name != "misskey" {
            return EvaluatedInstance::not_misskey(instance, node_info);
        }

        // VersionGate: a known-vulnerable instance gets no further
        // requests that could look like probing.
        let resolution = resolver::resolve(self.ledger, &node_info.software.version);
        if resolution.exact && resolution.has_vulnerability {
            return EvaluatedInstance::outdated(instance, node_info, resolution);
        }

        // MetricFetch: the three documents overlap but still draw from
        // the shared request pool.
        let meta_url = format!("{base}/api/meta");
        let stats_url = format!("{base}/api/stats");
        let chart_url = format!("{base}/api/charts/notes");
        let chart_body = json!({"span": "day", "limit": ACTIVITY_WINDOW});
        let (meta, stats, chart) = tokio::join!(
            self.fetcher.post_json(&meta_url, None),
            self.fetcher.post_json(&stats_url, None),
            self.fetcher.post_json(&chart_url, Some(&chart_body)),
        );
        let (Some(mut meta), Some(stats)) = (meta.into_value(), stats.into_value()) else {
            return EvaluatedInstance::dead(instance);
        };
        let Some(npd15) = mean_nonzero_local_inc(chart.into_value()) else {
            return EvaluatedInstance::dead(instance);
        };

        redact_meta(&mut meta);

        // Score
        let scoring = self.config.scoring;
        let value = scoring.base - (resolution.value_count as f64 - scoring.offset) * scoring.penalty
            + npd15 * scoring.activity_weight;

        // LanguageClassify
        let langs = match &instance.langs {
            Some(langs) => langs.clone(),
            None => self.classify_languages(&base, &instance, &meta).await,
        };

        // Finalize
        let description = meta
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(instance.description);

        EvaluatedInstance {
            url: instance.url,
            name: instance.name,
            description,
            langs,
            category: Category::Alive,
            value,
            npd15,
            node_info: Some(node_info),
            meta: Some(meta),
            stats: Some(stats),
            resolution: Some(resolution),
        }
    }

    /// Votes over the instance's own texts plus a sample of featured and
    /// local-timeline posts. Sampling failures only shrink the sample.
    async fn classify_languages(
        &self,
        base: &str,
        instance: &Instance,
        meta: &Value,
    ) -> Vec<String> {
        let mut voter = LanguageVoter::new();

        let description = meta
            .get("description")
            .and_then(Value::as_str)
            .or(instance.description.as_deref());
        let name = meta
            .get("name")
            .and_then(Value::as_str)
            .or(instance.name.as_deref());
        voter.seed(description, name);

        let featured_url = format!("{base}/api/notes/featured");
        let timeline_url = format!("{base}/api/notes/local-timeline");
        let sample_body = json!({"limit": 10});
        let (featured, timeline) = tokio::join!(
            self.fetcher.post_json(&featured_url, Some(&sample_body)),
            self.fetcher.post_json(&timeline_url, Some(&sample_body)),
        );

        let mut seen = HashSet::new();
        for notes in [featured.into_value(), timeline.into_value()]
            .into_iter()
            .flatten()
        {
            let Some(notes) = notes.as_array() else {
                continue;
            };
            for note in notes {
                if let Some(id) = note.get("id").and_then(Value::as_str)
                    && !seen.insert(id.to_string())
                {
                    continue;
                }
                if let Some(text) = note_text(note) {
                    voter.cast(&text);
                }
            }
        }

        voter.tally(&self.config.default_langs)
    }
}

/// Mean of the non-zero samples in the most recent activity window of
/// the notes chart's local post increments. None when the chart is
/// malformed; 0.0 when every sample is zero.
fn mean_nonzero_local_inc(chart: Option<Value>) -> Option<f64> {
    let chart = chart?;
    let inc = chart.get("local")?.get("inc")?.as_array()?;

    let samples: Vec<f64> = inc.iter().filter_map(Value::as_f64).collect();
    let recent = &samples[samples.len().saturating_sub(ACTIVITY_WINDOW)..];
    let nonzero: Vec<f64> = recent.iter().copied().filter(|v| *v != 0.0).collect();

    Some(if nonzero.is_empty() {
        0.0
    } else {
        nonzero.iter().sum::<f64>() / nonzero.len() as f64
    })
}

/// Drops the large substructures nobody downstream needs, to bound
/// memory and output size.
fn redact_meta(meta: &mut Value) {
    if let Some(object) = meta.as_object_mut() {
        object.remove("emojis");
        object.remove("announcements");
    }
}

/// Author name, content warning, truncated body and poll options,
/// concatenated for language detection.
fn note_text(note: &Value) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(name) = note.pointer("/user/name").and_then(Value::as_str) {
        parts.push(name.to_string());
    }
    if let Some(cw) = note.get("cw").and_then(Value::as_str) {
        parts.push(cw.to_string());
    }
    if let Some(text) = note.get("text").and_then(Value::as_str) {
        parts.push(text.chars().take(NOTE_TEXT_LIMIT).collect());
    }
    if let Some(choices) = note.pointer("/poll/choices").and_then(Value::as_array) {
        for choice in choices {
            if let Some(text) = choice.get("text").and_then(Value::as_str) {
                parts.push(text.to_string());
            }
        }
    }

    let text = parts.join(" ");
    (!text.trim().is_empty()).then_some(text)
}
