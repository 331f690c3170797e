use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Time-related constants
// =============================================================================

/// Timeout for a single fetch attempt in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Delay between retry attempts in milliseconds (60 seconds)
pub const RETRY_DELAY_MS: u64 = 60_000;

/// Maximum number of attempts per request (first try included)
pub const MAX_ATTEMPTS: u32 = 3;

/// Threshold above which a request is logged as slow (1 second)
pub const SLOW_REQUEST_MS: u128 = 1_000;

// =============================================================================
// Crawl constants
// =============================================================================

/// Default cap on in-flight requests across all instances
pub const DEFAULT_CONCURRENCY: usize = 32;

/// Concurrency bound for release-page fetches against a single forge
pub const LEDGER_PAGE_CONCURRENCY: usize = 3;

/// Ledger position assigned to versions that match nothing in the ledger
pub const UNKNOWN_VERSION_RANK: u32 = 1_500;

/// Maximum characters of note body fed to language detection
pub const NOTE_TEXT_LIMIT: usize = 512;

/// Number of daily chart samples considered for the activity bonus
pub const ACTIVITY_WINDOW: usize = 15;

/// Languages assumed when detection yields nothing and the instance
/// declares none
pub const DEFAULT_LANGS: &[&str] = &["ja", "en", "de", "fr", "zh", "ko", "ru", "th", "es"];

/// One instance entry from the configured instance list
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Instance {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub langs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Crawler configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CrawlerConfig {
    /// URL scheme used to reach instances ("https" everywhere but tests)
    pub scheme: String,
    /// Cap on in-flight requests across all instances
    pub concurrency: usize,
    /// Fallback language set when detection finds nothing
    pub default_langs: Vec<String>,
    pub scoring: ScoringConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            default_langs: DEFAULT_LANGS.iter().map(|s| s.to_string()).collect(),
            scoring: ScoringConfig::default(),
        }
    }
}

/// Scoring constants. Policy, not mechanism: the shape of the formula is
/// fixed (linear version penalty plus a small activity bonus) but the
/// constants are tunable.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    pub base: f64,
    pub offset: f64,
    pub penalty: f64,
    pub activity_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base: 100_000.0,
            offset: 30.0,
            penalty: 7_200.0,
            activity_weight: 100.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Loads the instance list from a YAML file.
pub fn load_instances(path: &Path) -> Result<Vec<Instance>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Loads the host ignore-list from a YAML file.
pub fn load_ignored_hosts(path: &Path) -> Result<Vec<String>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn crawler_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<CrawlerConfig>(json!({
            "concurrency": 8
        }))
        .unwrap();

        assert_eq!(result.concurrency, 8);
        assert_eq!(result.scheme, "https");
        assert_eq!(result.scoring, ScoringConfig::default());
    }

    #[test]
    fn scoring_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<ScoringConfig>(json!({
            "base": 50000.0,
            "offset": 10.0,
            "penalty": 1000.0,
            "activityWeight": 2.0
        }))
        .unwrap();

        assert_eq!(
            result,
            ScoringConfig {
                base: 50_000.0,
                offset: 10.0,
                penalty: 1_000.0,
                activity_weight: 2.0,
            }
        );
    }

    #[test]
    fn load_instances_reports_a_missing_file_as_io() {
        let error = load_instances(Path::new("does/not/exist.yml")).unwrap_err();
        assert!(matches!(error, ConfigError::Io(_)));
    }

    #[test]
    fn load_instances_reports_malformed_yaml_as_parse() {
        let path = std::env::temp_dir().join("instance-scout-malformed-instances.yml");
        std::fs::write(&path, "url: [unclosed").unwrap();

        let error = load_instances(&path).unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn instance_list_parses_from_yaml() {
        let yaml = r#"
- url: misskey.example
  name: Example
  langs: [ja]
- url: other.example
"#;
        let instances: Vec<Instance> = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].url, "misskey.example");
        assert_eq!(instances[0].langs, Some(vec!["ja".to_string()]));
        assert_eq!(instances[1].name, None);
    }
}
