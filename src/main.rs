use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use instance_scout::config::{self, CrawlerConfig};
use instance_scout::crawler::{Crawler, federation};
use instance_scout::version::sources::{self, PRIMARY_REPO};
use instance_scout::version::vulnerability::VulnerabilityTable;

#[derive(Parser)]
#[command(name = "instance-scout")]
#[command(version, about = "Probes, classifies and ranks Misskey instances")]
struct Cli {
    /// Instance list (YAML)
    #[arg(long, default_value = "data/instances.yml")]
    instances: PathBuf,

    /// Host ignore-list (YAML)
    #[arg(long, default_value = "data/ignorehosts.yml")]
    ignore_hosts: PathBuf,

    /// Report output path; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Cap on in-flight requests across all instances
    #[arg(long)]
    concurrency: Option<usize>,

    /// Hub instance for the federation-peer audit
    #[arg(long)]
    hub: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let instances = config::load_instances(&cli.instances)?;
    let ignored = if cli.ignore_hosts.exists() {
        config::load_ignored_hosts(&cli.ignore_hosts)?
    } else {
        Vec::new()
    };

    for url in federation::duplicated_urls(&instances) {
        warn!(url, "duplicated instance entry");
    }

    let mut crawler_config = CrawlerConfig::default();
    if let Some(concurrency) = cli.concurrency {
        crawler_config.concurrency = concurrency;
    }
    let scheme = crawler_config.scheme.clone();

    let crawler = Crawler::new(crawler_config);
    let mut report = crawler
        .run(
            instances.clone(),
            &ignored,
            &sources::default_sources(),
            &VulnerabilityTable::default(),
            PRIMARY_REPO,
        )
        .await;

    if let Some(hub) = &cli.hub {
        report.unlisted =
            federation::find_unlisted_hosts(crawler.fetcher(), &scheme, hub, &instances, &ignored)
                .await;
    }

    let json = serde_json::to_string_pretty(&report)?;
    match cli.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)?;
        }
        None => println!("{json}"),
    }

    Ok(())
}
