use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use research_crawler::config::{find_config_file, get_config, load_config, Config, LogFormat};
use research_crawler::models::{FilterCriteria, Provider, RecordType, DEFAULT_MAX_RESULTS};
use research_crawler::sources::{SourceError, SourceRegistry};
use research_crawler::utils::streaming::snapshot;
use research_crawler::utils::CrawlState;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Research Crawler - Retrieve bibliographic records from PubMed, arXiv, bioRxiv and medRxiv
#[derive(Parser, Debug)]
#[command(name = "research-crawler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(about = "Crawl bibliographic records from multiple providers as JSON lines", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (overrides the configuration file)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormatArg>,

    /// Request timeout in seconds (overrides the configuration file)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormatArg {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Providers selectable on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SourceArg {
    #[value(name = "pubmed")]
    Pubmed,
    #[value(name = "arxiv")]
    Arxiv,
    #[value(name = "biorxiv")]
    Biorxiv,
    #[value(name = "medrxiv")]
    Medrxiv,
    #[value(name = "all")]
    All,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl one or more providers and print records as JSON lines
    #[command(alias = "c")]
    Crawl {
        /// Search query
        query: String,

        /// Provider to crawl (repeatable)
        #[arg(long, short, value_enum, default_values_t = [SourceArg::Pubmed])]
        source: Vec<SourceArg>,

        /// Maximum identifiers requested per provider
        #[arg(long, short, default_value_t = DEFAULT_MAX_RESULTS)]
        max_results: usize,

        /// Earliest publication year (inclusive)
        #[arg(long)]
        year_start: Option<i32>,

        /// Latest publication year (inclusive)
        #[arg(long)]
        year_end: Option<i32>,

        /// Restrict to author affiliation country (repeatable)
        #[arg(long)]
        country: Vec<String>,

        /// Restrict to publication type, e.g. review or clinical_trial (repeatable)
        #[arg(long = "record-type", value_parser = parse_record_type)]
        record_types: Vec<RecordType>,

        /// ISO 639-1 language code (repeatable, default: en)
        #[arg(long = "language")]
        languages: Vec<String>,

        /// Drop preprints from the output
        #[arg(long)]
        exclude_preprints: bool,

        /// Print each provider's crawl report as JSON to stderr when done
        #[arg(long)]
        report: bool,
    },

    /// List enabled providers with their rate limit and batch size
    #[command(alias = "ls")]
    Sources,

    /// Print the effective configuration as TOML
    Config {
        /// Write it to this file instead of stdout
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn parse_record_type(value: &str) -> Result<RecordType, String> {
    value.parse().map_err(|e: SourceError| e.to_string())
}

fn selected_providers(sources: &[SourceArg]) -> Vec<Provider> {
    if sources.contains(&SourceArg::All) {
        return Provider::ALL.to_vec();
    }
    let mut providers = Vec::new();
    for source in sources {
        let provider = match source {
            SourceArg::Pubmed => Provider::PubMed,
            SourceArg::Arxiv => Provider::Arxiv,
            SourceArg::Biorxiv => Provider::BioRxiv,
            SourceArg::Medrxiv => Provider::MedRxiv,
            SourceArg::All => continue,
        };
        if !providers.contains(&provider) {
            providers.push(provider);
        }
    }
    providers
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("research_crawler={}", level)));

    let format = cli
        .log_format
        .map(LogFormat::from)
        .unwrap_or(config.logging.format);

    // stdout carries the records, logs go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    if format == LogFormat::Json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load(cli: &Cli) -> Result<(Config, Option<PathBuf>)> {
    let path = cli.config.clone().or_else(find_config_file);
    let mut config = match &path {
        Some(path) => load_config(path)?,
        None => get_config()?,
    };
    if let Some(timeout) = cli.timeout {
        config.client.timeout_secs = timeout;
    }
    Ok((config, path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load(&cli)?;
    init_tracing(&cli, &config);

    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match cli.command {
        Commands::Crawl {
            query,
            source,
            max_results,
            year_start,
            year_end,
            country,
            record_types,
            languages,
            exclude_preprints,
            report,
        } => {
            let mut filters = FilterCriteria::new()
                .max_results(max_results)
                .exclude_preprints(exclude_preprints);
            filters.year_start = year_start;
            filters.year_end = year_end;
            filters.countries = country;
            filters.record_types = record_types;
            if !languages.is_empty() {
                filters = filters.languages(languages);
            }
            filters.validate()?;

            let registry = SourceRegistry::from_config(&config)?;
            run_crawl(&registry, &query, &filters, &selected_providers(&source), report).await
        }

        Commands::Sources => {
            let registry = SourceRegistry::from_config(&config)?;
            for provider in registry.providers() {
                let batch_size = registry
                    .get(provider)
                    .map(|s| s.crawl_batch_size())
                    .unwrap_or_default();
                println!(
                    "{:<8} {:<8} {:>6.2} req/s  batch {}",
                    provider.id(),
                    provider.name(),
                    registry.limiter().rate(provider).unwrap_or_default(),
                    batch_size
                );
            }
            Ok(())
        }

        Commands::Config { write } => {
            match write {
                Some(path) => {
                    config.save(&path)?;
                    tracing::info!("Configuration written to {}", path.display());
                }
                None => print!("{}", config.to_toml_string()?),
            }
            Ok(())
        }
    }
}

async fn run_crawl(
    registry: &SourceRegistry,
    query: &str,
    filters: &FilterCriteria,
    providers: &[Provider],
    print_reports: bool,
) -> Result<()> {
    let mut streams = Vec::with_capacity(providers.len());
    let mut reports = Vec::with_capacity(providers.len());
    for provider in providers {
        let stream = registry.crawl(*provider, query, filters)?;
        reports.push(stream.report_handle());
        streams.push(stream);
    }

    let mut merged = futures_util::stream::select_all(streams);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let stdout = std::io::stdout();
    loop {
        tokio::select! {
            item = merged.next() => match item {
                Some(Ok(paper)) => {
                    let mut out = stdout.lock();
                    serde_json::to_writer(&mut out, &paper)?;
                    writeln!(out)?;
                }
                Some(Err(e)) => tracing::error!(error = %e, kind = e.kind(), "Crawl failed"),
                None => break,
            },
            _ = &mut shutdown => {
                tracing::warn!("Interrupted, stopping crawls");
                break;
            }
        }
    }
    drop(merged);

    let mut failed = 0;
    for handle in &reports {
        let report = snapshot(handle);
        tracing::info!(
            provider = report.provider.id(),
            state = ?report.state,
            found = report.identifiers_found,
            yielded = report.records_yielded,
            filtered = report.records_filtered,
            skipped_batches = report.skipped_batches.len(),
            skipped_records = report.skipped_records.len(),
            missing = report.missing_ids.len(),
            "Crawl summary"
        );
        if print_reports {
            eprintln!("{}", serde_json::to_string(&report)?);
        }
        if report.state == CrawlState::Failed {
            failed += 1;
        }
    }

    if !reports.is_empty() && failed == reports.len() {
        bail!("all {} crawl(s) failed", failed);
    }
    Ok(())
}
