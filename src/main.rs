use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use newsdedup::aggregate::GlobalAggregator;
use newsdedup::config::{DedupConfig, KeywordSpec};
use newsdedup::identity::format_timestamp;
use newsdedup::logging::configure_logging;
use newsdedup::pipeline::KeywordPipeline;
use newsdedup::source::{JsonFileProvider, StoredContent};
use newsdedup::store::GlobalStore;
use newsdedup::summary::{ExecutionLog, RunSummary};
use newsdedup::validate::{default_checks, Validator};
use newsdedup::TARGET_PIPELINE;

const EXECUTION_LOG: &str = "execution_log.csv";

#[derive(Parser)]
#[clap(name = "newsdedup", about = "Deduplicate keyword news collections")]
struct Cli {
    /// Root directory holding keyword folders and final/ (overrides NEWSDEDUP_OUTPUT_ROOT)
    #[clap(long, global = true)]
    output_root: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the keyword pipeline for one keyword from a captured search response
    Ingest {
        /// Search keyword
        #[clap(short, long)]
        keyword: String,

        /// JSON file in the search API response format
        #[clap(short, long)]
        input: PathBuf,

        /// Drop articles whose title does not mention the keyword
        #[clap(long)]
        keyword_required: bool,
    },

    /// Run the keyword pipeline for every configured keyword
    IngestAll {
        /// Directory holding one <keyword>.json per keyword
        #[clap(short, long)]
        input_dir: PathBuf,

        /// Keywords to run (`keyword` or `keyword:required`), instead of NEWSDEDUP_KEYWORDS
        #[clap(short, long, value_delimiter = ';')]
        keywords: Vec<String>,
    },

    /// Build the global canonical archive from every keyword's selected archive
    Aggregate,

    /// Check the committed global outputs; exits 1 on failure, 2 on warnings
    Validate,

    /// Ingest every keyword, aggregate, then validate
    Run {
        /// Directory holding one <keyword>.json per keyword
        #[clap(short, long)]
        input_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = DedupConfig::from_env().context("Invalid configuration")?;
    if let Some(output_root) = args.output_root {
        config.output_root = output_root;
    }
    configure_logging(&config.log_dir);
    info!(
        target: TARGET_PIPELINE,
        "newsdedup {} writing to {}",
        env!("CARGO_PKG_VERSION"),
        config.output_root.display()
    );

    match args.command {
        Commands::Ingest {
            keyword,
            input,
            keyword_required,
        } => {
            let provider = JsonFileProvider::file(input);
            let spec = KeywordSpec {
                keyword,
                keyword_required,
            };
            ingest(&config, &provider, &[spec])?;
        }
        Commands::IngestAll {
            input_dir,
            keywords,
        } => {
            let specs = keyword_specs(&config, &keywords)?;
            ingest(&config, &JsonFileProvider::directory(input_dir), &specs)?;
        }
        Commands::Aggregate => aggregate(&config)?,
        Commands::Validate => std::process::exit(validate(&config)),
        Commands::Run { input_dir } => {
            let specs = keyword_specs(&config, &[])?;
            ingest(&config, &JsonFileProvider::directory(input_dir), &specs)?;
            aggregate(&config)?;
            std::process::exit(validate(&config));
        }
    }
    Ok(())
}

fn keyword_specs(config: &DedupConfig, entries: &[String]) -> Result<Vec<KeywordSpec>> {
    let specs: Vec<KeywordSpec> = if entries.is_empty() {
        config.keywords.clone()
    } else {
        entries.iter().map(|entry| KeywordSpec::parse(entry)).collect()
    };
    if specs.is_empty() {
        bail!("No keywords given; pass --keywords or set NEWSDEDUP_KEYWORDS");
    }
    Ok(specs)
}

fn ingest(
    config: &DedupConfig,
    provider: &JsonFileProvider,
    specs: &[KeywordSpec],
) -> Result<()> {
    let started = Utc::now();
    let pipeline = KeywordPipeline::new(config, provider, &StoredContent);
    let stats = pipeline.run_keywords(specs);

    let log = ExecutionLog::new(config.output_root.join(EXECUTION_LOG));
    if let Err(e) = log.record(&started, &stats) {
        warn!(target: TARGET_PIPELINE, "Could not update {}: {:#}", log.path().display(), e);
    }

    let summary = RunSummary::new(stats);
    println!("{}", summary);
    if summary.success_count() == 0 {
        bail!("Every keyword run failed");
    }
    Ok(())
}

fn aggregate(config: &DedupConfig) -> Result<()> {
    let store = GlobalStore::for_config(config);
    let keywords = store.discover_keywords()?;
    if keywords.is_empty() {
        warn!(target: TARGET_PIPELINE, "No keyword archives under {}", config.output_root.display());
    }
    let archives = store.load_keyword_archives(&keywords)?;

    let execute_at = format_timestamp(&Utc::now());
    let aggregation = GlobalAggregator::from_config(config).aggregate(archives, &execute_at)?;
    store.commit(&aggregation)?;

    println!(
        "{} rows pooled: {} canonical, {} identity duplicates, {} similarity duplicates ({:.1}% removed)",
        aggregation.total_rows,
        aggregation.canonical.len(),
        aggregation.identity_removed,
        aggregation.similarity_removed,
        aggregation.duplicate_ratio() * 100.0
    );
    Ok(())
}

fn validate(config: &DedupConfig) -> i32 {
    let store = GlobalStore::for_config(config);
    let report = Validator::new(default_checks(config)).run_on_store(&store);
    for (name, outcome) in &report.results {
        println!("{:<28} {}", name, outcome);
    }
    report.exit_code()
}
