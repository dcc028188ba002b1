use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::filter::FilterFn;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_STDOUT_FILTER: &str = "info,dedup=info,store=info,aggregate=info,validate=info";
const DEFAULT_FILE_FILTER: &str = "debug";

pub fn configure_logging(log_dir: &Path) {
    // The csv writer is chatty at trace level; never let it reach stdout.
    let custom_filter =
        FilterFn::new(|metadata| !(metadata.level() == &Level::TRACE && metadata.target() == "csv"));

    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDOUT_FILTER));

    // Stdout log configuration
    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_filter(stdout_filter)
        .with_filter(custom_filter);

    // Every removal decision is written to the daily file at debug level
    let file_appender = rolling::daily(log_dir, "newsdedup.log");
    let file_log = fmt::layer()
        .with_ansi(false)
        .with_writer(file_appender)
        .with_filter(EnvFilter::new(DEFAULT_FILE_FILTER));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();
}
