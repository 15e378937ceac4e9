use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use river_data_collector::collector::Collector;
use river_data_collector::config::Settings;
use river_data_collector::registry::SourceRegistry;
use river_data_collector::retriever::Retriever;
use river_data_collector::storage::keys::KeyLayout;
use river_data_collector::storage::memory::MemoryObjectStore;
use river_data_collector::storage::s3::S3ObjectStore;
use river_data_collector::storage::writer::StorageWriter;
use river_data_collector::storage::ObjectStore;

/// Collect river telemetry from all configured stations and write it to
/// object storage.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Read station definitions from a JSON file instead of
    /// DATA_SOURCES_JSON.
    #[arg(long)]
    sources_file: Option<String>,

    /// Run the full pipeline against an in-memory store; nothing is
    /// written to object storage.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,river_data_collector=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::from_env();

    let registry = match &args.sources_file {
        Some(path) => SourceRegistry::from_file(path),
        None => SourceRegistry::from_env(),
    };
    let registry = match registry {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("invalid source configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(stations = registry.len(), "source registry loaded");

    let store: Arc<dyn ObjectStore> = if args.dry_run {
        info!("dry run: using in-memory store");
        Arc::new(MemoryObjectStore::new())
    } else {
        match &settings.bucket {
            Some(bucket) => Arc::new(
                S3ObjectStore::new(bucket, &settings.region, settings.endpoint_url.as_deref())
                    .await,
            ),
            None => {
                warn!("S3_BUCKET_NAME not set, falling back to in-memory store");
                Arc::new(MemoryObjectStore::new())
            }
        }
    };

    let layout = KeyLayout::new(
        &settings.raw_prefix,
        &settings.parsed_prefix,
        &settings.aggregated_prefix,
    );
    let writer = Arc::new(StorageWriter::new(store, layout));
    let retriever = Retriever::new(
        settings.http_timeout,
        &settings.user_agent,
        settings.retry.clone(),
    );

    let collector = Collector::new(
        registry,
        retriever,
        writer,
        settings.compress_parsed,
        settings.collector_concurrency,
    );
    let report = collector.run().await;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize run report: {e}"),
    }

    if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
