//! Run one data source end to end against the in-memory store.
//!
//! Useful for vetting a new source configuration before it is added to the
//! real schedule:
//!
//! ```text
//! dryrun --url https://stadt.example.de --source-type website --depth 2
//! dryrun --url https://www.govdata.de/ckan/api/3/action/package_search \
//!     --source-type govdata --id-path id --name-path title
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use civhub_common::types::{DataSource, EntityType, FieldMapping, SourceType};
use civhub_common::{Config, LogSink};
use civhub_harvest::{DedupEngine, HarvestRunner, MemoryStore};
use embed_client::HttpEmbedder;

#[derive(Parser, Debug)]
#[command(name = "dryrun", about = "Run one data source against an in-memory store")]
struct Args {
    /// Source URL (start page, feed, OParl list, or API endpoint)
    #[arg(long)]
    url: String,

    /// website | rss | oparl | govdata | dip_bundestag | frag_den_staat |
    /// rest_api | sparql_api
    #[arg(long)]
    source_type: SourceType,

    #[arg(long, default_value = "dryrun source")]
    name: String,

    /// Link-following depth for website crawls
    #[arg(long, default_value_t = 1)]
    depth: u32,

    #[arg(long, default_value_t = 25)]
    max_pages: u32,

    /// JSON path to the external record id (API-backed sources)
    #[arg(long)]
    id_path: Option<String>,

    /// JSON path to the record name (API-backed sources)
    #[arg(long)]
    name_path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // The embedding key is only exercised by API-backed sources; plain
    // crawls run without it.
    let config = if std::env::var("CIVHUB_EMBED_API_KEY").is_ok() {
        Config::from_env()
    } else {
        Config::default()
    };

    let mut source = DataSource::new(&args.name, &args.url, args.source_type);
    source.crawl_depth = args.depth;
    source.max_pages = args.max_pages;
    if let (Some(id_path), Some(name_path)) = (&args.id_path, &args.name_path) {
        source.field_mapping = Some(FieldMapping::minimal(
            EntityType::Municipality,
            id_path,
            name_path,
        ));
    }
    let source_id = source.id;

    let store = Arc::new(MemoryStore::new());
    store.add_source(source);

    let embedder = Arc::new(
        HttpEmbedder::new(&config.embed_api_key, &config.embed_model)
            .with_base_url(&config.embed_base_url),
    );
    let dedup = Arc::new(DedupEngine::new(embedder, &config));

    let runner = HarvestRunner::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        dedup,
        Arc::new(LogSink),
        &config,
    )?;

    let summary = runner.run(source_id).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
