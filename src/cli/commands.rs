//! CLI commands implementation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use console::style;

use crate::compose::PanopticComposer;
use crate::config::{self, CrawlLimits, RunPaths, SizeLimits};
use crate::filter::CandidateFilter;
use crate::oracle::{HttpOracle, OracleKind};
use crate::pipeline::{CollectOptions, CollectService, Thresholds};
use crate::search::SearchClient;
use crate::store::AnnotationStore;

#[derive(Parser)]
#[command(name = "panharvest")]
#[command(about = "Panoptic segmentation dataset harvesting and annotation")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the web and build an annotated panoptic dataset
    Collect(CollectArgs),

    /// Rebuild the combined annotation file from intermediate records
    Combine {
        /// Run directory of a previous collection
        run_dir: PathBuf,
    },

    /// Write a label file skeleton for a search term
    Labels {
        /// Search term the label file is named after
        #[arg(long)]
        search: String,

        /// Category names, in oracle query order
        #[arg(required = true)]
        categories: Vec<String>,
    },
}

#[derive(Args)]
struct CollectArgs {
    /// Search term for the image web search
    #[arg(long)]
    search: String,

    /// Number of result pages to process (1-10)
    #[arg(long, default_value = "10")]
    pages: u32,

    /// YAML file listing the category labels to annotate
    #[arg(long)]
    label_file: PathBuf,

    /// Search API key
    #[arg(long, env = "PANHARVEST_API_KEY")]
    api_key: String,

    /// Custom search engine id
    #[arg(long, env = "PANHARVEST_ENGINE_ID")]
    engine_id: String,

    /// Only keep images with a commercial-use license
    #[arg(long)]
    commercial_only: bool,

    /// Crawl result pages for additional images
    #[arg(long)]
    deep_search: bool,

    /// Cap on pages fetched per deep crawl
    #[arg(long, default_value = "50")]
    max_crawl_pages: usize,

    /// Cap on link depth per deep crawl
    #[arg(long, default_value = "3")]
    max_crawl_depth: u32,

    /// Oracle model variant (vit_h, vit_l, vit_b)
    #[arg(long, default_value = "vit_l")]
    oracle: String,

    /// Oracle inference endpoint
    #[arg(long)]
    oracle_url: Option<String>,

    /// Bounding box confidence threshold
    #[arg(long, default_value = "0.3")]
    box_threshold: f32,

    /// Text confidence threshold
    #[arg(long, default_value = "0.25")]
    text_threshold: f32,

    /// Directory datasets are created under
    #[arg(long, default_value = "panharvest")]
    output_dir: PathBuf,

    /// Save annotated preview images next to the dataset
    #[arg(long)]
    save_previews: bool,
}

/// Entry point called from `main`.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Collect(args) => collect(args).await,
        Commands::Combine { run_dir } => combine(run_dir),
        Commands::Labels { search, categories } => labels(&search, &categories),
    }
}

async fn collect(args: CollectArgs) -> anyhow::Result<()> {
    // Label and oracle validation happens before any directory or network
    // work.
    let labels = config::load_labels(&args.label_file)?;
    let kind = OracleKind::from_str(&args.oracle)
        .with_context(|| format!("unsupported oracle variant: {}", args.oracle))?;

    let paths = RunPaths::new(&args.output_dir, &args.search);
    let search = SearchClient::new(
        &args.api_key,
        &args.engine_id,
        &args.search,
        args.commercial_only,
        args.deep_search,
        CrawlLimits {
            max_pages: args.max_crawl_pages,
            max_depth: args.max_crawl_depth,
        },
    )?;
    let filter = CandidateFilter::new(
        paths.images_dir(),
        args.commercial_only,
        SizeLimits::default(),
    )?;
    let store = AnnotationStore::create(&paths)?;
    let oracle = HttpOracle::new(kind, args.oracle_url.as_deref())?;
    let composer = PanopticComposer::new(Box::new(oracle), labels)?;

    let service = CollectService::new(
        search,
        filter,
        composer,
        store,
        paths,
        CollectOptions {
            pages: args.pages,
            thresholds: Thresholds {
                box_threshold: args.box_threshold,
                text_threshold: args.text_threshold,
            },
            save_previews: args.save_previews,
        },
    )?;
    service.run().await?;
    Ok(())
}

fn labels(search: &str, categories: &[String]) -> anyhow::Result<()> {
    let path = config::write_label_file(Path::new("."), search, categories)?;
    println!(
        "{} label file written to {}",
        style("done:").green().bold(),
        path.display()
    );
    Ok(())
}

fn combine(run_dir: PathBuf) -> anyhow::Result<()> {
    let paths = RunPaths::from_root(run_dir);
    let store = AnnotationStore::open_existing(&paths)?;
    let count = store.combine_all()?;
    println!(
        "{} {} records combined into {}",
        style("done:").green().bold(),
        count,
        store.combined_file().display()
    );
    Ok(())
}
