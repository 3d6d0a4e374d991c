mod crawl;
mod db;
mod enrich;
mod error;
mod listing;
mod net;
mod parser;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::crawl::CrawlOptions;
use crate::db::Store;
use crate::enrich::EnrichOptions;
use crate::listing::{ContentType, ListingFetcher};
use crate::net::HttpTransport;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "library_scraper", about = "Library catalogue discovery and enrichment")]
struct Cli {
    /// SQLite database file (overrides LIBRARY_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Pause between requests in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the listing for each content type and store new items
    Discover {
        /// Content types to crawl (default: all)
        #[arg(short = 't', long = "type", value_enum)]
        types: Vec<ContentType>,
        /// Stop each content type after this many pages
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Visit every stored item and fill in details and tags
    Enrich {
        /// Max items to visit (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Discover, then enrich
    Run {
        /// Stop each content type after this many pages
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Bring the database schema up to date
    Migrate,
    /// Show row counts
    Stats,
    /// Stored items overview table
    List {
        /// Filter by content type
        #[arg(short = 't', long = "type", value_enum)]
        content_type: Option<ContentType>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show one stored item with its tags
    Show { url: String },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(ms) = cli.delay_ms {
        settings.delay_ms = ms;
    }
    tracing::debug!(?settings, "settings loaded");

    let store = Store::open(&settings.db_path)
        .with_context(|| format!("Failed to open {:?}", settings.db_path))?;

    let result = match cli.command {
        Commands::Discover { types, max_pages } => {
            let types = if types.is_empty() { ContentType::ALL.to_vec() } else { types };
            discover(&store, &settings, &types, max_pages)
        }
        Commands::Enrich { limit } => enrich(&store, &settings, limit),
        Commands::Run { max_pages } => {
            discover(&store, &settings, &ContentType::ALL, max_pages)?;
            enrich(&store, &settings, None)
        }
        Commands::Migrate => {
            println!(
                "Schema up to date ({} migrations applied).",
                store.migrations_applied()
            );
            for table in ["library_items", "library_item_ages", "library_item_subjects"] {
                let cols = db::table_columns(store.conn(), table)?;
                println!("  {}: {}", table, cols.join(", "));
            }
            Ok(())
        }
        Commands::Stats => {
            let s = store.stats()?;
            println!("Items:        {}", s.total);
            println!("Enriched:     {}", s.enriched);
            println!("Age tags:     {}", s.age_tags);
            println!("Subject tags: {}", s.subject_tags);
            if !s.by_type.is_empty() {
                println!("\nBy content type:");
                for (content_type, n) in &s.by_type {
                    println!("  {:<12} {:>6}", content_type, n);
                }
            }
            Ok(())
        }
        Commands::List { content_type, limit } => {
            let rows = store.list_items(content_type, limit)?;
            if rows.is_empty() {
                println!("No items found. Run 'discover' first.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<36} | {:<12} | {:<14} | {:>4} | {:>4}",
                "id", "Title", "Type", "Resource", "Ages", "Subj"
            );
            println!("{}", "-".repeat(90));
            for r in &rows {
                println!(
                    "{:>5} | {:<36} | {:<12} | {:<14} | {:>4} | {:>4}",
                    r.id,
                    truncate(&r.title, 36),
                    r.content_type,
                    truncate(&r.resource_type, 14),
                    r.ages,
                    r.subjects
                );
            }
            println!("\n{} items", rows.len());
            Ok(())
        }
        Commands::Show { url } => {
            let Some(item) = store.find_by_url(&url)? else {
                println!("No item stored for {}", url);
                return Ok(());
            };
            println!("#{} {}", item.id, item.title.as_deref().unwrap_or("(untitled)"));
            println!("URL:        {}", item.url);
            println!("Type:       {}", item.content_type.as_deref().unwrap_or("-"));
            println!("Resource:   {}", item.resource_type.as_deref().unwrap_or("-"));
            println!("Discovered: {}", item.scraped_at.as_deref().unwrap_or("-"));
            println!("Card HTML:  {} bytes", item.html.as_deref().map_or(0, str::len));
            println!("Ages:       {}", store.ages_for(item.id)?.join(", "));
            println!("Subjects:   {}", store.subjects_for(item.id)?.join(", "));
            match item.description {
                Some(d) => println!("\n{}", d),
                None => println!("\n(not enriched yet)"),
            }
            Ok(())
        }
    };

    let result = with_close_result(result, store.close());

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn discover(
    store: &Store,
    settings: &Settings,
    types: &[ContentType],
    max_pages: Option<u32>,
) -> Result<()> {
    let transport = HttpTransport::new(&settings.user_agent)?;
    let fetcher = ListingFetcher::new(&transport, settings);
    let opts = CrawlOptions {
        delay: settings.delay(),
        max_pages: max_pages.or(settings.max_pages),
    };
    let stats = crawl::crawl_all(&fetcher, store, types, &opts)?;
    println!(
        "Discovered {} items on {} pages ({} new).",
        stats.seen, stats.pages, stats.inserted
    );
    Ok(())
}

fn enrich(store: &Store, settings: &Settings, limit: Option<usize>) -> Result<()> {
    let transport = HttpTransport::new(&settings.user_agent)?;
    let opts = EnrichOptions {
        timeout: settings.detail_timeout(),
        delay: settings.delay(),
        limit,
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let stats = enrich::enrich_all(&transport, store, &opts, &pb)?;
    println!(
        "Done: {} items ({} ok, {} errors).",
        stats.total, stats.ok, stats.errors
    );
    Ok(())
}

/// The command's own error wins; a close failure alongside it is only logged.
fn with_close_result(result: Result<()>, closed: error::Result<()>) -> Result<()> {
    match (result, closed) {
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close database");
            Err(e)
        }
        (Ok(()), Err(close_err)) => Err(close_err.into()),
        (result, Ok(())) => result,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
