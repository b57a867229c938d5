use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use interndex_catalog::{
    deadline_text, derive_view, AppConfig, Catalog, CatalogLoader, SortKey, ViewQuery,
};
use interndex_core::{ConfigCategory, Tag, TrackStatus};
use interndex_storage::{JsonFileKvStore, Suggestion, TrackedStatusStore, WebhookClient};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "interndex")]
#[command(about = "Internship directory command-line interface")]
struct Cli {
    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Log debug detail.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load the sheet once and print a summary with tag counts.
    Sync,
    /// Print the listings that pass the given filters.
    List {
        /// Case-insensitive company name match.
        #[arg(long, default_value = "")]
        query: String,
        /// Tag id to filter by; repeat for more.
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        #[arg(short, long, default_value_t = SortKey::Deadline)]
        sort: SortKey,
        #[arg(long)]
        tracked_only: bool,
    },
    /// Set a listing's tracked status, or `none` to stop tracking it.
    Track { id: String, status: String },
    /// Send a "suggest a company" message to the configured webhook.
    Suggest {
        #[arg(long)]
        company: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Serve the JSON API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;
    let config = AppConfig::from_env();
    debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let catalog = load(&config).await?;
            print_summary(&catalog);
        }
        Commands::List {
            query,
            tags,
            sort,
            tracked_only,
        } => {
            let catalog = load(&config).await?;
            let tracked = open_tracked(&config);
            let view_query = ViewQuery {
                query,
                selected_tags: tags,
                sort,
                tracked_only,
            };
            let visible = derive_view(
                &catalog.listings,
                &catalog.config,
                &view_query,
                tracked.entries(),
            );
            let today = Local::now().date_naive();
            for listing in &visible {
                let status = tracked
                    .get(&listing.id)
                    .map(|s| format!(" [{s}]"))
                    .unwrap_or_default();
                println!(
                    "{:>4}  {:<32} {:<16} {:<18} {}{}",
                    listing.id,
                    listing.name,
                    listing.stipend_amount,
                    deadline_text(listing.deadline, today),
                    listing.positions.join(","),
                    status
                );
            }
            println!("{} of {} listings", visible.len(), catalog.listings.len());
        }
        Commands::Track { id, status } => {
            let status = parse_track_arg(&status)?;
            let mut tracked = open_tracked(&config);
            tracked
                .set(&id, status)
                .with_context(|| format!("saving tracked status to {}", config.state_path.display()))?;
            match status {
                Some(status) => println!("{id}: {status}"),
                None => println!("{id}: untracked"),
            }
        }
        Commands::Suggest { company, url, note } => {
            let webhook = WebhookClient::new(config.webhook_url.clone(), config.http_timeout())?;
            let suggestion = Suggestion {
                company_name: company,
                job_post_url: url,
                note,
            };
            webhook
                .send_suggestion(&suggestion, Utc::now())
                .await
                .context("sending suggestion")?;
            println!("suggestion sent: {}", suggestion.company_name.trim());
        }
        Commands::Serve => {
            interndex_web::serve_from_env().await?;
        }
    }

    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("INTERNDEX_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

async fn load(config: &AppConfig) -> Result<Catalog> {
    CatalogLoader::from_config(config)?
        .load()
        .await
        .context("loading internship catalog")
}

fn open_tracked(config: &AppConfig) -> TrackedStatusStore {
    TrackedStatusStore::load(Box::new(JsonFileKvStore::open(&config.state_path)))
}

fn parse_track_arg(raw: &str) -> Result<Option<TrackStatus>> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Ok(Some(raw.parse()?))
}

fn print_summary(catalog: &Catalog) {
    let summary = catalog.summary();
    println!(
        "sync complete: load_id={} source={} listings={} open={} paid={} tags={}",
        summary.load_id, summary.source, summary.listings, summary.open, summary.paid, summary.tags
    );
    for category in &catalog.config {
        print_category(category);
    }
}

fn print_category(category: &ConfigCategory) {
    println!("{}:", category.label);
    print_tags(&category.tags, "  ");
    for sub in &category.sub_categories {
        println!("  {}:", sub.label);
        print_tags(&sub.tags, "    ");
    }
}

fn print_tags(tags: &[Tag], indent: &str) {
    for tag in tags {
        println!("{indent}{:<28} {:>3}  ({})", tag.label, tag.count, tag.id);
    }
}
