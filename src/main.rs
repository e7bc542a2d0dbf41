use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::PathBuf;
use tftstore::{
    Catalog, Collection, Config, DirSource, Filter, Record, RecordSource, SnapshotCache, Store, TextQuery,
};

#[derive(Parser)]
#[command(name = "tftstore")]
#[command(about = "tftstore CLI - TFT catalog loader with a trait -> champions index")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Config file (default: <config dir>/tftstore/config.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the store directory (overrides config)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Directory of API dumps to load from (overrides config)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Ignore the cached snapshot and reload from the data directory
    #[arg(short, long)]
    refresh: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List traits with their champions
    Traits,

    /// List champions ordered by cost
    Champions {
        /// Only champions declaring this trait
        #[arg(short, long = "trait")]
        trait_name: Option<String>,

        /// Field filter such as cost>=3 or role=ADCarry (repeatable, ANDed)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Search a collection by name, description or id
    Search {
        /// champions, traits, items or augments
        collection: String,

        /// Words to look for; any word matches
        query: Vec<String>,
    },

    /// Count active traits for a set of champion ids
    Tally {
        #[arg(required = true)]
        champions: Vec<String>,
    },

    /// Report records that failed to decode
    Check,

    /// Write the cached snapshot as JSONL dumps
    Export { dir: PathBuf },

    /// Inspect or clear cached snapshots
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// List cached snapshots
    List,

    /// Remove a cached snapshot
    Clear { key: String },
}

/// Source used when no data directory is configured; only a cached snapshot can serve the catalog
struct NoSource;

impl RecordSource for NoSource {
    fn fetch_all(&self, collection: Collection) -> Result<Vec<Record>> {
        Err(eyre!(
            "No cached snapshot and no data directory to load {} from (pass --data or set data-dir)",
            collection
        ))
    }
}

fn main() -> Result<()> {
    // Setup tracing; stdout is reserved for command output
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store_path) = cli.store_path {
        config.store_path = store_path;
    }
    if let Some(data) = cli.data {
        config.data_dir = Some(data);
    }

    // Open store
    let mut store = Store::open(&config.store_path)?;

    match cli.command {
        Commands::Traits => {
            let catalog = load_catalog(&config, &mut store, cli.refresh)?;
            print_header(&catalog);
            for summary in catalog.trait_summaries() {
                let champions: Vec<&str> = summary.champions.iter().map(|r| display_name(r)).collect();
                println!(
                    "{} ({}) {}",
                    summary.name.bold(),
                    summary.champions.len(),
                    champions.join(", ").dimmed()
                );
            }
        }
        Commands::Champions { trait_name, filters } => {
            let filters = parse_filters(&filters)?;
            let catalog = load_catalog(&config, &mut store, cli.refresh)?;

            let mut champions: Vec<&Record> = match &trait_name {
                Some(name) => catalog.champions_with_trait(name),
                None => catalog.champions().iter().collect(),
            };
            champions.retain(|r| filters.iter().all(|f| f.matches(r)));

            print_header(&catalog);
            for champion in champions {
                print_champion(champion);
            }
        }
        Commands::Search { collection, query } => {
            let collection: Collection = collection.parse()?;
            let query = TextQuery::new(&query.join(" "));
            let catalog = load_catalog(&config, &mut store, cli.refresh)?;

            let hits = catalog.search(collection, &query);
            println!("{} match(es) in {}", hits.len(), collection);
            for record in hits {
                println!("  {} {}", display_name(record).bold(), record.id.dimmed());
            }
        }
        Commands::Tally { champions } => {
            let catalog = load_catalog(&config, &mut store, cli.refresh)?;
            let ids: Vec<&str> = champions.iter().map(String::as_str).collect();
            for (name, count) in catalog.trait_tally(&ids) {
                println!("{:>3}  {}", count, name);
            }
        }
        Commands::Check => {
            let catalog = load_catalog(&config, &mut store, cli.refresh)?;
            let diagnostics = catalog.diagnostics();
            if diagnostics.is_empty() {
                println!("{}", "No problems found".green());
            } else {
                for d in diagnostics {
                    println!(
                        "{} {} {}: {}",
                        d.collection.to_string().dimmed(),
                        d.record_id.bold(),
                        d.kind.to_string().yellow(),
                        d.message
                    );
                }
                println!("{} problem(s) found", diagnostics.len());
            }
        }
        Commands::Export { dir } => {
            let count = store.export_jsonl(&config.snapshot_key, &dir)?;
            println!("Exported {} item(s) to {:?}", count, dir);
        }
        Commands::Cache { command } => match command {
            CacheCommand::List => {
                let keys = store.keys()?;
                if keys.is_empty() {
                    println!("No cached snapshots");
                }
                for (key, fetched_at) in keys {
                    println!("{}  {}", key.bold(), format_time(fetched_at));
                }
            }
            CacheCommand::Clear { key } => {
                if store.remove(&key)? {
                    println!("Removed snapshot {}", key);
                } else {
                    println!("No snapshot stored under {}", key);
                }
            }
        },
    }

    Ok(())
}

fn load_catalog(config: &Config, store: &mut Store, refresh: bool) -> Result<Catalog> {
    let options = config.load_options(refresh);
    match &config.data_dir {
        Some(dir) => Catalog::load(&DirSource::new(dir), store, &options),
        None => Catalog::load(&NoSource, store, &options),
    }
}

fn parse_filters(filters: &[String]) -> Result<Vec<Filter>> {
    filters.iter().map(|f| f.parse()).collect()
}

fn display_name(record: &Record) -> &str {
    record.name().unwrap_or(&record.id)
}

fn print_header(catalog: &Catalog) {
    let origin = if catalog.from_cache() { "cached" } else { "fresh" };
    println!(
        "{}",
        format!("Catalog {} ({}), {} champion(s)", format_time(catalog.fetched_at()), origin, catalog.champions().len())
            .dimmed()
    );
}

fn print_champion(champion: &Record) {
    let cost = champion
        .parsed
        .as_ref()
        .and_then(|p| p.cost())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:>2}  {}  {}",
        cost.yellow(),
        display_name(champion).bold(),
        champion.traits().join(", ").dimmed()
    );
}

fn format_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}
