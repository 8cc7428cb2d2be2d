//! Command-line front end for inspecting and filling on-disk trees.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use pagetree::primitives::bytes::u64_key;
use pagetree::{BTree, BTreeOptions, BTreeStatsSnapshot, Entry, FilePager, PagerOptions, VerifyReport};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pagetree",
    version,
    about = "Inspect and fill paged B-tree files keyed by 64-bit integers",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "TOML file with tree options")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty tree file
    Create {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        #[arg(long, help = "Page size in bytes")]
        page_size: Option<usize>,
        #[arg(long, default_value_t = 0, help = "Pages to preallocate")]
        capacity_hint: u64,
    },
    /// Insert one entry
    Insert {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        key: u64,
        value: u64,
    },
    /// Insert `count` sequential keys starting at `start`, each valued by its key
    Fill {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long)]
        count: u64,
    },
    /// Print every entry stored under a key
    Get {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        key: u64,
    },
    /// Print entries with keys in `[from, to]`
    Range {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        from: u64,
        to: u64,
    },
    /// Report tree shape, counters and a structural check
    Stats {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct EntryView {
    key: Option<u64>,
    value: Option<u64>,
    key_hex: String,
    value_hex: String,
}

impl From<&Entry> for EntryView {
    fn from(entry: &Entry) -> Self {
        Self {
            key: as_u64(&entry.key),
            value: as_u64(&entry.value),
            key_hex: hex::encode(&entry.key),
            value_hex: hex::encode(&entry.value),
        }
    }
}

#[derive(Serialize)]
struct StatsReport {
    page_size: usize,
    key_size: Option<usize>,
    value_size: Option<usize>,
    cached_leaves: usize,
    verify: VerifyReport,
    counters: BTreeStatsSnapshot,
}

#[derive(Serialize)]
struct CreateReport {
    path: String,
    page_size: usize,
}

#[derive(Serialize)]
struct WriteReport {
    inserted: u64,
    height: usize,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagetree=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = load_options(cli.config.as_deref())?;

    match cli.command {
        Command::Create {
            db_path,
            page_size,
            capacity_hint,
        } => {
            let pager_opts = PagerOptions::default()
                .page_size(page_size.unwrap_or(options.page_size))
                .capacity_hint_pages(capacity_hint);
            let pager = FilePager::create(&db_path, pager_opts)?;
            let mut tree = BTree::create(pager, options)?;
            tree.flush()?;
            info!(path = %db_path.display(), page_size = tree.page_size(), "created tree file");
            let report = CreateReport {
                path: db_path.display().to_string(),
                page_size: tree.page_size(),
            };
            emit(cli.format, &report, |report| {
                println!("created {} (page_size={})", report.path, report.page_size);
            })?;
        }
        Command::Insert {
            db_path,
            key,
            value,
        } => {
            let mut tree = open_tree(&db_path, options)?;
            tree.insert(&u64_key(key), &u64_key(value))?;
            tree.flush()?;
            let report = WriteReport {
                inserted: 1,
                height: tree.height(),
            };
            emit(cli.format, &report, print_write_text)?;
        }
        Command::Fill {
            db_path,
            start,
            count,
        } => {
            let mut tree = open_tree(&db_path, options)?;
            let end = start
                .checked_add(count)
                .ok_or("start + count overflows u64")?;
            for key in start..end {
                let bytes = u64_key(key);
                tree.insert(&bytes, &bytes)?;
            }
            tree.flush()?;
            info!(count, height = tree.height(), "filled tree");
            let report = WriteReport {
                inserted: count,
                height: tree.height(),
            };
            emit(cli.format, &report, print_write_text)?;
        }
        Command::Get { db_path, key } => {
            let mut tree = open_tree(&db_path, options)?;
            let entries = tree.get(&u64_key(key))?;
            emit_entries(cli.format, &entries)?;
        }
        Command::Range { db_path, from, to } => {
            let mut tree = open_tree(&db_path, options)?;
            let entries = tree.range(&u64_key(from), &u64_key(to))?;
            emit_entries(cli.format, &entries)?;
        }
        Command::Stats { db_path } => {
            let mut tree = open_tree(&db_path, options)?;
            let verify = tree.verify()?;
            let report = StatsReport {
                page_size: tree.page_size(),
                key_size: tree.key_size(),
                value_size: tree.value_size(),
                cached_leaves: tree.cached_leaves(),
                verify,
                counters: tree.stats().snapshot(),
            };
            tree.stats().emit_tracing();
            emit(cli.format, &report, print_stats_text)?;
        }
    }

    Ok(())
}

fn load_options(path: Option<&Path>) -> Result<BTreeOptions, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(BTreeOptions::default());
    };
    let text = fs::read_to_string(path)?;
    let options: BTreeOptions = toml::from_str(&text)?;
    options.validate()?;
    Ok(options)
}

fn open_tree(path: &Path, options: BTreeOptions) -> Result<BTree, Box<dyn Error>> {
    let pager = FilePager::open(path)?;
    Ok(BTree::open(pager, options)?)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(&T),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(value),
    }
    Ok(())
}

fn emit_entries(format: OutputFormat, entries: &[Entry]) -> Result<(), Box<dyn Error>> {
    let views: Vec<EntryView> = entries.iter().map(EntryView::from).collect();
    emit(format, &views, |views| {
        for view in views {
            match (view.key, view.value) {
                (Some(key), Some(value)) => println!("{key}\t{value}"),
                _ => println!("{}\t{}", view.key_hex, view.value_hex),
            }
        }
        println!("({} entries)", views.len());
    })
}

fn print_write_text(report: &WriteReport) {
    println!("inserted {} (height={})", report.inserted, report.height);
}

fn print_stats_text(report: &StatsReport) {
    println!("Tree:");
    println!(
        "  page_size={} key_size={} value_size={}",
        report.page_size,
        display_width(report.key_size),
        display_width(report.value_size)
    );
    println!(
        "  height={} inner_nodes={} leaves={} entries={}",
        report.verify.height, report.verify.inner_nodes, report.verify.leaves, report.verify.entries
    );
    println!("  cached_leaves={}", report.cached_leaves);
    println!();
    println!(
        "Counters: leaf_loads={} cache_hits={} evictions={} leaf_writes={}",
        report.counters.leaf_loads,
        report.counters.cache_hits,
        report.counters.leaf_evictions,
        report.counters.leaf_writes
    );
    println!("Verify: ok");
}

fn display_width(width: Option<usize>) -> String {
    width.map_or_else(|| "-".to_string(), |w| w.to_string())
}

fn as_u64(bytes: &[u8]) -> Option<u64> {
    bytes.try_into().ok().map(u64::from_be_bytes)
}
