//! tagfile-cache CLI
//!
//! Entry point for the `tagfile-cache` command-line tool.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use tagfile_cache::logging::init_tracing;
use tagfile_cache::{CacheOptions, CleanMode, FileBackend, Lifetime};

#[derive(Parser)]
#[command(name = "tagfile-cache")]
#[command(about = "File-system cache with per-tag index files", version)]
struct Cli {
    /// Path to a TOML options file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Cache root directory (overrides the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Disable tag file locking
    #[arg(long, global = true)]
    no_locking: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store stdin under an id
    Put {
        id: String,

        /// Tag to attach (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,

        /// Lifetime in seconds (default: the configured default lifetime)
        #[arg(long, conflicts_with = "never")]
        ttl: Option<u64>,

        /// Never expire
        #[arg(long)]
        never: bool,
    },

    /// Write the payload for an id to stdout
    Get {
        id: String,

        /// Return the payload even if it has expired
        #[arg(long)]
        skip_validity: bool,
    },

    /// Show metadata for an id
    Meta { id: String },

    /// Remove an id
    Remove { id: String },

    /// List known tags
    Tags,

    /// List ids, optionally filtered by tags
    Ids(IdsFilter),

    /// Remove entries by mode: all, old, matchingTag, notMatchingTag, matchingAnyTag
    Clean {
        mode: CleanMode,

        /// Tag to match (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
    },
}

#[derive(Args)]
#[group(multiple = false)]
struct IdsFilter {
    /// Ids carrying all of these tags
    #[arg(long, num_args = 1..)]
    all_of: Vec<String>,

    /// Ids carrying any of these tags
    #[arg(long, num_args = 1..)]
    any_of: Vec<String>,

    /// Ids carrying none of these tags
    #[arg(long, num_args = 1..)]
    none_of: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.json) {
        eprintln!("{}", e);
    }

    let backend = open_backend(&cli);
    let json = cli.json;

    match cli.command {
        Commands::Put {
            id,
            tags,
            ttl,
            never,
        } => {
            let lifetime = match (ttl, never) {
                (_, true) => Lifetime::Never,
                (Some(seconds), false) => Lifetime::Seconds(seconds),
                (None, false) => Lifetime::Default,
            };
            run_put(&backend, &id, &tags, lifetime);
        }
        Commands::Get { id, skip_validity } => run_get(&backend, &id, skip_validity),
        Commands::Meta { id } => run_meta(&backend, &id, json),
        Commands::Remove { id } => {
            if !backend.remove(&id) {
                eprintln!("Failed to remove {}", id);
                process::exit(1);
            }
        }
        Commands::Tags => print_list(backend.tags(), json),
        Commands::Ids(filter) => run_ids(&backend, filter, json),
        Commands::Clean { mode, tags } => run_clean(&backend, mode, &tags, json),
    }
}

fn open_backend(cli: &Cli) -> FileBackend {
    let mut options = match &cli.config {
        Some(path) => match CacheOptions::load(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                process::exit(1);
            }
        },
        None => CacheOptions::default(),
    };

    if let Some(dir) = &cli.cache_dir {
        options.cache_dir = dir.clone();
    }
    if cli.no_locking {
        options.file_locking = false;
    }

    match FileBackend::new(options) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Invalid options: {}", e);
            process::exit(1);
        }
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(|s| s.as_str()).collect()
}

fn run_put(backend: &FileBackend, id: &str, tags: &[String], lifetime: Lifetime) {
    let mut payload = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut payload) {
        eprintln!("Error reading stdin: {}", e);
        process::exit(1);
    }

    if !backend.save(id, &payload, &as_strs(tags), lifetime) {
        eprintln!("Failed to save {}", id);
        process::exit(1);
    }
}

fn run_get(backend: &FileBackend, id: &str, skip_validity: bool) {
    let Some(payload) = backend.load(id, skip_validity) else {
        eprintln!("Not cached: {}", id);
        process::exit(1);
    };

    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout.write_all(&payload).and_then(|()| stdout.flush()) {
        eprintln!("Error writing payload: {}", e);
        process::exit(1);
    }
}

fn run_meta(backend: &FileBackend, id: &str, json: bool) {
    let Some(metadata) = backend.metadata(id) else {
        eprintln!("Not cached: {}", id);
        process::exit(1);
    };

    if json {
        print_json(&metadata);
    } else {
        match metadata.expire {
            Some(expire) => println!("expire: {}", expire),
            None => println!("expire: never"),
        }
        println!("mtime:  {}", metadata.mtime);
        println!("tags:   {}", metadata.tags.join(", "));
    }
}

fn run_ids(backend: &FileBackend, filter: IdsFilter, json: bool) {
    let ids = if !filter.all_of.is_empty() {
        backend.ids_matching_tags(&as_strs(&filter.all_of))
    } else if !filter.any_of.is_empty() {
        backend.ids_matching_any_tags(&as_strs(&filter.any_of))
    } else if !filter.none_of.is_empty() {
        backend.ids_not_matching_tags(&as_strs(&filter.none_of))
    } else {
        backend.ids()
    };
    print_list(ids, json);
}

fn run_clean(backend: &FileBackend, mode: CleanMode, tags: &[String], json: bool) {
    let report = backend.sweep(mode, &as_strs(tags));

    if json {
        print_json(&report);
    } else {
        println!("Removed {} entries", report.removed.len());
        println!("  Tag files deleted: {}", report.tags_deleted);
        println!("  Tag files pruned:  {}", report.tags_pruned);
        for error in &report.errors {
            println!("  Error: {}", error);
        }
    }

    if !report.is_success() {
        process::exit(1);
    }
}

fn print_list(values: impl IntoIterator<Item = String>, json: bool) {
    if json {
        print_json(&values.into_iter().collect::<Vec<_>>());
    } else {
        for value in values {
            println!("{}", value);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
