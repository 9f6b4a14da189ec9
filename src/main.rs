//! filehash command-line tool
//!
//! Inspects and edits a hash table file.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use filehash::{CursorKind, HashDb, HashOptions, OpenFlags};
use tracing_subscriber::{fmt, EnvFilter};

/// filehash
#[derive(Parser, Debug)]
#[command(name = "filehash")]
#[command(about = "Inspect and edit a linear-hash key/value file")]
#[command(version)]
struct Args {
    /// Database file
    db: String,

    /// Page size used when the file is created
    #[arg(short, long, default_value = "4096")]
    bucket_size: usize,

    /// Page cache size in KiB
    #[arg(short, long, default_value = "1024")]
    cache_kb: usize,

    /// Compact overflow chains when closing
    #[arg(short, long)]
    rearrange: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value
    Put { key: String, value: String },

    /// Print a value
    Get { key: String },

    /// Delete a key
    Del { key: String },

    /// Print every record
    Dump {
        /// Print keys only
        #[arg(short, long)]
        keys_only: bool,
    },

    /// Print table statistics
    Stat,

    /// Print the configuration directory and user info length
    Info,
}

fn run(args: Args) -> filehash::Result<()> {
    let read_only = matches!(
        args.command,
        Commands::Get { .. } | Commands::Dump { .. } | Commands::Stat | Commands::Info
    );
    let flags = if read_only {
        OpenFlags::read_only()
    } else {
        OpenFlags::read_write()
    };
    let opts = HashOptions::builder()
        .bucket_size(args.bucket_size)
        .cache_size(args.cache_kb * 1024)
        .rearrange_pages(args.rearrange)
        .build();

    let db = HashDb::open(&args.db, flags, &opts)?;
    match args.command {
        Commands::Put { key, value } => db.put(key.as_bytes(), value.as_bytes())?,
        Commands::Get { key } => match db.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(not found)"),
        },
        Commands::Del { key } => db.delete(key.as_bytes())?,
        Commands::Dump { keys_only } => {
            let kind = if keys_only {
                CursorKind::Keys
            } else {
                CursorKind::KeysAndValues
            };
            for record in db.cursor(kind)? {
                let record = record?;
                match record.value {
                    Some(value) => println!(
                        "{}\t{}",
                        String::from_utf8_lossy(&record.key),
                        String::from_utf8_lossy(&value)
                    ),
                    None => println!("{}", String::from_utf8_lossy(&record.key)),
                }
            }
        }
        Commands::Stat => {
            let stats = db.stats()?;
            println!("keys:            {}", stats.num_keys);
            println!("buckets:         {}", stats.num_buckets);
            println!("split pointer:   {}", stats.split_pointer);
            println!("split level:     {}", stats.split_level);
            println!("page size:       {}", stats.page_size);
            println!("pages:           {}", stats.num_pages);
            println!("overflow pages:  {}", stats.overflow_pages);
            println!("free pages:      {}", stats.free_pages);
            println!(
                "cache:           {} hits, {} misses",
                stats.pool.hits, stats.pool.misses
            );
        }
        Commands::Info => {
            for cfg in db.get_all_configs()? {
                println!(
                    "{:>4} config={} inserted={} type={} mtime={} {}",
                    cfg.index, cfg.config, cfg.inserted, cfg.config_type, cfg.mtime, cfg.fname
                );
            }
            let len = db.user_info()?.len();
            println!("user info: {} of {} bytes", len, db.max_user_info_len()?);
        }
    }
    db.close()
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("filehash: {}", e);
            ExitCode::FAILURE
        }
    }
}
