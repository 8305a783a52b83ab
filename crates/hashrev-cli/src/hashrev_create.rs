//! Chain table creation CLI
//!
//! Usage: hashrev_create [options]
//!
//! Options:
//!   --count <N>          Number of chains to generate (default: 10)
//!   --chain-length <N>   Hash evaluations per chain (default: 1000)
//!   --variant <N>        Reduction variant (default: 0)
//!   --charset <CODE>     Charset selector 1-6 (default: 1, digits)
//!   --range <CHARS>      Custom alphabet, overrides --charset
//!   --min <N>            Minimum plaintext length (default: 3)
//!   --max <N>            Maximum plaintext length (default: min + 5)
//!   --table-dir <PATH>   Directory holding the table file (default: .)
//!   --fresh              Replace the existing table instead of appending
//!   --help, -h           Show help
//!
//! Example: hashrev_create --count 5000 --chain-length 2000 --charset 2 --min 4 --max 6

use hashrev_rainbow::app::generator::{generate_chains_with_progress, store_chains};
use hashrev_rainbow::infra::memory_store::MemoryChainStore;
use hashrev_rainbow::infra::store::ChainStore;
use hashrev_rainbow::infra::table_io::{get_table_path, load_chains, save_chains};
use hashrev_rainbow::{CharsetSelector, EngineConfig, GenerateRequest};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

struct Args {
    request: GenerateRequest,
    table_dir: PathBuf,
    fresh: bool,
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --count <N>          Number of chains to generate (default: 10)");
    eprintln!("  --chain-length <N>   Hash evaluations per chain (default: 1000)");
    eprintln!("  --variant <N>        Reduction variant, 0-4 (default: 0)");
    eprintln!("  --charset <CODE>     1 digits, 2 lower, 3 upper, 4 mixed, 5 mixed+digits, 6 full");
    eprintln!("  --range <CHARS>      Custom alphabet, overrides --charset");
    eprintln!("  --min <N>            Minimum plaintext length (default: 3)");
    eprintln!("  --max <N>            Maximum plaintext length (default: min + 5)");
    eprintln!("  --table-dir <PATH>   Directory holding the table file (default: .)");
    eprintln!("  --fresh              Replace the existing table instead of appending");
    eprintln!("  --help, -h           Show this help message");
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: &mut usize) -> Result<T, String> {
    let flag = &args[*i];
    *i += 1;
    let value = args
        .get(*i)
        .ok_or_else(|| format!("{} requires a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();

    let mut request = GenerateRequest::default();
    let mut table_dir = PathBuf::from(".");
    let mut fresh = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" => request.count = parse_value(&args, &mut i)?,
            "--chain-length" => request.chain_length = parse_value(&args, &mut i)?,
            "--variant" => request.reduction_variant = parse_value(&args, &mut i)?,
            "--charset" => {
                request.charset_selector = CharsetSelector::from_code(parse_value(&args, &mut i)?)
            }
            "--range" => request.charset_range = parse_value(&args, &mut i)?,
            "--min" => request.min_length = parse_value(&args, &mut i)?,
            "--max" => request.max_length = parse_value(&args, &mut i)?,
            "--table-dir" => table_dir = parse_value(&args, &mut i)?,
            "--fresh" => fresh = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                std::process::exit(0);
            }
            other => return Err(format!("Unknown option: {}", other)),
        }
        i += 1;
    }

    Ok(Args {
        request,
        table_dir,
        fresh,
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hashrev_rainbow=info,hashrev_create=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage(&env::args().next().unwrap_or_default());
            std::process::exit(1);
        }
    };

    let request = args.request.normalized(&EngineConfig::default());
    let table_path = get_table_path(&args.table_dir);

    let existing = if !args.fresh && table_path.exists() {
        match load_chains(&table_path) {
            Ok((_, chains)) => {
                println!("Appending to {} ({} chains)", table_path.display(), chains.len());
                chains
            }
            Err(e) => {
                eprintln!("Error loading {}: {}", table_path.display(), e);
                eprintln!("Use --fresh to replace the file.");
                std::process::exit(1);
            }
        }
    } else {
        Vec::new()
    };
    let store = MemoryChainStore::from_chains(existing);

    println!(
        "Generating {} chains (length {}, variant {}, lengths {}-{}, alphabet \"{}\")...",
        request.count,
        request.chain_length,
        request.reduction_variant,
        request.min_length,
        request.max_length,
        request.alphabet().as_string()
    );

    let start = Instant::now();
    let progress_callback = |current: usize, total: usize| {
        let progress = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            100.0
        };
        print!(
            "\r[Generation] Progress: {:.2}% ({}/{})",
            progress, current, total
        );
        let _ = io::stdout().flush();
    };

    let chains = generate_chains_with_progress(&request, progress_callback);
    println!();

    let stored = store_chains(&store, chains);
    println!(
        "Generated {} chains in {:.2} seconds",
        stored,
        start.elapsed().as_secs_f64()
    );

    let total = store.count().unwrap_or(stored);
    println!("Saving {} chains to {}...", total, table_path.display());
    if let Err(e) = save_chains(&table_path, &store.chains()) {
        eprintln!("Error saving table: {}", e);
        std::process::exit(1);
    }

    let file_size = std::fs::metadata(&table_path)
        .map(|m| m.len())
        .unwrap_or(0);
    println!("File size: {:.2} MB", file_size as f64 / (1024.0 * 1024.0));
    println!("The table is ready for searching with hashrev_search.");
}
