//! Hash reversal CLI
//!
//! Usage: hashrev_search [hash...] [--table-dir <PATH>] [--state <FILE>] [--user <ID>]
//! Without hash arguments, hashes are read interactively.
//!
//! Example:
//!   hashrev_search 202cb962ac59075b964b07152d234b70
//!   hashrev_search ac59075b964b0715 --table-dir ./tables
//!
//! Lookups are tracked in a state file (default: <table-dir>/tasks.json);
//! lookups left unfinished by an earlier run are resumed first.

use hashrev_rainbow::domain::table_format::TableFormatError;
use hashrev_rainbow::infra::file_task_store::FileTaskStore;
use hashrev_rainbow::infra::memory_store::{MemoryChainStore, MemoryPlaintextStore};
use hashrev_rainbow::infra::table_io::{get_table_path, load_chains};
use hashrev_rainbow::{EngineConfig, LookupHandle, LookupOutcome, LookupService, ServiceError};
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Args {
    hashes: Vec<String>,
    table_dir: PathBuf,
    state: Option<PathBuf>,
    user_id: u64,
}

fn format_table_error(path: &Path, err: TableFormatError) -> String {
    match err {
        TableFormatError::InvalidMagic => format!(
            "Invalid file: '{}' is not a chain table file.\nCreate one with hashrev_create.",
            path.display()
        ),
        TableFormatError::UnsupportedVersion(version) => format!(
            "Unsupported format version: {}.\nPlease regenerate the table file.",
            version
        ),
        TableFormatError::Truncated { expected, found } => format!(
            "Truncated table: header declares {} chains but only {} could be read.",
            expected, found
        ),
        other => other.to_string(),
    }
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();

    let mut hashes = Vec::new();
    let mut table_dir = PathBuf::from(".");
    let mut state = None;
    let mut user_id = 1;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--table-dir" | "--state" | "--user" => {
                let flag = args[i].clone();
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{} requires a value", flag))?;
                match flag.as_str() {
                    "--table-dir" => table_dir = PathBuf::from(value),
                    "--state" => state = Some(PathBuf::from(value)),
                    _ => {
                        user_id = value
                            .parse()
                            .map_err(|_| format!("Invalid user id: {}", value))?
                    }
                }
            }
            value if !value.starts_with('-') => hashes.push(value.to_string()),
            other => return Err(format!("Unknown option: {}", other)),
        }
        i += 1;
    }

    Ok(Args {
        hashes,
        table_dir,
        state,
        user_id,
    })
}

/// Print progress until the lookup ends, then report the outcome
async fn follow(service: &LookupService, handle: LookupHandle) {
    let task_id = handle.task_id();
    let start = Instant::now();

    while !handle.is_finished() {
        if let Some(p) = handle.snapshot() {
            print!(
                "\r[Task {}] {:>3}% tables {}/{} chains {} reductions {}",
                task_id,
                p.task.progress,
                p.detail.tables_searched,
                p.detail.total_tables,
                p.detail.chains_searched,
                p.detail.reduction_attempts
            );
            let _ = io::stdout().flush();
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    println!();

    match handle.wait().await {
        Ok(LookupOutcome::Found(plaintext)) => println!("Found: \"{}\"", plaintext),
        Ok(LookupOutcome::NotFound) => {
            println!("No plaintext found.");
            println!("The hash is not covered by the loaded chains.");
        }
        Ok(LookupOutcome::Cancelled) => println!("Lookup was cancelled."),
        Err(e) => eprintln!("Error: {}", e),
    }

    if let Ok(view) = service.status(task_id) {
        println!(
            "Task {} finished with status {:?} at {}%.",
            task_id, view.status, view.progress
        );
    }
    println!("Completed in {:.2} seconds.", start.elapsed().as_secs_f64());
}

async fn run_lookup(service: &LookupService, user_id: u64, hash: &str) {
    match service.start_lookup(user_id, hash) {
        Ok(handle) => follow(service, handle).await,
        Err(ServiceError::TaskAlreadyRunning { task_id, .. }) => {
            eprintln!("Error: task {} is still running for this user.", task_id);
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hashrev_rainbow=info,hashrev_search=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!(
                "Usage: hashrev_search [hash...] [--table-dir <PATH>] [--state <FILE>] [--user <ID>]"
            );
            std::process::exit(1);
        }
    };

    let table_path = get_table_path(&args.table_dir);
    println!("Loading table {}...", table_path.display());
    let start_load = Instant::now();

    let chains = match load_chains(&table_path) {
        Ok((_, chains)) => chains,
        Err(e) => {
            eprintln!("Error: {}", format_table_error(&table_path, e));
            std::process::exit(1);
        }
    };
    println!(
        "Loaded {} chains in {:.3} seconds",
        chains.len(),
        start_load.elapsed().as_secs_f64()
    );

    let state_path = args
        .state
        .unwrap_or_else(|| args.table_dir.join("tasks.json"));
    let tasks = match FileTaskStore::open(&state_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening state file {}: {}", state_path.display(), e);
            std::process::exit(1);
        }
    };

    let service = match LookupService::new(
        Arc::new(MemoryChainStore::from_chains(chains)),
        Arc::new(tasks),
        Arc::new(MemoryPlaintextStore::new()),
        EngineConfig::default(),
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match service.recover() {
        Ok(handles) => {
            if !handles.is_empty() {
                println!("Resuming {} unfinished lookup(s)...", handles.len());
            }
            for handle in handles {
                follow(&service, handle).await;
            }
        }
        Err(e) => eprintln!("Warning: could not resume unfinished lookups: {}", e),
    }

    if !args.hashes.is_empty() {
        for hash in &args.hashes {
            run_lookup(&service, args.user_id, hash).await;
        }
        return;
    }

    loop {
        print!("\nEnter a hash (32 or 16 hex digits, or 'q' to quit): ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => {
                eprintln!("Error reading input.");
                continue;
            }
        }

        let input = input.trim();
        if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }
        if input.is_empty() {
            continue;
        }

        run_lookup(&service, args.user_id, input).await;
    }
}
