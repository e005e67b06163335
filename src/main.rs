//! pqueue - Interactive Queue Shell
//!
//! This is the main entry point for the pqueue binary.
//! It opens a queue directory and reads commands from stdin until EOF,
//! `q`, or Ctrl+C, then closes the queue.

use pqueue::shell::{is_quit, CommandHandler};
use pqueue::storage::{PersistentQueue, QueueConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shell configuration
struct Config {
    /// Queue directory
    dir: PathBuf,
    /// Expiration index file name
    expire_file: String,
    /// Sweep interval in milliseconds
    sweep_ms: u64,
    /// Delete the queue on exit
    clear_on_exit: bool,
    /// Log every queue notification
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(pqueue::DEFAULT_DIRECTORY),
            expire_file: pqueue::storage::DEFAULT_EXPIRY_FILE.to_string(),
            sweep_ms: pqueue::storage::DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            clear_on_exit: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--dir" | "-d" => {
                    config.dir = PathBuf::from(required_value(&args, i, "--dir"));
                    i += 2;
                }
                "--expire-file" => {
                    config.expire_file = required_value(&args, i, "--expire-file").to_string();
                    i += 2;
                }
                "--sweep-ms" => {
                    config.sweep_ms = required_value(&args, i, "--sweep-ms")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid sweep interval");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--clear-on-exit" => {
                    config.clear_on_exit = true;
                    i += 1;
                }
                "--verbose" => {
                    config.verbose = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("pqueue version {}", pqueue::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_expiry_file_name(self.expire_file.clone())
            .with_sweep_interval(Duration::from_millis(self.sweep_ms))
            .with_clear_on_close(self.clear_on_exit)
    }
}

fn required_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
pqueue - A Disk-Backed Persistent Queue

USAGE:
    pqueue [OPTIONS]

OPTIONS:
    -d, --dir <DIR>           Queue directory (default: ./temp/)
        --expire-file <NAME>  Expiration index file name (default: .expire)
        --sweep-ms <MS>       Expiry sweep interval in ms (default: 500)
        --clear-on-exit       Delete the queue and its directory on exit
        --verbose             Log every queue notification
    -v, --version             Print version information
    -h, --help                Print this help message

EXAMPLES:
    pqueue                          # Queue in ./temp/
    pqueue --dir /var/spool/outbox  # Queue in a specific directory
    pqueue --clear-on-exit          # Scratch queue, removed on exit

SESSION:
    Command [?/help]: ENQUEUE "hello world" 60
    6f1c0e52-8a0b-4a52-9d53-2a8f4c4f0b7e
    Command [?/help]: DEPTH
    (integer) 1
    Command [?/help]: DEQUEUE
    key: 6f1c0e52-8a0b-4a52-9d53-2a8f4c4f0b7e
    hello world
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
pqueue v{} - Disk-Backed Persistent Queue
──────────────────────────────────────────────────────────────
Queue directory: {}
Type ? for help, q to quit.
"#,
        pqueue::VERSION,
        config.dir.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Open the queue (also starts its expiry sweeper)
    let queue = PersistentQueue::open(&config.dir, config.queue_config()).await?;

    if config.verbose {
        queue.subscribe(|event| info!("{}", event));
    }

    let handler = CommandHandler::new(Arc::clone(&queue));

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, closing queue...");
    };

    tokio::select! {
        result = command_loop(handler) => result?,
        _ = shutdown => {}
    }

    queue.close().await?;
    info!("Queue closed");
    Ok(())
}

/// Reads commands from stdin and prints replies until EOF or quit.
async fn command_loop(handler: CommandHandler) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"Command [?/help]: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if is_quit(line) {
            break;
        }
        if line.eq_ignore_ascii_case("cls") {
            stdout.write_all(b"\x1B[2J\x1B[1;1H").await?;
            continue;
        }

        let reply = handler.execute(line).await;
        stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
    }

    Ok(())
}
