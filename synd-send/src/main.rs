//! synd-send - Background daemon for scheduled posting
//!
//! Polls the post store at a fixed interval and delivers due posts to their
//! target platforms.

use clap::Parser;
use libsyndicate::{Config, Database, Dispatcher, PlatformRegistry, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "synd-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
synd-send - Background daemon for scheduled posting

DESCRIPTION:
    synd-send is a long-running daemon that polls the Syndicate database
    and publishes scheduled posts to their target platforms when they
    come due.

    Each platform is attempted independently: a post that reaches Mastodon
    but not Bluesky keeps its Mastodon delivery and is retried on Bluesky
    at the next poll. A post is marked sent once every target platform
    has accepted it.

USAGE:
    # Run in foreground (logs to stderr)
    synd-send

    # Run with custom poll interval
    synd-send --poll-interval 30

    # Enable verbose logging
    synd-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current tick)

CONFIGURATION:
    Configuration file: ~/.config/syndicate/config.toml
    Override with the SYNDICATE_CONFIG environment variable.

    [database]
    path = \"~/.local/share/syndicate/posts.db\"

    [dispatch]
    poll_interval = 60  # seconds between polls

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for scheduled posts (default: from config)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Process due posts once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let registry = PlatformRegistry::from_config(&config, &db)?;
    let dispatcher = Dispatcher::new(db, registry);

    info!("synd-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.dispatch.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    if cli.once {
        let sent = dispatcher.run_tick().await?;
        info!(sent, "synd-send: processed due posts once, exiting");
    } else {
        run_daemon_loop(&dispatcher, poll_interval, shutdown).await;
    }

    info!("synd-send daemon stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    if verbose {
        use libsyndicate::logging::{LogFormat, LoggingConfig};
        LoggingConfig::new(LogFormat::Text, "debug".to_string(), true).init();
    } else {
        libsyndicate::logging::init_default();
    }
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libsyndicate::SyndicateError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    // Signals are handled on a plain thread; the loop only reads the flag
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(dispatcher: &Dispatcher, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match dispatcher.run_tick().await {
            Ok(0) => {}
            Ok(sent) => info!(sent, "tick complete"),
            // Errors are logged and the daemon keeps polling
            Err(e) => error!("Error processing posts: {}", e),
        }

        // Sleep until next poll (check shutdown every second)
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
