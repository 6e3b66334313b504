//! Connect to a BiDi endpoint and stream events.
//!
//! Demonstrates:
//! - Building a connection from `BIDI_*` environment options
//! - Session handshake with synthetic-id fallback
//! - Event listeners and a `session.subscribe` round trip
//! - Congestion warnings from the watchdog
//!
//! Usage:
//!   cargo run --example connect -- ws://127.0.0.1:9222/session
//!   cargo run --example connect -- ws://127.0.0.1:9222/session --no-wait
//!   cargo run --example connect -- --debug
//!
//! The endpoint URL falls back to `BIDI_URL`, then to `ws://127.0.0.1:9222/session`.

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;
use webdriver_bidi::{Connection, ConnectionOptions, EventFilter, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://127.0.0.1:9222/session";
const EVENTS: &[&str] = &["log.entryAdded", "browsingContext.load"];

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    url: String,
    debug: bool,
    no_wait: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let url = args
            .iter()
            .find(|a| !a.starts_with("--"))
            .cloned()
            .or_else(|| std::env::var("BIDI_URL").ok())
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        Self {
            url,
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== BiDi Connect ===\n");

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[1] Connecting to {}...", args.url);
    let connection = Connection::builder()
        .url(&args.url)
        .options(ConnectionOptions::from_env()?)
        .connect()
        .await?;
    println!("    ✓ Connected\n");

    // ========================================================================
    // Handshake
    // ========================================================================

    println!("[2] Establishing session...");
    let session_id = connection.establish_session(None).await?;
    if session_id.is_synthetic() {
        println!("    ✓ Session {session_id} (synthetic)\n");
    } else {
        println!("    ✓ Session {session_id}\n");
    }

    // ========================================================================
    // Events
    // ========================================================================

    println!("[3] Subscribing to {EVENTS:?}...");
    let _listener = connection.on_event(EventFilter::All, |event| {
        println!("    <- {} {}", event.method, event.params);
    });
    let subscription = connection.subscribe(EVENTS.iter().copied(), None).await?;
    println!("    ✓ Subscription {}\n", subscription.id);

    let mut warnings = connection.congestion_warnings();
    tokio::spawn(async move {
        while let Ok(warning) = warnings.recv().await {
            println!(
                "    [!] No traffic for {:?} with {} pending",
                warning.silence, warning.pending
            );
        }
    });

    wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Teardown
    // ========================================================================

    if connection.is_connected() {
        connection.unsubscribe(&subscription).await.ok();
        connection.end_session().await.ok();
    }

    let traffic = connection.traffic();
    connection.shutdown();
    println!(
        "\n[Done] sent={} received={}",
        traffic.messages_sent, traffic.messages_received
    );

    Ok(())
}

// ============================================================================
// Functions
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "webdriver_bidi=debug"
    } else {
        "webdriver_bidi=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
