//! SlopMute CLI
//!
//! CLI tool for running blocklist syncs and scanning feed snapshots against
//! a file-backed store.

use std::fs;
use std::time::Instant;

use clap::{Parser, Subcommand};

use sm_core::{
    extract_session_username, scan_feed, FeedDom, MuteEngine, SnapshotNode, SuppressionStyle,
};
use sm_core::mute::CollectingSink;
use sm_sync::{BlocklistCache, FileStore, HttpRemote, RemoteBlocklists, SyncEngine};

#[derive(Parser)]
#[command(name = "sm-cli")]
#[command(about = "SlopMute blocklist sync and feed scan tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize subscribed blocklists and rebuild the unified blocklist
    Sync {
        /// Remote API root, e.g. https://example.dev/api
        #[arg(short, long)]
        base_url: String,

        /// Store file
        #[arg(short, long, default_value = "slopmute-store.json")]
        store: String,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show counters and a unified-blocklist summary
    Status {
        /// Store file
        #[arg(short, long, default_value = "slopmute-store.json")]
        store: String,
    },

    /// Fetch and cache the blocklist metadata map
    Lists {
        /// Remote API root
        #[arg(short, long)]
        base_url: String,

        /// Store file
        #[arg(short, long, default_value = "slopmute-store.json")]
        store: String,
    },

    /// Classify a feed snapshot and apply mute actions
    Scan {
        /// Feed snapshot JSON file
        #[arg(short, long)]
        input: String,

        /// Store file
        #[arg(short, long, default_value = "slopmute-store.json")]
        store: String,

        /// Replace suppressed posts with a notice instead of removing them
        #[arg(long)]
        notice: bool,

        /// Write the mutated snapshot to this file
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync { base_url, store, verbose } => cmd_sync(&base_url, &store, verbose).await,
        Commands::Status { store } => cmd_status(&store).await,
        Commands::Lists { base_url, store } => cmd_lists(&base_url, &store).await,
        Commands::Scan { input, store, notice, output } => {
            cmd_scan(&input, &store, notice, output.as_deref()).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn cmd_sync(base_url: &str, store: &str, verbose: bool) -> Result<(), String> {
    let engine = SyncEngine::new(
        BlocklistCache::new(FileStore::open(store)),
        HttpRemote::new(base_url),
    );

    let start = Instant::now();
    let outcome = engine.synchronize().await.map_err(|e| e.to_string())?;
    let elapsed = start.elapsed();

    if verbose {
        for id in &outcome.refetched {
            println!("  refetched    {id}");
        }
        for id in &outcome.from_cache {
            println!("  from cache   {id}");
        }
        for id in &outcome.degraded {
            println!("  unavailable  {id}");
        }
    }

    println!(
        "Synchronized {} blocklists{}",
        outcome.refetched.len() + outcome.from_cache.len(),
        if outcome.fresh_install { " (fresh install)" } else { "" },
    );
    println!("  Refetched:   {}", outcome.refetched.len());
    println!("  From cache:  {}", outcome.from_cache.len());
    println!("  Unavailable: {}", outcome.degraded.len());
    println!("  Unified:     {} usernames", outcome.unified.len());
    println!("  Time:        {:.1}ms", elapsed.as_secs_f64() * 1000.0);

    Ok(())
}

async fn cmd_status(store: &str) -> Result<(), String> {
    let cache = BlocklistCache::new(FileStore::open(store));

    let preferences = cache.preferences().await.map_err(|e| e.to_string())?;
    let unified = cache.unified().await.map_err(|e| e.to_string())?;
    let scanned = cache.scanned_count().await.map_err(|e| e.to_string())?;
    let removed = cache.removed_count().await.map_err(|e| e.to_string())?;
    let session = cache.session_username().await.map_err(|e| e.to_string())?;

    println!("Store: {store}");
    println!("  Subscribed:  {}", preferences.value.join(", "));
    println!("  Unified:     {} usernames", unified.value.len());
    println!("  Scanned:     {scanned}");
    println!("  Removed:     {removed}");
    println!(
        "  Session:     {}",
        session.value.as_deref().unwrap_or("(unknown)")
    );

    Ok(())
}

async fn cmd_lists(base_url: &str, store: &str) -> Result<(), String> {
    let remote = HttpRemote::new(base_url);
    let map = remote.fetch_blocklists_map().await.map_err(|e| e.to_string())?;

    let cache = BlocklistCache::new(FileStore::open(store));
    cache.set_blocklists_map(&map).await.map_err(|e| e.to_string())?;

    println!("{} blocklists available", map.len());
    for (id, meta) in &map {
        println!("  {id:<24} {} - {}", meta.name, meta.description);
    }

    Ok(())
}

async fn cmd_scan(
    input: &str,
    store: &str,
    notice: bool,
    output: Option<&str>,
) -> Result<(), String> {
    let raw = fs::read_to_string(input).map_err(|e| format!("Failed to read '{input}': {e}"))?;
    let snapshot: SnapshotNode =
        serde_json::from_str(&raw).map_err(|e| format!("Invalid feed snapshot '{input}': {e}"))?;
    let mut dom = FeedDom::from_snapshot(&snapshot);

    let cache = BlocklistCache::new(FileStore::open(store));
    let unified = cache.unified().await.map_err(|e| e.to_string())?.value;

    let style = if notice { SuppressionStyle::Notice } else { SuppressionStyle::Remove };
    let mut engine = MuteEngine::new(style);
    engine.refresh(&unified);

    let scan = scan_feed(&mut dom);
    let mut sink = CollectingSink::default();
    let batch = engine.apply_batch(&mut dom, &scan.posts, &mut sink);

    // Counter persistence is best-effort; a failed write only warns.
    if let Err(error) = cache.increment_scanned(sink.scanned).await {
        log::warn!("failed to persist scanned counter: {error}");
    }
    if let Err(error) = cache.increment_removed(sink.removed).await {
        log::warn!("failed to persist removed counter: {error}");
    }

    if let Some(username) = extract_session_username(&dom) {
        let is_blocked = engine.is_blocked(&username);
        if let Err(error) = cache.set_session_username(&Some(username)).await {
            log::warn!("failed to persist session username: {error}");
        }
        if let Err(error) = cache.set_session_blocked(is_blocked).await {
            log::warn!("failed to persist session blocked flag: {error}");
        }
    }

    println!("Scanned {} posts ({} unclassifiable)", batch.scanned, scan.failed);
    println!("  Blocklist:   {} usernames", unified.len());
    println!("  Muted:       {}", batch.muted());
    for action in &batch.actions {
        println!("    {:?} @{}", action.decision, action.username);
    }

    if let Some(output) = output {
        let mutated = dom.to_snapshot(dom.root());
        let encoded = serde_json::to_string_pretty(&mutated).map_err(|e| e.to_string())?;
        fs::write(output, encoded).map_err(|e| format!("Failed to write '{output}': {e}"))?;
        println!("  Wrote mutated snapshot to '{output}'");
    }

    Ok(())
}
