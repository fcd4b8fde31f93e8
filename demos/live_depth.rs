//! Live depth mirror - keeps local order books in sync with Binance
//!
//! Usage:
//!   cargo run --example live_depth
//!
//! Optional:
//!   BINANCE_ENV=testnet       # Use the spot testnet (default: production)
//!   BINANCE_SYMBOLS=BNBBTC,ETHBTC  # Symbols to mirror (default: BTCUSDT)
//!   BINANCE_DEPTH=10          # Levels printed per side (default: 5)

use std::sync::Arc;
use std::time::Duration;

use binance_depth::config::Environment;
use binance_depth::sync::BookEvent;
use binance_depth::{Config, DepthClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("binance_depth=info".parse()?),
        )
        .init();

    let env = match std::env::var("BINANCE_ENV")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "testnet" => Environment::Testnet,
        _ => Environment::Production,
    };
    let symbols: Vec<String> = std::env::var("BINANCE_SYMBOLS")
        .unwrap_or_else(|_| "BTCUSDT".to_string())
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    let depth: usize = std::env::var("BINANCE_DEPTH")
        .ok()
        .and_then(|d| d.parse().ok())
        .unwrap_or(5);

    println!("=== Binance Live Depth ===\n");

    let client = Arc::new(DepthClient::new(Config::new().with_environment(env))?);

    for symbol in &symbols {
        client.subscribe(symbol, |event: &BookEvent| match event {
            BookEvent::Synced {
                symbol,
                last_update_id,
            } => println!("[SYNCED] {} at {}", symbol, last_update_id),
            BookEvent::Resyncing {
                symbol,
                attempt,
                reason,
            } => println!("[RESYNC] {} attempt {}: {}", symbol, attempt, reason),
            BookEvent::Failed { symbol, reason, .. } => {
                println!("[FAILED] {}: {}", symbol, reason)
            }
            BookEvent::Updated(_) => {}
        })?;
    }

    println!("Connecting to stream for {}...", symbols.join(", "));
    let mut ws = client.connect_stream().await?;
    println!("Connected!\n");

    let pump = {
        let client = client.clone();
        tokio::spawn(async move { client.pump(&mut ws).await })
    };

    println!("=== Streaming Live Data ===");
    println!("(Press Ctrl+C to stop)\n");

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for symbol in &symbols {
                    match client.get_book(symbol) {
                        Ok(book) => println!("{}\n", book.truncated(depth)),
                        Err(_) => println!("{}: waiting for sync\n", symbol),
                    }
                }
            }
        }
    }

    pump.abort();
    for symbol in &symbols {
        client.unsubscribe(symbol);
    }
    println!("\n=== Stopped ===");
    Ok(())
}
