//! Demo 2: Real-time Spread Monitor
//!
//! Polls the verified book for best bid, best ask and spread.
//!
//! Run: cargo run --bin spread_monitor -- ETH-USDT

use colored::*;
use okex_ws::{handler_fn, AgentConfig, OkexAgent};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let instrument = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "BTC-USDT".to_string());

    println!("{}", "═".repeat(60).cyan());
    println!("{}", "  REAL-TIME SPREAD MONITOR".cyan().bold());
    println!("{}", "═".repeat(60).cyan());
    println!();

    let agent = OkexAgent::new(AgentConfig::from_env()?);
    agent.start(handler_fn(|_| Ok(()))).await?;
    agent.subscribe("spot/depth", Some(&instrument)).await?;

    println!("{} Connected to {}", "✓".green(), agent.config().url);
    println!("{} Streaming {} depth...\n", "✓".green(), instrument);

    let mut samples = 0u64;
    let start = Instant::now();

    while agent.is_connected() && start.elapsed() < Duration::from_secs(60) {
        tokio::time::sleep(Duration::from_millis(250)).await;

        let Some(book) = agent.depth_snapshot("spot/depth", &instrument).await? else {
            continue;
        };
        if let (Some(bid), Some(ask), Some(spread)) =
            (book.best_bid_price(), book.best_ask_price(), book.spread())
        {
            samples += 1;
            print!("\r\x1B[K");
            print!(
                "  {} {}  {} {}  {} {}  │ {} {}",
                "BID:".yellow(),
                bid,
                "ASK:".yellow(),
                ask,
                "SPREAD:".green(),
                spread,
                "MID:".dimmed(),
                book.mid_price().unwrap_or_default()
            );
            std::io::stdout().flush()?;
        }
    }

    agent.stop();
    let reason = agent.wait_closed().await;
    println!(
        "\n\n{} Demo complete. {} samples, closed with {:?}.",
        "✓".green(),
        samples,
        reason
    );
    Ok(())
}
