//! Demo 1: Checksum Integrity Monitor
//!
//! Subscribes to `spot/depth` and counts verified pushes against rejected ones.
//! Logs in first when `OKEX_API_KEY`, `OKEX_SECRET_KEY` and `OKEX_PASSPHRASE`
//! are set.
//!
//! Run: cargo run --bin checksum_monitor -- BTC-USDT ETH-USDT

use colored::*;
use okex_auth::Credentials;
use okex_book::compute_checksum;
use okex_types::{Response, SubscriptionTopic};
use okex_ws::{AgentConfig, AgentError, HandlerResult, OkexAgent, ResponseHandler};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Tally {
    snapshots: AtomicU64,
    updates: AtomicU64,
    rejected: AtomicU64,
}

impl ResponseHandler for Tally {
    fn on_response(&self, response: &Response) -> HandlerResult {
        if let Some(depth) = response.as_depth() {
            let counter = if depth.action == "partial" {
                &self.snapshots
            } else {
                &self.updates
            };
            counter.fetch_add(depth.data.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn on_error(&self, error: &AgentError) {
        if matches!(error, AgentError::Book(_)) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        println!("  {} {}", "REJECTED".red().bold(), error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut instruments: Vec<String> = std::env::args().skip(1).collect();
    if instruments.is_empty() {
        instruments.push("BTC-USDT".to_string());
    }

    println!("{}", "═".repeat(65).cyan());
    println!("{}", "  CHECKSUM INTEGRITY MONITOR".cyan().bold());
    println!("{}", "═".repeat(65).cyan());
    println!();

    let tally = Arc::new(Tally::default());
    let agent = OkexAgent::new(AgentConfig::from_env()?.with_signal_handling(true));
    agent.start(tally.clone()).await?;
    println!("{} Connected to {}", "✓".green(), agent.config().url);

    match Credentials::from_env() {
        Ok(credentials) => {
            agent.login(&credentials).await?;
            println!("{} Login sent for {:?}", "✓".green(), credentials);
        }
        Err(e) => println!("{} Skipping login: {}", "-".dimmed(), e),
    }

    let topics = instruments
        .iter()
        .map(|id| SubscriptionTopic::new("spot/depth", Some(id)))
        .collect::<Result<Vec<_>, _>>()?;
    agent.subscribe_topics(&topics).await?;
    println!("{} Monitoring {}\n", "✓".green(), instruments.join(", "));

    println!(
        "  {:>12}  {:>12}  {:>10}  {:>8}",
        "INSTRUMENT".white().bold(),
        "CHECKSUM".white().bold(),
        "STATE".white().bold(),
        "LEVELS".white().bold()
    );
    println!("  {}", "─".repeat(50));

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let reason = loop {
        tokio::select! {
            reason = agent.wait_closed() => break reason,
            _ = ticker.tick() => {
                for id in &instruments {
                    let Some(book) = agent.depth_snapshot("spot/depth", id).await? else {
                        continue;
                    };
                    let status = if compute_checksum(&book.bids, &book.asks) == book.checksum {
                        "VERIFIED".green()
                    } else {
                        "DRIFTED".red()
                    };
                    println!(
                        "  {:>12}  {:>12}  {:>10}  {:>8}",
                        id,
                        format!("{:08X}", book.checksum as u32),
                        status,
                        book.bids.len() + book.asks.len()
                    );
                }
            }
        }
    };

    println!();
    println!("{}", "═".repeat(65).cyan());
    println!("  {}", "INTEGRITY REPORT".white().bold());
    println!("{}", "═".repeat(65).cyan());
    println!("  Session closed:   {:?}", reason);
    println!("  Snapshots:        {}", tally.snapshots.load(Ordering::Relaxed));
    println!("  Updates:          {}", tally.updates.load(Ordering::Relaxed));
    println!("  Rejected:         {}", tally.rejected.load(Ordering::Relaxed));

    Ok(())
}
