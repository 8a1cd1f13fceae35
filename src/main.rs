mod config;
mod consent;
mod models;
mod pipeline;
mod scraper;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::pipeline::{Pipeline, PipelineRun};
use crate::scraper::cleaner::normalise_symbol;

#[derive(Parser)]
#[command(name = "yf-earnings", about = "Yahoo Finance earnings history scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the historical earnings table for a ticker
    Fetch {
        /// Ticker symbol, e.g. AAPL
        ticker: String,

        /// Row offset into the ticker's earnings history
        #[arg(short, long, default_value_t = 0)]
        offset: u32,

        /// Number of rows to request (1–100, rounded up to a page-size tier)
        #[arg(short, long, default_value_t = 100)]
        limit: u32,

        /// Emit the table as JSON instead of the text view
        #[arg(long)]
        json: bool,
    },

    /// Check whether a URL points at the consent interstitial
    CheckUrl { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "yf_earnings_engine=info,warn",
        1 => "yf_earnings_engine=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Fetch {
            ticker,
            offset,
            limit,
            json,
        } => {
            let _t = utils::Timer::start(format!("Earnings fetch: {}", ticker));
            let run = Pipeline::new(config).run(&ticker, offset, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&run.table)?);
            } else {
                print_table(&ticker, &run);
            }
        }

        Command::CheckUrl { url } => {
            if consent::is_consent_url(&url) {
                println!("{} → consent interstitial", url);
            } else {
                println!("{} → not a consent URL", url);
            }
        }
    }

    Ok(())
}

fn print_table(ticker: &str, run: &PipelineRun) {
    println!("────────────────────────────────────────────────────────");
    println!("  {} — Earnings History", normalise_symbol(ticker));
    println!("────────────────────────────────────────────────────────");
    println!(
        "  {:<12} {:>13} {:>13} {:>12}",
        "Date", "EPS Estimate", "Reported EPS", "Surprise(%)"
    );
    for row in run.table.iter() {
        println!(
            "  {:<12} {:>13} {:>13} {:>12}",
            row.date.to_string(),
            row.eps_estimate,
            row.reported_eps,
            row.surprise_pct
        );
    }
    println!("────────────────────────────────────────────────────────");
    println!(
        "  {} rows | {} consent round(s)",
        run.table.len(),
        run.consent_rounds
    );
}
