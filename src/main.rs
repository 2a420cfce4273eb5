//! # Credit Risk Analyzer CLI (`cra`)
//!
//! ## Usage
//!
//! ```bash
//! cra --config ./config/cra.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cra ingest` | Rebuild the vector index and docstore from the corpus |
//! | `cra search "<query>"` | Show the passages most similar to a query |
//! | `cra assess ...` | Score a borrower and explain the result |
//! | `cra serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Build artifacts from data/{regulations,policies,cases}
//! cra ingest --config ./config/cra.toml
//!
//! # Inspect what the retriever finds
//! cra search "income verification" --top-k 3
//!
//! # Assess a borrower, machine-readable
//! cra assess --income 50000 --emi 15000 --utilization 0.75 \
//!     --late-payments 3 --loan-amount 500000 --json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use credit_risk_analyzer::assess::{print_assessment, Assessor};
use credit_risk_analyzer::config;
use credit_risk_analyzer::explain::Explainer;
use credit_risk_analyzer::ingest::{print_report, run_ingest};
use credit_risk_analyzer::logging::init_tracing;
use credit_risk_analyzer::retriever::SharedRetriever;
use credit_risk_analyzer::risk::RiskInput;
use credit_risk_analyzer::server;

/// Credit Risk Analyzer: borrower risk scoring with retrieval-grounded
/// explanations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Relative paths inside it resolve against the working directory.
#[derive(Parser)]
#[command(
    name = "cra",
    about = "Credit Risk Analyzer: risk scoring with explanations grounded in regulations and cases",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cra.toml`.
    #[arg(long, global = true, default_value = "./config/cra.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index and docstore from the corpus.
    ///
    /// Replaces any previous artifacts. Nothing is written if the corpus
    /// is empty or embedding fails.
    Ingest,

    /// Search the corpus.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Score a borrower and explain the result.
    Assess {
        /// Monthly income.
        #[arg(long)]
        income: f64,

        /// Total monthly EMI across existing loans.
        #[arg(long)]
        emi: f64,

        /// Credit utilization ratio in [0, 1].
        #[arg(long)]
        utilization: f64,

        /// Late payments in the last 12 months.
        #[arg(long, default_value_t = 0)]
        late_payments: u32,

        /// Requested loan amount.
        #[arg(long)]
        loan_amount: f64,

        /// Print the assessment as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest => {
            let report = run_ingest(&cfg).await.context("ingestion failed")?;
            print_report(&report);
        }
        Commands::Search { query, top_k } => {
            let top_k = top_k.unwrap_or(cfg.retrieval.top_k);
            let shared = SharedRetriever::new(Arc::new(cfg));
            let retriever = shared.get().await?;
            let results = retriever.search(&query, top_k).await?;

            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!("{}. [{:.2}] {}", i + 1, r.score, r.source);
                println!("    {}", r.preview);
            }
        }
        Commands::Assess {
            income,
            emi,
            utilization,
            late_payments,
            loan_amount,
            json,
        } => {
            let cfg = Arc::new(cfg);
            let shared = Arc::new(SharedRetriever::new(cfg.clone()));
            let explainer = Explainer::from_config(&cfg.explain)?;
            let assessor = Assessor::new(cfg, shared, explainer);

            let assessment = assessor
                .assess(&RiskInput {
                    monthly_income: income,
                    total_monthly_emi: emi,
                    credit_utilization_ratio: utilization,
                    late_payments_last_12m: late_payments,
                    requested_loan_amount: loan_amount,
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&assessment)?);
            } else {
                print_assessment(&assessment);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
