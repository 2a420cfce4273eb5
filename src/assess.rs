//! End-to-end borrower assessment: score → retrieve → explain.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::explain::{ExplanationStrategy, Explainer};
use crate::models::Citation;
use crate::retriever::SharedRetriever;
use crate::risk::{score_risk, RiskInput, RiskOutput};

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub risk: RiskOutput,
    pub explanation: String,
    pub citations: Vec<Citation>,
    pub strategy: ExplanationStrategy,
}

pub struct Assessor {
    config: Arc<Config>,
    retriever: Arc<SharedRetriever>,
    explainer: Explainer,
}

impl Assessor {
    pub fn new(config: Arc<Config>, retriever: Arc<SharedRetriever>, explainer: Explainer) -> Self {
        Self {
            config,
            retriever,
            explainer,
        }
    }

    /// Score `input`, retrieve supporting passages with the configured
    /// assessment query, and explain the result.
    ///
    /// Retrieval failures (including missing artifacts) are returned as
    /// errors; explanation failures never are.
    pub async fn assess(&self, input: &RiskInput) -> Result<Assessment> {
        let risk = score_risk(input, &self.config.risk);

        let retriever = self.retriever.get().await?;
        let snippets = retriever
            .search(
                &self.config.retrieval.assessment_query,
                self.config.retrieval.top_k,
            )
            .await?;

        let explanation = self
            .explainer
            .explain(&risk, input.requested_loan_amount, &snippets)
            .await;

        info!(
            bucket = %risk.risk_bucket,
            probability = risk.probability_of_default,
            snippets = snippets.len(),
            strategy = ?explanation.strategy,
            "assessment complete"
        );

        Ok(Assessment {
            risk,
            explanation: explanation.text,
            citations: explanation.citations,
            strategy: explanation.strategy,
        })
    }
}

/// Print an [`Assessment`] the way `cra assess` shows it.
pub fn print_assessment(a: &Assessment) {
    println!("Risk bucket: {}", a.risk.risk_bucket);
    println!(
        "Default probability: {:.2}",
        a.risk.probability_of_default
    );
    let f = &a.risk.derived_features;
    println!("Derived features:");
    println!("  debt_to_income_ratio: {}", f.debt_to_income_ratio);
    println!("  credit_utilization_ratio: {}", f.credit_utilization_ratio);
    println!("  late_payments_last_12m: {}", f.late_payments_last_12m);
    println!();
    println!("Explanation:");
    println!("{}", a.explanation);
    if !a.citations.is_empty() {
        println!();
        println!("Citations:");
        for c in &a.citations {
            println!("  - {}: {}", c.source, c.preview);
        }
    }
}
