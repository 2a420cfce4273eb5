//! Natural-language explanations for risk assessments.
//!
//! [`Explainer::explain`] is a two-stage strategy:
//!
//! 1. **LLM**: if a [`CompletionClient`] is configured, ask it for an
//!    explanation under a bounded timeout.
//! 2. **Template**: on a missing client, an error, an empty reply, or a
//!    timeout, fall through to [`templated_explanation`], which is
//!    deterministic and never fails.
//!
//! Both paths return the same citations (at most [`MAX_CITATIONS`]) and
//! report which strategy produced the text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ExplainConfig;
use crate::http;
use crate::models::{Citation, RetrievalResult};
use crate::risk::{RiskBucket, RiskOutput};

pub const MAX_CITATIONS: usize = 5;
/// Snippets quoted inline by the template.
const TEMPLATE_SNIPPETS: usize = 3;

const SYSTEM_PROMPT: &str = "You are a precise, regulation-aware credit analyst.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationStrategy {
    Llm,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub text: String,
    pub citations: Vec<Citation>,
    pub strategy: ExplanationStrategy,
}

/// A chat-completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String>;
}

/// OpenAI chat completions (`POST {url}/chat/completions`).
pub struct OpenAIChat {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAIChat {
    /// Returns `None` when `OPENAI_API_KEY` is unset or blank.
    pub fn from_env(config: &ExplainConfig) -> anyhow::Result<Option<Self>> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(k) if !k.trim().is_empty() => k,
            _ => return Ok(None),
        };
        let client = http::client(config.timeout_secs).map_err(anyhow::Error::msg)?;
        Ok(Some(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        }))
    }
}

#[async_trait]
impl CompletionClient for OpenAIChat {
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.2,
        });
        let auth = format!("Bearer {}", self.api_key);
        let json = http::post_json(
            &self.client,
            &format!("{}/chat/completions", self.url),
            &[("Authorization", auth.as_str())],
            &body,
            0,
        )
        .await
        .map_err(anyhow::Error::msg)?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|c| c.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("chat completion response has no message content"))
    }
}

pub struct Explainer {
    client: Option<Box<dyn CompletionClient>>,
    timeout: Duration,
}

impl Explainer {
    pub fn new(client: Option<Box<dyn CompletionClient>>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Template-only explainer.
    pub fn template_only() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn from_config(config: &ExplainConfig) -> anyhow::Result<Self> {
        let client: Option<Box<dyn CompletionClient>> = match config.provider.as_str() {
            "openai" => OpenAIChat::from_env(config)?
                .map(|c| Box::new(c) as Box<dyn CompletionClient>),
            _ => None,
        };
        if client.is_none() {
            debug!(provider = %config.provider, "no completion client, using templated explanations");
        }
        Ok(Self::new(client, Duration::from_secs(config.timeout_secs)))
    }

    pub fn has_llm(&self) -> bool {
        self.client.is_some()
    }

    pub async fn explain(
        &self,
        risk: &RiskOutput,
        requested_loan_amount: f64,
        snippets: &[RetrievalResult],
    ) -> Explanation {
        if let Some(client) = &self.client {
            match self
                .llm_explanation(client.as_ref(), risk, requested_loan_amount, snippets)
                .await
            {
                Ok(explanation) => return explanation,
                Err(e) => warn!(error = %e, "LLM explanation failed, using template"),
            }
        }
        templated_explanation(risk, snippets)
    }

    async fn llm_explanation(
        &self,
        client: &dyn CompletionClient,
        risk: &RiskOutput,
        requested_loan_amount: f64,
        snippets: &[RetrievalResult],
    ) -> anyhow::Result<Explanation> {
        let prompt = build_prompt(risk, requested_loan_amount, snippets);
        let text = tokio::time::timeout(self.timeout, client.complete(SYSTEM_PROMPT, &prompt))
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {:?}", self.timeout))??;
        if text.trim().is_empty() {
            anyhow::bail!("empty completion");
        }
        Ok(Explanation {
            text,
            citations: citations(snippets),
            strategy: ExplanationStrategy::Llm,
        })
    }
}

fn citations(snippets: &[RetrievalResult]) -> Vec<Citation> {
    snippets.iter().take(MAX_CITATIONS).map(Citation::from).collect()
}

fn build_prompt(risk: &RiskOutput, requested_loan_amount: f64, snippets: &[RetrievalResult]) -> String {
    let snippets_str = snippets
        .iter()
        .take(MAX_CITATIONS)
        .map(|r| format!("Source: {}\nExcerpt: {}", r.source, r.preview))
        .collect::<Vec<_>>()
        .join("\n\n");
    let features = serde_json::to_string(&risk.derived_features).unwrap_or_default();

    format!(
        "You are a credit risk analyst. Explain the decision clearly and concisely, citing \
         relevant guidelines from the provided snippets when appropriate. Make concrete, \
         actionable recommendations.\n\n\
         Risk bucket: {}\n\
         Default probability: {:.2}\n\
         Requested loan amount: {}\n\
         Features: {}\n\n\
         Snippets:\n{}\n\n\
         Write 6-10 sentences.",
        risk.risk_bucket, risk.probability_of_default, requested_loan_amount, features, snippets_str
    )
}

/// Deterministic explanation built from the score, features, and up to
/// three retrieved snippets.
pub fn templated_explanation(risk: &RiskOutput, snippets: &[RetrievalResult]) -> Explanation {
    let features = &risk.derived_features;
    let mut lines = vec![
        format!(
            "Applicant is {} risk (default probability {:.2}).",
            risk.risk_bucket, risk.probability_of_default
        ),
        format!(
            "Debt-to-income ratio: {:.1}%.",
            features.debt_to_income_ratio * 100.0
        ),
        format!(
            "Credit utilization: {:.1}%.",
            features.credit_utilization_ratio * 100.0
        ),
        format!("Late payments (12m): {}.", features.late_payments_last_12m),
    ];

    if !snippets.is_empty() {
        lines.push("Relevant guidelines and similar cases considered:".to_string());
        for r in snippets.iter().take(TEMPLATE_SNIPPETS) {
            lines.push(format!("- {}: {}…", r.source, r.preview));
        }
    }

    lines.push(
        match risk.risk_bucket {
            RiskBucket::High => {
                "Recommendation: request collateral, reduce loan amount, or add guarantor."
            }
            RiskBucket::Medium => {
                "Recommendation: consider reduced amount or stricter verification checks."
            }
            RiskBucket::Low => {
                "Recommendation: proceed subject to standard KYC and income verification."
            }
        }
        .to_string(),
    );

    Explanation {
        text: lines.join("\n"),
        citations: citations(snippets),
        strategy: ExplanationStrategy::Template,
    }
}
