//! TOML configuration.
//!
//! Every section is optional; an empty file yields a working local setup
//! that reads `data/{regulations,policies,cases}` and writes artifacts to
//! `artifacts/`. Relative paths in a loaded file resolve against the
//! working directory, matching how `cra` is run from the project root.
//!
//! [`load_config`] also applies the environment overrides
//! `EMBEDDING_MODEL_NAME` (embedding model) and `OPENAI_MODEL` (explanation
//! model). [`parse_config`] never reads the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub explain: ExplainConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Corpus roots, visited in this order.
    #[serde(default = "default_corpus_dirs")]
    pub dirs: Vec<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dirs: default_corpus_dirs(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_corpus_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/regulations"),
        PathBuf::from("data/policies"),
        PathBuf::from("data/cases"),
    ]
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    #[serde(default)]
    pub docstore_path: Option<PathBuf>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            index_path: None,
            docstore_path: None,
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

impl ArtifactsConfig {
    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.dir.join("vector_index.bin"))
    }

    pub fn docstore_path(&self) -> PathBuf {
        self.docstore_path
            .clone()
            .unwrap_or_else(|| self.dir.join("docstore.json"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of `local`, `openai`, `ollama`, `hash`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `local` (flat file under `artifacts`) or `remote` (managed service).
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Index host for the remote backend, e.g. `https://loans-abc123.svc.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_upsert_batch")]
    pub upsert_batch: usize,
    #[serde(default = "default_index_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: None,
            namespace: None,
            upsert_batch: default_upsert_batch(),
            max_retries: default_index_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> String {
    "local".to_string()
}
fn default_upsert_batch() -> usize {
    100
}
fn default_index_retries() -> u32 {
    3
}

impl IndexConfig {
    pub fn is_remote(&self) -> bool {
        self.backend == "remote"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Query issued against the corpus for every assessment.
    #[serde(default = "default_assessment_query")]
    pub assessment_query: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            assessment_query: default_assessment_query(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_assessment_query() -> String {
    "credit risk assessment for borrowers with high utilization and late payments".to_string()
}

/// Weights and bucket thresholds for the heuristic risk score.
///
/// Defaults are hand-tuned, not calibrated.
#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    #[serde(default = "default_weight_dti")]
    pub weight_dti: f64,
    #[serde(default = "default_weight_utilization")]
    pub weight_utilization: f64,
    #[serde(default = "default_weight_late_payments")]
    pub weight_late_payments: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weight_dti: default_weight_dti(),
            weight_utilization: default_weight_utilization(),
            weight_late_payments: default_weight_late_payments(),
            medium_threshold: default_medium_threshold(),
            high_threshold: default_high_threshold(),
        }
    }
}

fn default_weight_dti() -> f64 {
    0.45
}
fn default_weight_utilization() -> f64 {
    0.35
}
fn default_weight_late_payments() -> f64 {
    0.20
}
fn default_medium_threshold() -> f64 {
    0.4
}
fn default_high_threshold() -> f64 {
    0.65
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExplainConfig {
    /// `openai` or `disabled`. With `openai` and no `OPENAI_API_KEY`, the
    /// templated explanation is used.
    #[serde(default = "default_explain_provider")]
    pub provider: String,
    #[serde(default = "default_explain_model")]
    pub model: String,
    #[serde(default = "default_explain_url")]
    pub url: String,
    #[serde(default = "default_explain_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            provider: default_explain_provider(),
            model: default_explain_model(),
            url: default_explain_url(),
            timeout_secs: default_explain_timeout_secs(),
        }
    }
}

fn default_explain_provider() -> String {
    "openai".to_string()
}
fn default_explain_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_explain_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_explain_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8710".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    build_config(&content, Path::new("."), |name| std::env::var(name).ok())
}

/// Parse, resolve relative paths against `base`, and validate. Unlike
/// [`load_config`], no environment overrides are applied.
pub fn parse_config(content: &str, base: &Path) -> Result<Config> {
    build_config(content, base, |_| None)
}

fn build_config(
    content: &str,
    base: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    let override_for = |name: &str| env(name).filter(|v| !v.trim().is_empty());
    if let Some(model) = override_for("EMBEDDING_MODEL_NAME") {
        config.embedding.model = Some(model);
    }
    if let Some(model) = override_for("OPENAI_MODEL") {
        config.explain.model = model;
    }

    config.resolve_paths(base);
    validate(&config)?;
    Ok(config)
}

impl Config {
    fn resolve_paths(&mut self, base: &Path) {
        for dir in &mut self.corpus.dirs {
            *dir = resolve(base, dir);
        }
        self.artifacts.dir = resolve(base, &self.artifacts.dir);
        if let Some(p) = self.artifacts.index_path.take() {
            self.artifacts.index_path = Some(resolve(base, &p));
        }
        if let Some(p) = self.artifacts.docstore_path.take() {
            self.artifacts.docstore_path = Some(resolve(base, &p));
        }
    }
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.corpus.dirs.is_empty() {
        anyhow::bail!("corpus.dirs must list at least one directory");
    }

    match config.embedding.provider.as_str() {
        "local" | "openai" | "ollama" | "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() {
            anyhow::bail!(
                "embedding.dims must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.index.backend.as_str() {
        "local" => {}
        "remote" => {
            if config.index.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
                anyhow::bail!("index.host must be set when index.backend is 'remote'");
            }
        }
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be local or remote.",
            other
        ),
    }
    if config.index.upsert_batch == 0 {
        anyhow::bail!("index.upsert_batch must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    let risk = &config.risk;
    for (name, w) in [
        ("risk.weight_dti", risk.weight_dti),
        ("risk.weight_utilization", risk.weight_utilization),
        ("risk.weight_late_payments", risk.weight_late_payments),
    ] {
        if !w.is_finite() || w < 0.0 {
            anyhow::bail!("{} must be a non-negative number", name);
        }
    }
    if !(risk.medium_threshold > 0.0
        && risk.medium_threshold < risk.high_threshold
        && risk.high_threshold <= 1.0)
    {
        anyhow::bail!("risk thresholds must satisfy 0 < medium_threshold < high_threshold <= 1");
    }

    match config.explain.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown explain provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
