use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use credit_risk_analyzer::config::{parse_config, Config};
use credit_risk_analyzer::docstore::DocStore;
use credit_risk_analyzer::embedding::{create_embedder, normalize_l2, Embedder};
use credit_risk_analyzer::error::{Result, RetrievalError};
use credit_risk_analyzer::index::{FlatIndex, VectorIndex};
use credit_risk_analyzer::ingest::run_ingest;
use credit_risk_analyzer::models::Document;
use credit_risk_analyzer::retriever::{Retriever, SharedRetriever};

/// Embedder with hand-picked vectors, so scores are known in advance.
struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| RetrievalError::Embedding(format!("no vector for '{}'", t)))
            })
            .collect()
    }
}

fn doc(source: &str, text: &str) -> Document {
    Document {
        id: source.to_string(),
        source: source.to_string(),
        text: text.to_string(),
    }
}

fn config_for(root: &Path) -> Config {
    parse_config(
        r#"
[embedding]
provider = "hash"
dims = 512
"#,
        root,
    )
    .unwrap()
}

async fn three_doc_retriever() -> Retriever {
    let docs = vec![
        doc("regulations/kyc.txt", "kyc"),
        doc("policies/dti.txt", "dti"),
        doc("cases/late.txt", "late"),
    ];
    let mut vectors = HashMap::new();
    vectors.insert("kyc".to_string(), vec![1.0, 0.0, 0.0]);
    vectors.insert("dti".to_string(), vec![0.0, 3.0, 0.0]);
    vectors.insert("late".to_string(), vec![2.0, 2.0, 0.0]);
    vectors.insert("query".to_string(), vec![4.0, 1.0, 0.0]);
    let embedder = FixedEmbedder { vectors };

    let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
    let normalized: Vec<Vec<f32>> = embedder
        .embed(&texts)
        .await
        .unwrap()
        .into_iter()
        .map(normalize_l2)
        .collect();
    let index = FlatIndex::build(&normalized, &docs).unwrap();

    Retriever::from_parts(Box::new(index), docs, Box::new(embedder)).unwrap()
}

#[tokio::test]
async fn test_ranking_top_k_two() {
    let retriever = three_doc_retriever().await;

    let results = retriever.search("query", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].source, "regulations/kyc.txt");
    assert_eq!(results[1].source, "cases/late.txt");
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn test_ranking_top_k_exceeds_corpus() {
    let retriever = three_doc_retriever().await;

    let results = retriever.search("query", 10).await.unwrap();
    assert_eq!(results.len(), 3);
    let sources: Vec<&str> = results.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(
        sources,
        vec!["regulations/kyc.txt", "cases/late.txt", "policies/dti.txt"]
    );
    assert!(results.windows(2).all(|w| w[0].score > w[1].score));
}

#[tokio::test]
async fn test_single_document_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let regulations = tmp.path().join("data/regulations");
    fs::create_dir_all(&regulations).unwrap();
    let text = "Lenders must verify income before disbursing loans.";
    fs::write(regulations.join("a.txt"), format!("\n  {}\n\n", text)).unwrap();
    let config = config_for(tmp.path());

    run_ingest(&config).await.unwrap();
    let retriever = Retriever::open(&config).await.unwrap();

    let results = retriever.search("income verification", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, "regulations/a.txt");
    assert_eq!(results[0].preview, text);
    assert_eq!(results[0].text, text);
}

#[tokio::test]
async fn test_open_before_ingest_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());

    let err = Retriever::open(&config).await.err().unwrap();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("Run ingestion first"));
}

#[tokio::test]
async fn test_stored_and_query_vectors_are_unit_length() {
    let tmp = TempDir::new().unwrap();
    let cases = tmp.path().join("data/cases");
    fs::create_dir_all(&cases).unwrap();
    fs::write(cases.join("one.txt"), "Utilization above ninety percent.").unwrap();
    fs::write(cases.join("two.txt"), "Three late payments in 2023, two in 2024.").unwrap();
    let config = config_for(tmp.path());

    run_ingest(&config).await.unwrap();
    let index = FlatIndex::load(&config.artifacts.index_path()).unwrap();
    for i in 0..index.len() {
        let norm: f32 = index.vector(i).unwrap().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6, "vector {} has norm {}", i, norm);
    }

    let embedder = create_embedder(&config.embedding).await.unwrap();
    let q = normalize_l2(embedder.embed_query("late payments").await.unwrap());
    let norm: f32 = q.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_truncated_docstore_detected_as_corruption() {
    let tmp = TempDir::new().unwrap();
    let policies = tmp.path().join("data/policies");
    fs::create_dir_all(&policies).unwrap();
    fs::write(policies.join("a.txt"), "Cap EMI at half of net income.").unwrap();
    fs::write(policies.join("b.txt"), "Require two guarantors above 10 lakh.").unwrap();
    let config = config_for(tmp.path());
    run_ingest(&config).await.unwrap();

    let path = config.artifacts.docstore_path();
    let mut docs = DocStore::load(&path).unwrap();
    docs.pop();
    DocStore::save(&path, &docs).unwrap();

    let err = Retriever::open(&config).await.err().unwrap();
    assert!(matches!(err, RetrievalError::Corruption(_)));
}

#[tokio::test]
async fn test_reordered_docstore_detected_as_corruption() {
    let tmp = TempDir::new().unwrap();
    let regulations = tmp.path().join("data/regulations");
    fs::create_dir_all(&regulations).unwrap();
    fs::write(regulations.join("a.txt"), "income verification rules").unwrap();
    fs::write(regulations.join("b.txt"), "collateral guarantor policy").unwrap();
    let config = config_for(tmp.path());
    run_ingest(&config).await.unwrap();

    // Same length, different order: what a half-finished commit can leave.
    let path = config.artifacts.docstore_path();
    let mut docs = DocStore::load(&path).unwrap();
    docs.reverse();
    DocStore::save(&path, &docs).unwrap();

    let err = Retriever::open(&config).await.err().unwrap();
    assert!(matches!(err, RetrievalError::Corruption(_)));
    assert!(err.to_string().contains("cra ingest"));
}

#[tokio::test]
async fn test_model_change_detected_as_corruption() {
    let tmp = TempDir::new().unwrap();
    let regulations = tmp.path().join("data/regulations");
    fs::create_dir_all(&regulations).unwrap();
    fs::write(regulations.join("a.txt"), "Verify income.").unwrap();
    run_ingest(&config_for(tmp.path())).await.unwrap();

    let changed = parse_config("[embedding]\nprovider = \"hash\"\ndims = 128\n", tmp.path()).unwrap();
    let err = Retriever::open(&changed).await.err().unwrap();
    assert!(matches!(err, RetrievalError::Corruption(_)));
}

#[test]
fn test_docstore_roundtrip_unicode() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested/docstore.json");
    let docs = vec![
        doc("regulations/ऋण.txt", "ऋण की किस्त आय के 50% से अधिक नहीं होनी चाहिए।"),
        doc("cases/zero-width.txt", "a\u{200b}b\r\ntrailing\ttab"),
    ];
    DocStore::save(&path, &docs).unwrap();
    assert_eq!(DocStore::load(&path).unwrap(), docs);
}

#[tokio::test]
async fn test_shared_retriever_builds_once_under_concurrency() {
    let tmp = TempDir::new().unwrap();
    let regulations = tmp.path().join("data/regulations");
    fs::create_dir_all(&regulations).unwrap();
    fs::write(regulations.join("a.txt"), "Verify income.").unwrap();
    let config = config_for(tmp.path());
    run_ingest(&config).await.unwrap();

    let shared = Arc::new(SharedRetriever::new(Arc::new(config)));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let shared = shared.clone();
            tokio::spawn(async move { shared.get().await.unwrap() })
        })
        .collect();

    let mut instances = Vec::new();
    for h in handles {
        instances.push(h.await.unwrap());
    }
    assert!(instances.iter().all(|r| Arc::ptr_eq(r, &instances[0])));
}

#[tokio::test]
async fn test_shared_retriever_retries_after_ingest() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());
    let shared = SharedRetriever::new(Arc::new(config.clone()));

    assert!(shared.get().await.err().unwrap().is_not_found());

    let regulations = tmp.path().join("data/regulations");
    fs::create_dir_all(&regulations).unwrap();
    fs::write(regulations.join("a.txt"), "Verify income.").unwrap();
    run_ingest(&config).await.unwrap();

    let retriever = shared.get().await.unwrap();
    assert_eq!(retriever.len(), 1);
}
