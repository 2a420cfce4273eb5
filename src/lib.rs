//! # Credit Risk Analyzer
//!
//! Borrower risk scoring with explanations grounded in a corpus of
//! regulations, lending policies, and past case notes.
//!
//! A fixed weighted-sum heuristic scores the borrower; a semantic retriever
//! finds the passages most relevant to the assessment; an explainer turns
//! both into a short narrative with citations.
//!
//! ## Architecture
//!
//! ```text
//!  ingestion (offline)
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐
//! │  Corpus  │──▶│ Embedder │──▶│ Vector index  │
//! │  *.txt   │   │ + L2 norm│   │ + docstore    │
//! └──────────┘   └──────────┘   └───────┬───────┘
//!                                       │
//!  query time                           ▼
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐
//! │   CLI    │──▶│ Assessor │──▶│   Retriever   │
//! │  / HTTP  │   │ score +  │   └───────────────┘
//! └──────────┘   │ explain  │
//!                └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cra ingest                                  # build artifacts/
//! cra search "income verification" --top-k 3
//! cra assess --income 50000 --emi 15000 --utilization 0.75 \
//!     --late-payments 3 --loan-amount 500000
//! cra serve                                   # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Retrieval error taxonomy |
//! | [`models`] | Core data types |
//! | [`corpus`] | Corpus loader |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index trait, flat and remote backends |
//! | [`docstore`] | Position-aligned document store |
//! | [`artifact`] | Atomic artifact writes |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retriever`] | Query-time retrieval and the shared handle |
//! | [`risk`] | Heuristic risk scoring |
//! | [`explain`] | LLM and templated explanations |
//! | [`assess`] | End-to-end assessment |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing setup |

mod http;

pub mod artifact;
pub mod assess;
pub mod config;
pub mod corpus;
pub mod docstore;
pub mod embedding;
pub mod error;
pub mod explain;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod retriever;
pub mod risk;
pub mod server;
