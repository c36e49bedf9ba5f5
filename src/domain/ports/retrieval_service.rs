//! `RetrievalService` — out-of-scope external collaborator (spec §1).
//!
//! Document chunking, embedding generation, and semantic retrieval are
//! treated as a black box. This crate defines only the seam; no concrete
//! implementation ships here.

use async_trait::async_trait;

/// A single retrieved hit.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub source_id: String,
    pub snippet: String,
    pub score: f64,
}

#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalHit>;
    async fn ingest(&self, source_id: &str, content: &str);
}

/// A no-op implementation for hosts that don't wire in retrieval.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRetrievalService;

#[async_trait]
impl RetrievalService for NullRetrievalService {
    async fn search(&self, _query: &str, _top_k: usize) -> Vec<RetrievalHit> {
        Vec::new()
    }

    async fn ingest(&self, _source_id: &str, _content: &str) {}
}
