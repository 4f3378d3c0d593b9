// rust-cv/hnsw nearest-neighbour retrieval and cosine re-ranking

use crate::config::{INDEXING_BATCH_SIZE, MIN_EF_SEARCH};
use crate::error::{validate_dimension, BatchFailure, EmbeddingError, StageError};
use crate::stage::{SearchOptions, Stage};
use crate::types::{field_text, Document, DocumentKey, RankedList, ScoredRef};
use async_trait::async_trait;
use hnsw::{Hnsw, Searcher};
use space::{Metric, Neighbor};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Turns text into fixed-size embedding vectors.
///
/// Model inference lives outside this crate; implementations wrap whatever
/// model the application loads.
#[async_trait(?Send)]
pub trait TextEmbedder {
    /// Returns the embedding dimension (vector size).
    ///
    /// All embeddings from this embedder must have this length.
    fn dimension(&self) -> usize;

    /// Embeds a batch of texts, one vector per text, in input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return None;
    }
    Some(dot / (mag_a * mag_b))
}

/// Cosine distance metric for embedding vectors
/// Computes 1 - cosine_similarity, scaled to u32
struct CosineDistance;

impl Metric<Box<[f32]>> for CosineDistance {
    type Unit = u32;

    fn distance(&self, a: &Box<[f32]>, b: &Box<[f32]>) -> u32 {
        match cosine_similarity(a, b) {
            // Distance is in [0, 2], so we scale by u32::MAX/2
            Some(similarity) => ((1.0 - similarity) * (u32::MAX as f32 / 2.0)) as u32,
            None => u32::MAX,
        }
    }
}

type Index = Hnsw<CosineDistance, Box<[f32]>, rand::rngs::StdRng, 16, 32>;

/// Semantic retriever and re-ranker over text embeddings.
///
/// - **Without candidates** it returns the nearest neighbours of the query
///   from an HNSW index (M = 16, M0 = 32).
/// - **With candidates** it re-ranks them by exact cosine similarity. Keys it
///   holds no embedding for are omitted.
///
/// Query embeddings are computed once per batch chunk. Re-adding a key
/// tombstones its previous HNSW entry; tombstoned entries stay in the graph
/// but are filtered from results.
pub struct VectorRanker<E: TextEmbedder> {
    name: String,
    key_field: String,
    fields: Vec<String>,
    embedder: E,
    index: Index,
    /// Searcher for performing queries (mutated during search)
    searcher: RefCell<Searcher<u32>>,
    /// HNSW position -> key
    slots: Vec<DocumentKey>,
    /// Live HNSW position of every key
    positions: HashMap<DocumentKey, usize>,
    /// Embedding of every key, for re-ranking candidates
    embeddings: HashMap<DocumentKey, Vec<f32>>,
    /// Soft-deleted HNSW positions
    tombstones: HashSet<usize>,
}

impl<E: TextEmbedder> VectorRanker<E> {
    /// Creates an empty ranker embedding `fields` of documents keyed by `key_field`.
    pub fn new<I, S>(key_field: impl Into<String>, fields: I, embedder: E) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self {
            name: format!("vector({})", fields.join(",")),
            key_field: key_field.into(),
            fields,
            embedder,
            index: Hnsw::new(CosineDistance),
            searcher: RefCell::new(Searcher::default()),
            slots: Vec::new(),
            positions: HashMap::new(),
            embeddings: HashMap::new(),
            tombstones: HashSet::new(),
        }
    }

    /// Overrides the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The embedder used for documents and queries.
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Number of live (non-tombstoned) documents.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of tombstoned HNSW entries.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    async fn embed_checked(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, BatchFailure> {
        let vectors = self
            .embedder
            .embed(texts)
            .await
            .map_err(|error| BatchFailure::new(0, error.into()))?;
        if vectors.len() != texts.len() {
            return Err(BatchFailure::new(
                vectors.len().min(texts.len().saturating_sub(1)),
                EmbeddingError::InferenceFailed(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                ))
                .into(),
            ));
        }
        let dimension = self.embedder.dimension();
        for (index, vector) in vectors.iter().enumerate() {
            validate_dimension(dimension, vector.len())
                .map_err(|error| BatchFailure::new(index, error))?;
        }
        Ok(vectors)
    }

    /// Nearest live neighbours of `query`, best first.
    fn nearest(&self, query: &[f32], k: usize) -> Result<RankedList, StageError> {
        if self.positions.is_empty() || k == 0 {
            return Ok(RankedList::new());
        }

        // Ask for extra neighbours so tombstones don't eat into k
        let wanted = k
            .saturating_add(self.tombstones.len())
            .min(self.slots.len());
        let mut neighbors = vec![
            Neighbor {
                index: !0,
                distance: !0
            };
            wanted
        ];
        let ef_search = std::cmp::max(wanted * 2, MIN_EF_SEARCH);
        let query_box = query.to_vec().into_boxed_slice();

        let mut searcher = self
            .searcher
            .try_borrow_mut()
            .map_err(|e| StageError::Unavailable(format!("searcher busy: {}", e)))?;
        self.index
            .nearest(&query_box, ef_search, &mut searcher, &mut neighbors);

        Ok(neighbors
            .into_iter()
            .filter(|n| n.index != !0)
            .filter(|n| !self.tombstones.contains(&n.index))
            .take(k)
            .map(|neighbor| {
                let distance = (neighbor.distance as f32) / (u32::MAX as f32 / 2.0);
                let similarity = (1.0 - distance).clamp(0.0, 1.0);
                ScoredRef::scored(self.slots[neighbor.index].clone(), similarity)
            })
            .collect())
    }

    /// Candidates re-ranked by cosine similarity to `query`.
    fn rerank(&self, query: &[f32], candidates: &RankedList) -> RankedList {
        let mut scored: Vec<(DocumentKey, f32)> = candidates
            .keys()
            .filter_map(|key| {
                let embedding = self.embeddings.get(key)?;
                let similarity = cosine_similarity(query, embedding).unwrap_or(0.0);
                Some((key.clone(), similarity))
            })
            .collect();

        // Stable sort keeps candidate order on ties
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored
            .into_iter()
            .map(|(key, score)| ScoredRef::scored(key, score))
            .collect()
    }
}

#[async_trait(?Send)]
impl<E: TextEmbedder> Stage for VectorRanker<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        candidates: Option<&RankedList>,
        options: &SearchOptions,
    ) -> Result<RankedList, StageError> {
        let queries = [query.to_string()];
        let candidates = candidates.map(std::slice::from_ref);
        let mut lists = self
            .search_batch(&queries, candidates, options)
            .await
            .map_err(|failure| failure.error)?;
        Ok(lists.pop().unwrap_or_default())
    }

    #[instrument(skip_all, fields(stage = %self.name, queries = queries.len()))]
    async fn search_batch(
        &self,
        queries: &[String],
        candidates: Option<&[RankedList]>,
        options: &SearchOptions,
    ) -> Result<Vec<RankedList>, BatchFailure> {
        let texts: Vec<&str> = queries.iter().map(String::as_str).collect();
        let vectors = self.embed_checked(&texts).await?;

        let mut results = Vec::with_capacity(queries.len());
        for (index, vector) in vectors.iter().enumerate() {
            let list = match candidates.and_then(|lists| lists.get(index)) {
                Some(candidate_list) => self.rerank(vector, candidate_list),
                None => self
                    .nearest(vector, options.k.unwrap_or(self.positions.len()))
                    .map_err(|error| BatchFailure::new(index, error))?,
            };
            results.push(list);
        }

        debug!(
            results = results.iter().map(RankedList::len).sum::<usize>(),
            "Vector search complete"
        );
        Ok(results)
    }

    #[instrument(skip_all, fields(stage = %self.name, documents = documents.len()))]
    async fn add(&mut self, documents: &[Document]) -> Result<(), StageError> {
        let dimension = self.embedder.dimension();

        for chunk in documents.chunks(INDEXING_BATCH_SIZE) {
            let keys = chunk
                .iter()
                .map(|document| DocumentKey::from_document(document, &self.key_field))
                .collect::<Result<Vec<_>, _>>()?;
            let texts: Vec<String> = chunk
                .iter()
                .map(|document| field_text(document, &self.fields))
                .collect();
            let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

            let vectors = self.embedder.embed(&text_refs).await?;
            if vectors.len() != keys.len() {
                return Err(EmbeddingError::InferenceFailed(format!(
                    "expected {} embeddings, got {}",
                    keys.len(),
                    vectors.len()
                ))
                .into());
            }

            for (key, vector) in keys.into_iter().zip(vectors) {
                validate_dimension(dimension, vector.len())?;

                if let Some(old) = self.positions.get(&key) {
                    self.tombstones.insert(*old);
                }
                let position = self
                    .index
                    .insert(vector.clone().into_boxed_slice(), self.searcher.get_mut());
                if position >= self.slots.len() {
                    self.slots.resize(position + 1, key.clone());
                }
                self.slots[position] = key.clone();
                self.positions.insert(key.clone(), position);
                self.embeddings.insert(key, vector);
            }
        }

        debug!(
            indexed = self.positions.len(),
            tombstones = self.tombstones.len(),
            "Vector index updated"
        );
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), StageError> {
        self.index = Hnsw::new(CosineDistance);
        self.searcher = RefCell::new(Searcher::default());
        self.slots.clear();
        self.positions.clear();
        self.embeddings.clear();
        self.tombstones.clear();
        Ok(())
    }
}
