//! Composition tree combining independent stages into one result stream.
//!
//! A tree is built once from leaves ([`Node::leaf`]) and four combinators:
//!
//! - [`sequence`]: each step re-ranks or post-processes the previous output
//! - [`union`]: first occurrence wins, highest-priority operand first
//! - [`intersect`]: keys every operand agreed on, scores summed
//! - [`vote`]: weighted reciprocal rank fusion
//!
//! Building has no side effects. Evaluation ([`Node::evaluate`]) is read-only
//! and can run any number of times; corpus maintenance ([`Node::add`],
//! [`Node::reset`]) fans out to every leaf of the tree.
//!
//! # Usage
//!
//! ```ignore
//! use rankfuse_core::compose::{sequence, vote, Node};
//!
//! let tree = sequence([
//!     vote([
//!         Node::leaf(KeywordRetriever::new("id", ["title"])),
//!         Node::leaf(KeywordRetriever::new("id", ["article"])),
//!     ])
//!     .with_k(20),
//!     Node::leaf(DocumentHydrator::in_memory("id")),
//! ]);
//!
//! let results = tree.evaluate(vec!["paris", "lyon"], &SearchOptions::with_k(5)).await?;
//! ```

mod batch;
mod intersection;
mod leaf;
mod pipeline;
mod union;
mod vote;

#[cfg(test)]
mod tests;

pub use intersection::fuse as intersect_lists;
pub use union::fuse as union_lists;
pub use vote::fuse as vote_lists;

use crate::error::FusionError;
use crate::stage::{SearchOptions, Stage};
use crate::types::{Document, Query, Ranked, RankedList};
use futures::future::LocalBoxFuture;
use std::fmt;
use tracing::{info, instrument};

/// Closed set of node variants.
pub enum NodeKind {
    /// A retriever, ranker or post-processor
    Leaf(Box<dyn Stage>),
    /// Sequential composition
    Pipeline(Vec<Node>),
    /// First-occurrence merge
    Union(Vec<Node>),
    /// Common keys with summed scores
    Intersection(Vec<Node>),
    /// Weighted reciprocal rank fusion
    Vote(Vec<Node>),
}

/// A node of the composition tree.
///
/// Every node can carry `k` / `batch_size` overrides which take precedence
/// over the options received from its parent.
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) k: Option<usize>,
    pub(crate) batch_size: Option<usize>,
}

/// Builds a pipeline: each step receives the previous step's output.
pub fn sequence(steps: impl IntoIterator<Item = Node>) -> Node {
    Node::new(NodeKind::Pipeline(steps.into_iter().collect()))
}

/// Builds a union; earlier operands have priority on duplicates.
pub fn union(operands: impl IntoIterator<Item = Node>) -> Node {
    Node::new(NodeKind::Union(operands.into_iter().collect()))
}

/// Builds an intersection.
pub fn intersect(operands: impl IntoIterator<Item = Node>) -> Node {
    Node::new(NodeKind::Intersection(operands.into_iter().collect()))
}

/// Builds a vote.
pub fn vote(operands: impl IntoIterator<Item = Node>) -> Node {
    Node::new(NodeKind::Vote(operands.into_iter().collect()))
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            k: None,
            batch_size: None,
        }
    }

    /// Wraps a stage as a leaf.
    pub fn leaf(stage: impl Stage + 'static) -> Self {
        Self::new(NodeKind::Leaf(Box::new(stage)))
    }

    /// Wraps an already boxed stage as a leaf.
    pub fn from_boxed(stage: Box<dyn Stage>) -> Self {
        Self::new(NodeKind::Leaf(stage))
    }

    /// Caps this node's output at `k`, regardless of the parent's `k`.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Sets the batch size used by leaves under this node.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Appends `next` as a pipeline step, flattening plain pipelines.
    pub fn then(self, next: Node) -> Node {
        let mut steps = Vec::new();
        self.flatten_into("pipeline", &mut steps);
        next.flatten_into("pipeline", &mut steps);
        Node::new(NodeKind::Pipeline(steps))
    }

    /// Unions with `other` (lower priority), flattening plain unions.
    pub fn or(self, other: Node) -> Node {
        let mut operands = Vec::new();
        self.flatten_into("union", &mut operands);
        other.flatten_into("union", &mut operands);
        Node::new(NodeKind::Union(operands))
    }

    /// Intersects with `other`, flattening plain intersections.
    pub fn and(self, other: Node) -> Node {
        let mut operands = Vec::new();
        self.flatten_into("intersection", &mut operands);
        other.flatten_into("intersection", &mut operands);
        Node::new(NodeKind::Intersection(operands))
    }

    /// Moves the operands of a same-kind node without overrides into `out`.
    fn flatten_into(self, kind: &'static str, out: &mut Vec<Node>) {
        if self.kind_name() != kind || self.k.is_some() || self.batch_size.is_some() {
            out.push(self);
            return;
        }
        let Node {
            kind: node_kind,
            k,
            batch_size,
        } = self;
        match node_kind {
            NodeKind::Pipeline(children)
            | NodeKind::Union(children)
            | NodeKind::Intersection(children)
            | NodeKind::Vote(children) => out.extend(children),
            leaf @ NodeKind::Leaf(_) => out.push(Node {
                kind: leaf,
                k,
                batch_size,
            }),
        }
    }

    /// The node's variant.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Lower-case variant name used in logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Leaf(_) => "leaf",
            NodeKind::Pipeline(_) => "pipeline",
            NodeKind::Union(_) => "union",
            NodeKind::Intersection(_) => "intersection",
            NodeKind::Vote(_) => "vote",
        }
    }

    /// Output cap override, if any.
    pub fn k(&self) -> Option<usize> {
        self.k
    }

    /// Batch size override, if any.
    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Direct children (empty for leaves).
    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Leaf(_) => &[],
            NodeKind::Pipeline(children)
            | NodeKind::Union(children)
            | NodeKind::Intersection(children)
            | NodeKind::Vote(children) => children,
        }
    }

    /// Number of leaves in the subtree.
    pub fn leaf_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            _ => self.children().iter().map(Node::leaf_count).sum(),
        }
    }

    /// Evaluates a single query or a batch.
    ///
    /// A single query yields [`Ranked::Single`]; a batch of N queries yields
    /// [`Ranked::Batch`] with N lists in input order. In batch mode the first
    /// failing query aborts the whole batch and its index is reported in
    /// [`FusionError::Stage`].
    #[instrument(skip_all, fields(node = self.kind_name()))]
    pub async fn evaluate(
        &self,
        query: impl Into<Query>,
        options: &SearchOptions,
    ) -> Result<Ranked, FusionError> {
        let query = query.into();
        let lists = self.evaluate_batch(query.as_batch(), options, None).await?;
        Ok(batch::shape(&query, lists))
    }

    /// Evaluates one query.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<RankedList, FusionError> {
        let queries = [query.to_string()];
        let mut lists = self.evaluate_batch(&queries, options, None).await?;
        Ok(lists.pop().unwrap_or_default())
    }

    /// Evaluates a batch of queries, optionally restricted to candidates
    /// (one candidate list per query).
    pub fn evaluate_batch<'a>(
        &'a self,
        queries: &'a [String],
        options: &'a SearchOptions,
        candidates: Option<&'a [RankedList]>,
    ) -> LocalBoxFuture<'a, Result<Vec<RankedList>, FusionError>> {
        Box::pin(async move {
            let options = options.overridden_by(self.k, self.batch_size);
            if let Some(lists) = candidates {
                batch::check_len(self.kind_name(), queries.len(), lists.len())?;
            }

            let results = match &self.kind {
                NodeKind::Leaf(stage) => {
                    leaf::evaluate(stage.as_ref(), queries, &options, candidates).await?
                }
                NodeKind::Pipeline(steps) => {
                    let mut lists =
                        pipeline::evaluate(steps, queries, &options, candidates).await?;
                    if let Some(k) = self.k {
                        lists.iter_mut().for_each(|list| list.truncate(k));
                    }
                    lists
                }
                NodeKind::Union(operands) => {
                    let outputs =
                        batch::evaluate_operands("union", operands, queries, &options, candidates)
                            .await?;
                    batch::fuse_rows(&outputs, queries.len(), options.k, union::fuse)
                }
                NodeKind::Intersection(operands) => {
                    let outputs = batch::evaluate_operands(
                        "intersection",
                        operands,
                        queries,
                        &options,
                        candidates,
                    )
                    .await?;
                    batch::fuse_rows(&outputs, queries.len(), options.k, intersection::fuse)
                }
                NodeKind::Vote(operands) => {
                    let outputs =
                        batch::evaluate_operands("vote", operands, queries, &options, candidates)
                            .await?;
                    batch::fuse_rows(&outputs, queries.len(), options.k, vote::fuse)
                }
            };

            Ok(results)
        })
    }

    /// Adds documents to every leaf of the tree (upsert by key).
    ///
    /// Can be called repeatedly with additional batches of documents.
    #[instrument(skip_all, fields(node = self.kind_name(), documents = documents.len()))]
    pub async fn add(&mut self, documents: &[Document]) -> Result<&mut Self, FusionError> {
        self.add_boxed(documents).await?;
        info!(
            "Added {} documents to {} leaves",
            documents.len(),
            self.leaf_count()
        );
        Ok(self)
    }

    /// Clears the corpus of every leaf of the tree.
    #[instrument(skip_all, fields(node = self.kind_name()))]
    pub async fn reset(&mut self) -> Result<&mut Self, FusionError> {
        self.reset_boxed().await?;
        info!("Reset {} leaves", self.leaf_count());
        Ok(self)
    }

    fn add_boxed<'a>(
        &'a mut self,
        documents: &'a [Document],
    ) -> LocalBoxFuture<'a, Result<(), FusionError>> {
        Box::pin(async move {
            match &mut self.kind {
                NodeKind::Leaf(stage) => {
                    let name = stage.name().to_string();
                    stage
                        .add(documents)
                        .await
                        .map_err(|source| FusionError::Maintenance {
                            stage: name,
                            operation: "add",
                            source,
                        })?;
                }
                NodeKind::Pipeline(children)
                | NodeKind::Union(children)
                | NodeKind::Intersection(children)
                | NodeKind::Vote(children) => {
                    for child in children.iter_mut() {
                        child.add_boxed(documents).await?;
                    }
                }
            }
            Ok(())
        })
    }

    fn reset_boxed(&mut self) -> LocalBoxFuture<'_, Result<(), FusionError>> {
        Box::pin(async move {
            match &mut self.kind {
                NodeKind::Leaf(stage) => {
                    let name = stage.name().to_string();
                    stage
                        .reset()
                        .await
                        .map_err(|source| FusionError::Maintenance {
                            stage: name,
                            operation: "reset",
                            source,
                        })?;
                }
                NodeKind::Pipeline(children)
                | NodeKind::Union(children)
                | NodeKind::Intersection(children)
                | NodeKind::Vote(children) => {
                    for child in children.iter_mut() {
                        child.reset_boxed().await?;
                    }
                }
            }
            Ok(())
        })
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        match &self.kind {
            NodeKind::Leaf(stage) => write!(f, "{}", stage.spec())?,
            _ => write!(f, "{}", self.kind_name())?,
        }
        if let Some(k) = self.k {
            write!(f, " k={}", k)?;
        }
        if let Some(batch_size) = self.batch_size {
            write!(f, " batch_size={}", batch_size)?;
        }
        writeln!(f)?;
        for child in self.children() {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Renders the tree, one node per line, children indented by two spaces.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Node");
        debug.field("kind", &self.kind_name());
        if let NodeKind::Leaf(stage) = &self.kind {
            debug.field("stage", &stage.name());
        }
        debug
            .field("k", &self.k)
            .field("batch_size", &self.batch_size)
            .field("children", &self.children())
            .finish()
    }
}
