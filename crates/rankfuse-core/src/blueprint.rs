//! Structural serialization of composition trees.
//!
//! A [`TreeSpec`] describes a tree's shape, overrides and leaf configuration,
//! never its corpus: a rebuilt tree is empty and has to be fed through
//! [`Node::add`] again.
//!
//! Built-in leaves are rebuilt from their [`LeafSpec`]. Stages defined outside
//! this crate are written as `external` leaves and recreated by a factory
//! registered under the same name in a [`StageRegistry`].
//!
//! # Format
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "min_compatible_version": 1,
//!   "root": {
//!     "type": "pipeline",
//!     "steps": [
//!       {
//!         "type": "vote",
//!         "k": 20,
//!         "operands": [
//!           { "type": "leaf", "stage": { "kind": "keyword", "key": "id", "on": ["title"] } },
//!           { "type": "leaf", "stage": { "kind": "keyword", "key": "id", "on": ["article"] } }
//!         ]
//!       },
//!       { "type": "leaf", "stage": { "kind": "documents", "key": "id" } }
//!     ]
//!   }
//! }
//! ```

use crate::compose::{Node, NodeKind};
use crate::config::{CURRENT_SCHEMA_VERSION, MIN_COMPATIBLE_SCHEMA_VERSION};
use crate::error::FusionError;
use crate::hydrate::DocumentHydrator;
use crate::retrieve::{ExactMatchRetriever, KeywordRetriever};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Configuration of a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeafSpec {
    /// [`KeywordRetriever`] over `on`
    Keyword {
        /// Key field
        key: String,
        /// Indexed fields
        on: Vec<String>,
    },
    /// [`ExactMatchRetriever`] over `on`
    Exact {
        /// Key field
        key: String,
        /// Indexed fields
        on: Vec<String>,
    },
    /// [`DocumentHydrator`] backed by an in-memory store
    Documents {
        /// Key field
        key: String,
    },
    /// Stage created by a registered factory
    External {
        /// Registry name
        name: String,
    },
}

impl LeafSpec {
    fn build(&self, registry: &StageRegistry) -> Result<Box<dyn Stage>, FusionError> {
        Ok(match self {
            LeafSpec::Keyword { key, on } => Box::new(KeywordRetriever::new(key, on)),
            LeafSpec::Exact { key, on } => Box::new(ExactMatchRetriever::new(key, on)),
            LeafSpec::Documents { key } => Box::new(DocumentHydrator::in_memory(key)),
            LeafSpec::External { name } => registry.create(name)?,
        })
    }
}

impl fmt::Display for LeafSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafSpec::Keyword { key, on } => write!(f, "keyword on={} key={}", on.join(","), key),
            LeafSpec::Exact { key, on } => write!(f, "exact on={} key={}", on.join(","), key),
            LeafSpec::Documents { key } => write!(f, "documents key={}", key),
            LeafSpec::External { name } => write!(f, "external {}", name),
        }
    }
}

/// Variant-specific part of a [`NodeSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKindSpec {
    /// A single stage
    Leaf {
        /// Leaf configuration
        stage: LeafSpec,
    },
    /// Sequential composition
    Pipeline {
        /// Steps in evaluation order
        steps: Vec<NodeSpec>,
    },
    /// First-occurrence merge
    Union {
        /// Operands, highest priority first
        operands: Vec<NodeSpec>,
    },
    /// Common keys with summed scores
    Intersection {
        /// Operands
        operands: Vec<NodeSpec>,
    },
    /// Weighted reciprocal rank fusion
    Vote {
        /// Operands
        operands: Vec<NodeSpec>,
    },
}

/// Serializable description of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node variant and children
    #[serde(flatten)]
    pub kind: NodeKindSpec,
    /// Output cap override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    /// Batch size override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl NodeSpec {
    /// Builds the subtree described by this spec.
    pub fn build(&self, registry: &StageRegistry) -> Result<Node, FusionError> {
        let build_all = |specs: &[NodeSpec]| -> Result<Vec<Node>, FusionError> {
            specs.iter().map(|spec| spec.build(registry)).collect()
        };

        let kind = match &self.kind {
            NodeKindSpec::Leaf { stage } => NodeKind::Leaf(stage.build(registry)?),
            NodeKindSpec::Pipeline { steps } => NodeKind::Pipeline(build_all(steps)?),
            NodeKindSpec::Union { operands } => NodeKind::Union(build_all(operands)?),
            NodeKindSpec::Intersection { operands } => {
                NodeKind::Intersection(build_all(operands)?)
            }
            NodeKindSpec::Vote { operands } => NodeKind::Vote(build_all(operands)?),
        };

        let mut node = Node::new(kind);
        node.k = self.k;
        node.batch_size = self.batch_size;
        Ok(node)
    }
}

/// Versioned, serializable description of a whole tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    /// Schema version this spec was written with
    pub schema_version: u32,
    /// Minimum schema version required to read this spec
    pub min_compatible_version: u32,
    /// Root node
    pub root: NodeSpec,
}

impl TreeSpec {
    /// Describes `node` with the current schema version.
    pub fn from_node(node: &Node) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            min_compatible_version: MIN_COMPATIBLE_SCHEMA_VERSION,
            root: node.to_spec(),
        }
    }

    /// Checks if this spec can be read by the current version.
    pub fn is_compatible(&self) -> bool {
        CURRENT_SCHEMA_VERSION >= self.min_compatible_version
            && self.schema_version >= MIN_COMPATIBLE_SCHEMA_VERSION
    }

    /// Rebuilds the tree. Leaves start with an empty corpus.
    ///
    /// # Errors
    ///
    /// - `FusionError::IncompatibleSchema` if the schema version is unsupported
    /// - `FusionError::UnknownStage` if an external leaf has no registered factory
    pub fn build(&self, registry: &StageRegistry) -> Result<Node, FusionError> {
        if !self.is_compatible() {
            warn!(
                "Incompatible tree schema version {} (min: {})",
                self.schema_version, self.min_compatible_version
            );
            return Err(FusionError::IncompatibleSchema {
                found: self.schema_version,
                min: MIN_COMPATIBLE_SCHEMA_VERSION,
                current: CURRENT_SCHEMA_VERSION,
            });
        }

        let node = self.root.build(registry)?;
        debug!(leaves = node.leaf_count(), "Built tree from spec");
        Ok(node)
    }

    /// Parses a spec from JSON.
    pub fn from_json(json: &str) -> Result<Self, FusionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the tree description as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, FusionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Node {
    /// Describes this subtree. External stages are recorded by name.
    pub fn to_spec(&self) -> NodeSpec {
        let describe = |nodes: &[Node]| nodes.iter().map(Node::to_spec).collect::<Vec<_>>();

        let kind = match self.kind() {
            NodeKind::Leaf(stage) => NodeKindSpec::Leaf {
                stage: stage.spec(),
            },
            NodeKind::Pipeline(steps) => NodeKindSpec::Pipeline {
                steps: describe(steps),
            },
            NodeKind::Union(operands) => NodeKindSpec::Union {
                operands: describe(operands),
            },
            NodeKind::Intersection(operands) => NodeKindSpec::Intersection {
                operands: describe(operands),
            },
            NodeKind::Vote(operands) => NodeKindSpec::Vote {
                operands: describe(operands),
            },
        };

        NodeSpec {
            kind,
            k: self.k(),
            batch_size: self.batch_size(),
        }
    }
}

type StageFactory = Box<dyn Fn() -> Box<dyn Stage>>;

/// Factories for `external` leaves, by name.
#[derive(Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    /// Creates an empty registry (enough for trees of built-in leaves).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous factory.
    pub fn register<F, S>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> S + 'static,
        S: Stage + 'static,
    {
        self.factories
            .insert(name.into(), Box::new(move || Box::new(factory())));
        self
    }

    /// Returns `true` if a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn create(&self, name: &str) -> Result<Box<dyn Stage>, FusionError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| FusionError::UnknownStage(name.to_string()))
    }
}
