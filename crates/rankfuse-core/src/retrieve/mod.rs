//! Built-in retrievers and rankers.
//!
//! - [`KeywordRetriever`]: BM25 over the text of configured fields
//! - [`ExactMatchRetriever`]: documents whose field value occurs verbatim in the query
//! - [`VectorRanker`]: nearest neighbours / cosine re-ranking over embeddings
//!   produced by a [`TextEmbedder`]
//!
//! All of them index documents through [`Stage::add`](crate::stage::Stage::add)
//! and can be placed anywhere in a tree. With candidates they rank only the
//! candidate keys.

mod exact;
mod keyword;
mod vector;

pub use exact::ExactMatchRetriever;
pub use keyword::KeywordRetriever;
pub use vector::{TextEmbedder, VectorRanker};

/// Lower-cased alphanumeric tokens of `text`.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}
