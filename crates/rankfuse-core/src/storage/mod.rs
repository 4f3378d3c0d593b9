//! Document storage used by hydration.
//!
//! Document persistence is the application's concern; the engine only needs
//! keyed lookups. [`InMemoryDocumentStore`] backs the default hydrator and the
//! tests. Other backends implement [`DocumentStore`].

mod document_store;

pub use document_store::{DocumentStore, InMemoryDocumentStore, StoreError};
