//! # Narrative Vector Store
//!
//! Embedded vector storage and brute-force similarity search for long-form
//! narrative memory: characters, world facts, foreshadowing, plot points and
//! chapter summaries.
//!
//! ## Features
//!
//! - **Deterministic lexical embeddings**: character frequencies plus hashed
//!   character 3-grams, no model download
//! - **Cosine similarity search** with exact metadata filters
//! - **Collections** as tags inside one physical store
//! - **Synchronous persistence** of two row-aligned artifacts on every mutation
//!
//! ## Architecture
//!
//! ```text
//! add(collection, document, metadata)
//!     │
//!     ├──> LexicalEmbedder
//!     │      └─> Vector[256 + K]
//!     │
//!     ├──> AlignedRows (entries[i] <-> vectors[i])
//!     │      └─> Linear scan + cosine
//!     │
//!     └──> Persistent Storage
//!            ├─> entries.json
//!            └─> vectors.bin
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use narrative_vector_store::{metadata, MetadataFilter, VectorStore};
//!
//! fn main() -> narrative_vector_store::Result<()> {
//!     let mut store = VectorStore::open("./vector_db")?;
//!
//!     store.add("characters", "A brave hero", metadata([("name", "Hero")]))?;
//!     store.add("characters", "A cowardly villain", metadata([("name", "Villain")]))?;
//!
//!     for hit in store.search("characters", "brave knight", 3, None) {
//!         println!("{}: {:.3}", hit.document, hit.score);
//!     }
//!
//!     let villains = store.get_by_metadata("characters", &MetadataFilter::new().eq("name", "Villain"));
//!     assert_eq!(villains.len(), 1);
//!
//!     Ok(())
//! }
//! ```

mod config;
mod embeddings;
mod error;
mod metadata;
mod paths;
mod persistence;
mod store;
mod types;

pub use config::{StoreConfig, DEFAULT_NGRAM_BUCKETS};
pub use embeddings::{
    cosine_similarity, fnv1a_64, LexicalEmbedder, CHAR_BUCKETS, EMBEDDING_FORMAT_ID, NGRAM_LEN,
};
pub use error::{Result, VectorStoreError};
pub use metadata::{metadata, Metadata, MetadataFilter, MetadataValue};
pub use paths::{entries_path, vectors_path, ENTRIES_FILE_NAME, VECTORS_FILE_NAME};
pub use persistence::{ENTRIES_SCHEMA_VERSION, VECTORS_FORMAT_VERSION};
pub use store::VectorStore;
pub use types::{DeleteSelector, Entry, EntryMatch, SearchHit};
