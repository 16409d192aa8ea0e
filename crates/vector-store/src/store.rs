use crate::config::StoreConfig;
use crate::embeddings::{cosine_similarity, LexicalEmbedder};
use crate::error::{Result, VectorStoreError};
use crate::metadata::{Metadata, MetadataFilter};
use crate::persistence;
use crate::types::{DeleteSelector, Entry, EntryMatch, SearchHit};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::path::{Path, PathBuf};

/// Entries and their embedding rows, kept position-aligned.
///
/// Every mutator touches both halves, so `entries.len() == vectors.nrows()`
/// holds between calls.
#[derive(Debug, Clone)]
struct AlignedRows {
    entries: Vec<Entry>,
    vectors: Array2<f32>,
}

impl AlignedRows {
    fn from_parts(entries: Vec<Entry>, vectors: Array2<f32>) -> Result<Self> {
        if entries.len() != vectors.nrows() {
            return Err(VectorStoreError::CorruptPersistence(format!(
                "{} entries but {} vector rows",
                entries.len(),
                vectors.nrows()
            )));
        }
        Ok(Self { entries, vectors })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    fn push(&mut self, entry: Entry, vector: &Array1<f32>) -> Result<usize> {
        self.vectors
            .push_row(vector.view())
            .map_err(|_| VectorStoreError::InvalidDimension {
                expected: self.vectors.ncols(),
                actual: vector.len(),
            })?;
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// Remove the given positions. Callers pass them sorted descending and
    /// deduplicated so earlier removals never shift later ones.
    fn remove_descending(&mut self, positions: &[usize]) {
        if positions.is_empty() {
            return;
        }
        for &position in positions {
            self.entries.remove(position);
        }
        let keep: Vec<usize> = (0..self.vectors.nrows())
            .filter(|i| {
                positions
                    .binary_search_by(|removed| i.cmp(removed))
                    .is_err()
            })
            .collect();
        self.vectors = self.vectors.select(Axis(0), &keep);
    }

    fn clear(&mut self) {
        let dimension = self.dimension();
        self.entries.clear();
        self.vectors = Array2::zeros((0, dimension));
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &Entry, ArrayView1<'_, f32>)> {
        self.entries
            .iter()
            .zip(self.vectors.rows())
            .enumerate()
            .map(|(position, (entry, vector))| (position, entry, vector))
    }
}

/// Embedded vector store backed by one directory.
///
/// One physical store serves every collection; a collection is only a tag
/// on each entry. All operations are synchronous, and every mutation
/// rewrites both artifacts before returning.
pub struct VectorStore {
    rows: AlignedRows,
    embedder: LexicalEmbedder,
    dir: PathBuf,
}

impl VectorStore {
    /// Open (or create) a store in `dir` with the default bucket count.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(StoreConfig::new(dir))
    }

    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let embedder = LexicalEmbedder::new(config.ngram_buckets())?;
        let dir = config.dir().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| VectorStoreError::Configuration {
            path: dir.clone(),
            source,
        })?;
        if !dir.is_dir() {
            return Err(VectorStoreError::Configuration {
                path: dir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            });
        }

        let (entries, vectors) = persistence::load(&dir, embedder.dimension())?;
        let rows = AlignedRows::from_parts(entries, vectors)?;

        log::info!(
            "Opened VectorStore at {:?} ({} entries, dimension {})",
            dir,
            rows.len(),
            embedder.dimension()
        );

        Ok(Self {
            rows,
            embedder,
            dir,
        })
    }

    /// Embed `document`, append it and persist. Returns the new position.
    pub fn add(
        &mut self,
        collection: &str,
        document: &str,
        metadata: Metadata,
    ) -> Result<usize> {
        let vector = self.embedder.embed(document);
        let position = self
            .rows
            .push(Entry::new(collection, document, metadata), &vector)?;

        if let Err(err) = self.persist() {
            // Keep memory in step with what is on disk.
            self.rows.remove_descending(&[position]);
            return Err(err);
        }

        log::debug!("Added entry {position} to collection '{collection}'");
        Ok(position)
    }

    /// Rank entries of `collection` by cosine similarity to `query`.
    ///
    /// Ties keep storage order. At most `limit` hits are returned.
    pub fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<SearchHit> {
        log::debug!("Searching '{collection}' for '{query}' (limit: {limit})");
        if limit == 0 {
            return Vec::new();
        }

        let query_vector = self.embedder.embed(query);
        let mut hits: Vec<SearchHit> = self
            .rows
            .iter()
            .filter(|(_, entry, _)| entry.is_selected(collection, filter))
            .map(|(position, entry, vector)| SearchHit {
                position,
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(query_vector.view(), vector),
            })
            .collect();

        // Stable sort keeps scan order for equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        log::debug!("Found {} results", hits.len());
        hits
    }

    /// Entries of `collection` matching `filter`, in storage order.
    pub fn get_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> Vec<EntryMatch> {
        self.rows
            .iter()
            .filter(|(_, entry, _)| entry.is_selected(collection, Some(filter)))
            .map(|(position, entry, _)| EntryMatch::from_entry(position, entry))
            .collect()
    }

    pub fn get_all(&self, collection: &str) -> Vec<EntryMatch> {
        self.get_by_metadata(collection, &MetadataFilter::new())
    }

    /// Remove rows and persist. Returns how many rows were removed.
    ///
    /// A position outside the store is an error, as is a position that
    /// belongs to another collection. A metadata selector that matches
    /// nothing (or is empty) removes nothing and leaves the files alone.
    pub fn delete(&mut self, collection: &str, selector: DeleteSelector) -> Result<usize> {
        let positions = match selector {
            DeleteSelector::Position(position) => {
                let entry = self.rows.entries.get(position).ok_or(
                    VectorStoreError::InvalidIndex {
                        position,
                        len: self.rows.len(),
                    },
                )?;
                if entry.collection != collection {
                    return Err(VectorStoreError::CollectionMismatch {
                        position,
                        expected: collection.to_string(),
                        actual: entry.collection.clone(),
                    });
                }
                vec![position]
            }
            DeleteSelector::Metadata(filter) => {
                if filter.is_empty() {
                    log::debug!("Ignoring delete with empty filter on '{collection}'");
                    return Ok(0);
                }
                let mut matched: Vec<usize> = self
                    .rows
                    .iter()
                    .filter(|(_, entry, _)| entry.is_selected(collection, Some(&filter)))
                    .map(|(position, _, _)| position)
                    .collect();
                matched.reverse();
                matched
            }
        };

        if positions.is_empty() {
            return Ok(0);
        }

        let mut remaining = self.rows.clone();
        remaining.remove_descending(&positions);
        persistence::save(&self.dir, &remaining.entries, &remaining.vectors)?;
        self.rows = remaining;

        log::debug!(
            "Deleted {} entries from collection '{collection}'",
            positions.len()
        );
        Ok(positions.len())
    }

    pub fn delete_at(&mut self, collection: &str, position: usize) -> Result<()> {
        self.delete(collection, DeleteSelector::Position(position))
            .map(|_| ())
    }

    pub fn delete_where(&mut self, collection: &str, filter: MetadataFilter) -> Result<usize> {
        self.delete(collection, DeleteSelector::Metadata(filter))
    }

    /// Drop every entry and remove the persisted artifacts.
    pub fn reset(&mut self) -> Result<()> {
        log::info!("Resetting VectorStore at {:?}", self.dir);
        persistence::remove(&self.dir)?;
        self.rows.clear();
        Ok(())
    }

    /// Total number of entries across all collections.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.len() == 0
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        self.rows
            .entries
            .iter()
            .filter(|entry| entry.collection == collection)
            .count()
    }

    /// Distinct collection tags in first-seen order.
    pub fn collections(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for entry in &self.rows.entries {
            if !seen.iter().any(|c| c == &entry.collection) {
                seen.push(entry.collection.clone());
            }
        }
        seen
    }

    pub fn entry(&self, position: usize) -> Option<&Entry> {
        self.rows.entries.get(position)
    }

    pub fn vector(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        (position < self.rows.len()).then(|| self.rows.vectors.row(position))
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub const fn embedder(&self) -> &LexicalEmbedder {
        &self.embedder
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn persist(&self) -> Result<()> {
        persistence::save(&self.dir, &self.rows.entries, &self.rows.vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{metadata, MetadataValue};
    use crate::paths::{entries_path, temp_path_for, vectors_path};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn small_store(dir: &Path) -> VectorStore {
        let config = StoreConfig::new(dir).with_ngram_buckets(512).unwrap();
        VectorStore::with_config(config).unwrap()
    }

    fn assert_aligned(store: &VectorStore) {
        assert_eq!(store.rows.entries.len(), store.rows.vectors.nrows());
        for position in 0..store.len() {
            let entry = store.entry(position).unwrap();
            let expected = store.embedder().embed(&entry.document);
            assert_eq!(store.vector(position).unwrap(), expected.view());
        }
    }

    #[test]
    fn test_add_and_search() {
        let tmp = TempDir::new().unwrap();
        let mut store = VectorStore::open(tmp.path()).unwrap();

        store
            .add("characters", "A brave hero", metadata([("name", "Hero")]))
            .unwrap();
        store
            .add(
                "characters",
                "A cowardly villain",
                metadata([("name", "Villain")]),
            )
            .unwrap();

        let results = store.search("characters", "brave knight", 1, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document, "A brave hero");
        assert_eq!(results[0].metadata["name"], MetadataValue::from("Hero"));
    }

    #[test]
    fn add_returns_sequential_positions() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        assert_eq!(store.add("plot", "first", Metadata::new()).unwrap(), 0);
        assert_eq!(store.add("world", "second", Metadata::new()).unwrap(), 1);
        assert_eq!(store.add("plot", "third", Metadata::new()).unwrap(), 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.collection_len("plot"), 2);
        assert_eq!(store.collections(), vec!["plot", "world"]);
        assert!(entries_path(tmp.path()).exists());
        assert!(vectors_path(tmp.path()).exists());
    }

    #[test]
    fn identical_document_ranks_first_with_score_one() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("chapters", "The tower fell at dawn", Metadata::new()).unwrap();
        store.add("chapters", "The tower stood at dusk", Metadata::new()).unwrap();
        store.add("chapters", "Market day in the capital", Metadata::new()).unwrap();

        let hits = store.search("chapters", "The tower stood at dusk", 10, None);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[0].score, 1.0);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn search_only_scans_requested_collection() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("skills", "fire sword", Metadata::new()).unwrap();
        store.add("world", "fire sword", Metadata::new()).unwrap();

        let hits = store.search("world", "fire sword", 5, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, 1);
        assert!(store.search("reviews", "fire sword", 5, None).is_empty());
        assert!(store.search("world", "fire sword", 0, None).is_empty());
    }

    #[test]
    fn search_ties_keep_storage_order() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        for _ in 0..3 {
            store.add("plot", "same words", Metadata::new()).unwrap();
        }
        let positions: Vec<usize> = store
            .search("plot", "same words", 3, None)
            .iter()
            .map(|hit| hit.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn zero_vector_query_scores_zero() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "anything at all", Metadata::new()).unwrap();
        let hits = store.search("plot", "", 5, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn search_applies_metadata_filter() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store
            .add("characters", "sister, student", metadata([("role", "lead")]))
            .unwrap();
        store
            .add("characters", "sister, healer", metadata([("role", "support")]))
            .unwrap();
        store
            .add("characters", "brother, student", Metadata::new())
            .unwrap();

        let filter = MetadataFilter::new().eq("role", "support");
        let hits = store.search("characters", "sister student", 5, Some(&filter));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document, "sister, healer");
    }

    #[test]
    fn get_by_metadata_is_exact_and_ordered() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("characters", "one", metadata([("name", "X")])).unwrap();
        store.add("characters", "two", metadata([("name", "x")])).unwrap();
        store.add("world", "three", metadata([("name", "X")])).unwrap();
        store.add("characters", "four", metadata([("name", "X")])).unwrap();

        let matches = store.get_by_metadata("characters", &MetadataFilter::new().eq("name", "X"));
        let docs: Vec<&str> = matches.iter().map(|m| m.document.as_str()).collect();
        assert_eq!(docs, vec!["one", "four"]);
        assert_eq!(matches[1].position, 3);

        let all: Vec<String> = store
            .get_all("characters")
            .into_iter()
            .map(|m| m.document)
            .collect();
        assert_eq!(all, vec!["one", "two", "four"]);
    }

    #[test]
    fn delete_by_metadata_removes_batch_and_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        let statuses = ["archived", "active", "archived", "active", "archived"];
        for (i, status) in statuses.iter().enumerate() {
            store
                .add(
                    "foreshadowing",
                    &format!("thread {i}"),
                    metadata([("status", *status)]),
                )
                .unwrap();
        }

        let removed = store
            .delete_where(
                "foreshadowing",
                MetadataFilter::new().eq("status", "archived"),
            )
            .unwrap();
        assert_eq!(removed, 3);

        let docs: Vec<String> = store
            .get_all("foreshadowing")
            .into_iter()
            .map(|m| m.document)
            .collect();
        assert_eq!(docs, vec!["thread 1", "thread 3"]);
        assert_aligned(&store);
    }

    #[test]
    fn delete_by_metadata_stays_inside_collection() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "a", metadata([("chapter", 1)])).unwrap();
        store.add("reviews", "b", metadata([("chapter", 1)])).unwrap();

        let removed = store
            .delete_where("plot", MetadataFilter::new().eq("chapter", 1))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.entry(0).unwrap().collection, "reviews");
    }

    #[test]
    fn delete_without_matches_is_noop() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "a", metadata([("chapter", 1)])).unwrap();

        let removed = store
            .delete_where("plot", MetadataFilter::new().eq("chapter", 2))
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.delete_where("plot", MetadataFilter::new()).unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_by_position_shifts_later_entries() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "a", Metadata::new()).unwrap();
        store.add("plot", "b", Metadata::new()).unwrap();
        store.add("plot", "c", Metadata::new()).unwrap();

        store.delete_at("plot", 1).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.entry(1).unwrap().document, "c");
        assert_aligned(&store);
    }

    #[test]
    fn delete_by_invalid_position_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "a", Metadata::new()).unwrap();

        let err = store.delete_at("plot", 5).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::InvalidIndex {
                position: 5,
                len: 1
            }
        ));

        let err = store.delete_at("world", 0).unwrap_err();
        assert!(matches!(err, VectorStoreError::CollectionMismatch { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reset_clears_memory_and_disk() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "a", Metadata::new()).unwrap();
        store.reset().unwrap();

        assert!(store.is_empty());
        assert!(!entries_path(tmp.path()).exists());
        assert!(!vectors_path(tmp.path()).exists());

        assert_eq!(store.add("plot", "b", Metadata::new()).unwrap(), 0);
        drop(store);
        let reopened = small_store(tmp.path());
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn failed_delete_leaves_memory_and_disk_unchanged() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "first beat", Metadata::new()).unwrap();
        store.add("plot", "second beat", Metadata::new()).unwrap();

        // A directory at the temp path makes the next save fail.
        let blocker = temp_path_for(&vectors_path(tmp.path()));
        std::fs::create_dir(&blocker).unwrap();

        assert!(store.delete_at("plot", 0).is_err());
        assert!(store.delete_where("plot", MetadataFilter::new().eq("x", 1)).is_ok());
        assert_eq!(store.len(), 2);
        assert_eq!(store.entry(0).unwrap().document, "first beat");
        assert_aligned(&store);

        std::fs::remove_dir(&blocker).unwrap();
        let reopened = small_store(tmp.path());
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn failed_add_is_not_persisted() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "a", Metadata::new()).unwrap();

        let blocker = temp_path_for(&entries_path(tmp.path()));
        std::fs::create_dir(&blocker).unwrap();

        assert!(store.add("plot", "b", Metadata::new()).is_err());
        assert_eq!(store.len(), 1);
        assert_aligned(&store);

        std::fs::remove_dir(&blocker).unwrap();
        let reopened = small_store(tmp.path());
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.entry(0).unwrap().document, "a");
    }

    #[test]
    fn failed_reset_keeps_entries() {
        let tmp = TempDir::new().unwrap();
        let mut store = small_store(tmp.path());
        store.add("plot", "a", Metadata::new()).unwrap();

        let blocker = temp_path_for(&entries_path(tmp.path()));
        std::fs::create_dir(&blocker).unwrap();

        assert!(store.reset().is_err());
        assert_eq!(store.len(), 1);
        assert!(entries_path(tmp.path()).exists());
        assert!(vectors_path(tmp.path()).exists());

        std::fs::remove_dir(&blocker).unwrap();
        assert_eq!(small_store(tmp.path()).len(), 1);
    }

    #[test]
    fn remove_descending_drops_scattered_rows() {
        let entries: Vec<Entry> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|doc| Entry::new("plot", *doc, Metadata::new()))
            .collect();
        let vectors = Array2::from_shape_fn((6, 2), |(row, col)| (row * 10 + col) as f32);
        let mut rows = AlignedRows::from_parts(entries, vectors).unwrap();

        rows.remove_descending(&[5, 3, 0]);

        let docs: Vec<&str> = rows.entries.iter().map(|e| e.document.as_str()).collect();
        assert_eq!(docs, vec!["b", "c", "e"]);
        assert_eq!(
            rows.vectors,
            ndarray::array![[10.0f32, 11.0], [20.0, 21.0], [40.0, 41.0]]
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, String),
        DeleteAt(usize),
        DeleteTag(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0u8..3, "[a-z ]{0,12}").prop_map(|(tag, doc)| Op::Add(tag, doc)),
            1 => (0usize..8).prop_map(Op::DeleteAt),
            1 => (0u8..3).prop_map(Op::DeleteTag),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn proptest_rows_stay_aligned(ops in prop::collection::vec(op(), 1..12)) {
            let tmp = TempDir::new().unwrap();
            let config = StoreConfig::new(tmp.path()).with_ngram_buckets(64).unwrap();
            let mut store = VectorStore::with_config(config).unwrap();

            for op in ops {
                match op {
                    Op::Add(tag, doc) => {
                        store.add("plot", &doc, metadata([("tag", i64::from(tag))])).unwrap();
                    }
                    Op::DeleteAt(position) => {
                        let len_before = store.len();
                        let result = store.delete_at("plot", position);
                        prop_assert_eq!(result.is_ok(), position < len_before);
                    }
                    Op::DeleteTag(tag) => {
                        store
                            .delete_where("plot", MetadataFilter::new().eq("tag", i64::from(tag)))
                            .unwrap();
                    }
                }
                prop_assert_eq!(store.rows.entries.len(), store.rows.vectors.nrows());
                for position in 0..store.len() {
                    let doc = &store.entry(position).unwrap().document;
                    let expected = store.embedder().embed(doc);
                    prop_assert_eq!(store.vector(position).unwrap(), expected.view());
                }
            }

            let reopened = VectorStore::with_config(
                StoreConfig::new(tmp.path()).with_ngram_buckets(64).unwrap(),
            )
            .unwrap();
            prop_assert_eq!(reopened.len(), store.len());
            prop_assert_eq!(&reopened.rows.vectors, &store.rows.vectors);
        }
    }
}
