use crate::embeddings::validate_buckets;
use crate::error::{Result, VectorStoreError};
use crate::paths::default_store_dir;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_NGRAM_BUCKETS: usize = 10_000;

const DIR_ENV: &str = "NARRATIVE_MEMORY_DIR";
const BUCKETS_ENV: &str = "NARRATIVE_MEMORY_NGRAM_BUCKETS";

/// Where a store lives and how wide its vectors are.
///
/// The bucket count is part of the on-disk format: reopening a directory
/// with a different value is rejected as a dimension mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    dir: PathBuf,
    ngram_buckets: usize,
}

impl StoreConfig {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ngram_buckets: DEFAULT_NGRAM_BUCKETS,
        }
    }

    pub fn with_ngram_buckets(mut self, buckets: usize) -> Result<Self> {
        self.ngram_buckets = validate_buckets(buckets)?;
        Ok(self)
    }

    /// Read `NARRATIVE_MEMORY_DIR` and `NARRATIVE_MEMORY_NGRAM_BUCKETS`,
    /// falling back to `./vector_db` and the default bucket count.
    pub fn from_env() -> Result<Self> {
        let dir = env::var_os(DIR_ENV)
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_store_dir);

        let config = Self::new(dir);
        match env::var(BUCKETS_ENV) {
            Ok(raw) => {
                let raw = raw.trim().to_ascii_lowercase();
                if raw.is_empty() || raw == "default" {
                    return Ok(config);
                }
                let buckets = raw.parse::<usize>().map_err(|_| {
                    VectorStoreError::InvalidConfig(format!(
                        "Unsupported {BUCKETS_ENV} '{raw}' (expected a positive integer)"
                    ))
                })?;
                config.with_ngram_buckets(buckets)
            }
            Err(_) => Ok(config),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn ngram_buckets(&self) -> usize {
        self.ngram_buckets
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        crate::embeddings::CHAR_BUCKETS + self.ngram_buckets
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(default_store_dir())
    }
}
