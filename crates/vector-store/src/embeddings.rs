use crate::config::DEFAULT_NGRAM_BUCKETS;
use crate::error::{Result, VectorStoreError};
use ndarray::{s, Array1, ArrayView1};

/// Width of the character-frequency block (one bucket per code point below 256).
pub const CHAR_BUCKETS: usize = 256;

/// Characters per n-gram window.
pub const NGRAM_LEN: usize = 3;

/// Identifies the embedding layout and n-gram hash. Persisted next to the
/// entries so vectors written by another scheme are never mixed in.
pub const EMBEDDING_FORMAT_ID: &str = "lexical-fnv1a64-v1";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic lexical fingerprint of a text.
///
/// Layout: `[char frequencies (256) | 3-gram buckets (K)]`. Raw counts, not
/// normalized; cosine scoring takes care of length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexicalEmbedder {
    ngram_buckets: usize,
}

impl LexicalEmbedder {
    /// Fails with `InvalidConfig` for a zero bucket count or a dimension
    /// that does not fit the `vectors.bin` header.
    pub fn new(ngram_buckets: usize) -> Result<Self> {
        Ok(Self {
            ngram_buckets: validate_buckets(ngram_buckets)?,
        })
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        CHAR_BUCKETS + self.ngram_buckets
    }

    #[must_use]
    pub const fn ngram_buckets(&self) -> usize {
        self.ngram_buckets
    }

    pub fn embed(&self, text: &str) -> Array1<f32> {
        let mut vector = Array1::<f32>::zeros(self.dimension());

        let chars: Vec<char> = text.chars().collect();
        for ch in &chars {
            let code = *ch as usize;
            if code < CHAR_BUCKETS {
                vector[code] += 1.0;
            }
        }

        let mut ngram = String::with_capacity(NGRAM_LEN * 4);
        for window in chars.windows(NGRAM_LEN) {
            ngram.clear();
            ngram.extend(window);
            vector[CHAR_BUCKETS + self.bucket_for(&ngram)] += 1.0;
        }

        vector
    }

    /// Bucket index of an n-gram within the n-gram block.
    #[must_use]
    pub fn bucket_for(&self, ngram: &str) -> usize {
        (fnv1a_64(ngram.as_bytes()) % self.ngram_buckets as u64) as usize
    }

    /// The n-gram block of an embedding, for inspection in tests and tools.
    #[must_use]
    pub fn ngram_block<'a>(&self, vector: ArrayView1<'a, f32>) -> ArrayView1<'a, f32> {
        vector.slice_move(s![CHAR_BUCKETS..])
    }
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self {
            ngram_buckets: DEFAULT_NGRAM_BUCKETS,
        }
    }
}

pub(crate) fn validate_buckets(buckets: usize) -> Result<usize> {
    if buckets == 0 {
        return Err(VectorStoreError::InvalidConfig(
            "n-gram bucket count must be greater than zero".to_string(),
        ));
    }
    let fits = CHAR_BUCKETS
        .checked_add(buckets)
        .is_some_and(|dimension| u32::try_from(dimension).is_ok());
    if !fits {
        return Err(VectorStoreError::InvalidConfig(format!(
            "n-gram bucket count {buckets} is too large"
        )));
    }
    Ok(buckets)
}

/// Cosine similarity in `[-1, 1]`. Zero-norm inputs and length mismatches
/// score 0 instead of producing NaN.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    similarity.clamp(-1.0, 1.0) as f32
}

/// 64-bit FNV-1a. Changing this invalidates every persisted store.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
