use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_DIR_NAME: &str = "vector_db";

pub const ENTRIES_FILE_NAME: &str = "entries.json";
pub const VECTORS_FILE_NAME: &str = "vectors.bin";

#[must_use]
pub fn default_store_dir() -> PathBuf {
    PathBuf::from(".").join(DEFAULT_STORE_DIR_NAME)
}

#[must_use]
pub fn entries_path(dir: &Path) -> PathBuf {
    dir.join(ENTRIES_FILE_NAME)
}

#[must_use]
pub fn vectors_path(dir: &Path) -> PathBuf {
    dir.join(VECTORS_FILE_NAME)
}

/// Sibling path used for write-then-rename.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
