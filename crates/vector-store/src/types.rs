use crate::metadata::{Metadata, MetadataFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored document. Immutable once added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub collection: String,
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn new(collection: impl Into<String>, document: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            collection: collection.into(),
            document: document.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn is_selected(&self, collection: &str, filter: Option<&MetadataFilter>) -> bool {
        self.collection == collection && filter.map_or(true, |f| f.matches(&self.metadata))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub document: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryMatch {
    pub position: usize,
    pub document: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl EntryMatch {
    pub(crate) fn from_entry(position: usize, entry: &Entry) -> Self {
        Self {
            position,
            document: entry.document.clone(),
            metadata: entry.metadata.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Which rows a delete call removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteSelector {
    Position(usize),
    Metadata(MetadataFilter),
}
