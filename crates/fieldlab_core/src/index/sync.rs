use super::{DocumentIndex, IndexDocument};
use crate::model::record::{current_epoch_ms, RecordId};
use crate::repo::RepoResult;
use log::info;
use serde::{Deserialize, Serialize};

/// Change notification emitted by the relational write path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    RecordUpserted {
        document: IndexDocument,
        emitted_at: i64,
    },
    RecordDeleted {
        record_id: RecordId,
        emitted_at: i64,
    },
}

impl SyncEvent {
    pub fn upserted(document: IndexDocument) -> Self {
        Self::RecordUpserted {
            document,
            emitted_at: current_epoch_ms(),
        }
    }

    pub fn deleted(record_id: RecordId) -> Self {
        Self::RecordDeleted {
            record_id,
            emitted_at: current_epoch_ms(),
        }
    }

    pub fn record_id(&self) -> RecordId {
        match self {
            Self::RecordUpserted { document, .. } => document.id,
            Self::RecordDeleted { record_id, .. } => *record_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::RecordUpserted { .. } => "upserted",
            Self::RecordDeleted { .. } => "deleted",
        }
    }
}

/// Applies sync events to a document index.
pub struct IndexSync<I: DocumentIndex> {
    index: I,
}

impl<I: DocumentIndex> IndexSync<I> {
    pub fn new(index: I) -> Self {
        Self { index }
    }

    /// Applies one event. Deleting an absent document is not an error.
    pub fn apply(&self, event: &SyncEvent) -> RepoResult<()> {
        match event {
            SyncEvent::RecordUpserted { document, .. } => self.index.upsert_document(document)?,
            SyncEvent::RecordDeleted { record_id, .. } => {
                self.index.delete_document(*record_id)?;
            }
        }
        info!(
            "event=index_sync module=index status=ok kind={}",
            event.kind()
        );
        Ok(())
    }

    /// Applies events in order, stopping at the first failure.
    pub fn apply_all<'a>(&self, events: impl IntoIterator<Item = &'a SyncEvent>) -> RepoResult<usize> {
        let mut applied = 0;
        for event in events {
            self.apply(event)?;
            applied += 1;
        }
        Ok(applied)
    }
}
