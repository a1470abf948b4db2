use async_trait::async_trait;

use crate::{records::SubmissionRecord, Result};

/// Port over the external append/read record store.
///
/// The store is shared with external editors and exposes no transactional
/// guarantees; submissions are pure appends and queries always re-read the
/// full set.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append one completed submission. The implementation re-synchronizes
    /// the canonical header row lazily before the first write.
    ///
    /// Fails with [`crate::Error::StoreWrite`].
    async fn append(&self, record: &SubmissionRecord) -> Result<()>;

    /// All records in append order.
    ///
    /// Fails with [`crate::Error::StoreRead`].
    async fn read_all(&self) -> Result<Vec<SubmissionRecord>>;
}
