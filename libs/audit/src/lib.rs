//! CloudTrail access records: decoding a delivery and deciding which entries are
//! object downloads worth reporting, and how each object was retrieved.

mod batch;
mod classify;
mod entry;

pub use batch::{classify_batch, decode_batch, AuditBatch, BatchOutcome};
pub use classify::{classify, retrieval_method, Classification, FilterReason, RetrievalRule, Signature, RETRIEVAL_RULES};
pub use entry::{AdditionalEventData, DownloadRecord, RawAuditEntry, RequestParameters, UserIdentity, READ_OBJECT_EVENT};


#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to decompress audit delivery: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse audit delivery: {0}")]
    Json(#[from] serde_json::Error),
}
