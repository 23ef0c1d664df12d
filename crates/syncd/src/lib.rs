//! Association-set synchronizer: keeps the off-chain tree of approved labels
//! for each pool scope durable and in step with the on-chain root.

pub mod config;
pub mod error;
pub mod service;
pub mod snapshot;
pub mod source;
pub mod store;

pub use config::SyncdConfig;
pub use error::{Result, SyncError};
pub use service::{AspExport, AspSync, AspView, SyncPhase, SyncStatus, Synchronizer, DEFAULT_BATCH_SIZE};
pub use snapshot::{AspSnapshot, ContentPointer, Cursor};
pub use source::{ApprovedDeposit, ApprovedDepositSource, FileSource, RootPublisher, SourceError};
pub use store::{AspStore, MemoryStore, SledStore};
