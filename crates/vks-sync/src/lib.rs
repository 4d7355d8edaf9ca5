//! vks-sync: turns a master secret into the record set the signer fleet runs
//!
//! ```text
//! scan ──► reconcile against store snapshot ──► assign groups ──► seal ──► SyncPlan
//!   ▲                                                 ▲                       │
//!   oracle                              transfer bundle (merge)         apply │ upsert
//!                                                                             ▼
//!                                                                        SyncReport
//! ```
//!
//! Nothing touches the store until [`SyncPlan::apply`].

pub mod bundle;
pub mod export;
pub mod groups;
pub mod plan;
pub mod scanner;
pub mod transfer;

pub use bundle::{read_bundle, write_export};
pub use export::{export_registered, ExportedKey};
pub use groups::{assign, group_count, AssignedKey};
pub use plan::{
    plan_sync, sync, PlannedWrite, RecordChange, SyncPlan, SyncReport, SyncRequest, TransferBundle,
};
pub use scanner::scan;
pub use transfer::{merge, TransferFailure, TransferFile, TransferOutcome};

/// Progress callback type (done, total, message). `total` is 0 when unknown.
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;
