//! 离线支持：操作队列与联网后的同步回放

mod queue;
mod sync;

pub use queue::{
    DrainFailure, DrainReport, OfflineOperation, OfflineQueue, OperationApplier, OperationKind,
};
pub use sync::SyncWorker;
