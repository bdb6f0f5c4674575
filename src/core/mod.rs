pub mod builder;
pub mod comparator;
pub mod engine;
pub mod hasher;
pub mod scanner;
pub mod transfer;

pub use builder::{BuildJob, BuildOrchestrator, BuildRequest, BuildResult, JobState};
pub use comparator::{diff_trees, filter_upload_scope, is_uploadable};
pub use engine::{SyncConfig, SyncEngine, SyncReport};
pub use hasher::calculate_hash;
pub use scanner::{FileScanner, ScanConfig};
pub use transfer::{
    progress_channel, BatchReport, TransferCoordinator, TransferDirection, TransferProgress,
    TransferTask,
};
