//! Video lifecycle operations: deletion of on-disk artifacts and the record.

mod service;

pub use service::VideoLifecycleService;
