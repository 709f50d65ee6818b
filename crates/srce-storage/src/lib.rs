//! Srce Storage Library
//!
//! On-disk layout for uploaded videos and their derived artifacts, the chunk
//! staging area and the blob merger.

pub mod chunks;
pub mod files;
pub mod layout;
pub mod locks;

pub use chunks::ChunkStore;
pub use files::{ensure_dir, remove_if_exists, write_file, write_stream};
pub use layout::StorageLayout;
pub use locks::{KeyedLocks, MergeGuard, UploadKey};
