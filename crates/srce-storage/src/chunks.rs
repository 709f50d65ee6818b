//! Chunk staging and the blob merger

use srce_core::validation::validate_path_segment;
use srce_core::{AppError, AppResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::files::{ensure_dir, remove_if_exists, write_file};
use crate::layout::StorageLayout;
use crate::locks::{KeyedLocks, MergeGuard, UploadKey};

/// Staged chunks for one key, ordered by sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChunk {
    pub sequence_id: u64,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct ChunkStore {
    layout: StorageLayout,
    locks: KeyedLocks,
}

impl ChunkStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            locks: KeyedLocks::new(),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    fn key(owner: &str, logical_name: &str) -> AppResult<UploadKey> {
        validate_path_segment("owner", owner)?;
        validate_path_segment("logical name", logical_name)?;
        Ok(UploadKey::new(owner, logical_name))
    }

    /// Stage one chunk, replacing any earlier chunk with the same sequence id.
    #[tracing::instrument(skip(self, payload), fields(size_bytes = payload.len()))]
    pub async fn store_chunk(
        &self,
        owner: &str,
        logical_name: &str,
        sequence_id: u64,
        payload: &[u8],
    ) -> AppResult<PathBuf> {
        let key = Self::key(owner, logical_name)?;
        let _guard = self.locks.lock(&key).await;
        self.write_chunk(&key, sequence_id, payload).await
    }

    /// Like [`ChunkStore::store_chunk`], for a caller already holding the key's merge guard.
    pub async fn store_chunk_guarded(
        &self,
        guard: &MergeGuard,
        sequence_id: u64,
        payload: &[u8],
    ) -> AppResult<PathBuf> {
        self.write_chunk(guard.key(), sequence_id, payload).await
    }

    async fn write_chunk(&self, key: &UploadKey, sequence_id: u64, payload: &[u8]) -> AppResult<PathBuf> {
        ensure_dir(&self.layout.staging_dir(&key.owner, &key.logical_name)).await?;
        let path = self
            .layout
            .chunk_path(&key.owner, &key.logical_name, sequence_id);
        write_file(&path, payload).await?;

        tracing::debug!(path = %path.display(), sequence_id, "Chunk staged");
        Ok(path)
    }

    /// Claim exclusive finalization of an upload.
    ///
    /// While the guard lives, chunk writes for the key wait and any other
    /// `begin_finalize` or `merge_chunks` for it fails with `MergeInProgress`.
    pub async fn begin_finalize(&self, owner: &str, logical_name: &str) -> AppResult<MergeGuard> {
        let key = Self::key(owner, logical_name)?;
        self.locks.begin_merge(&key).await
    }

    /// Staged chunk files for a key in ascending numeric order.
    ///
    /// Files whose stem is not an integer, or whose extension differs from the
    /// chunk extension, are ignored.
    pub async fn staged_chunks(
        &self,
        owner: &str,
        logical_name: &str,
    ) -> AppResult<Vec<StagedChunk>> {
        Self::key(owner, logical_name)?;
        let staging = self.layout.staging_dir(owner, logical_name);
        let mut entries = match fs::read_dir(&staging).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::io(&staging, e)),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::io(&staging, e))?
        {
            let path = entry.path();
            match parse_sequence_id(&path, self.layout.chunk_extension()) {
                Some(sequence_id) => chunks.push(StagedChunk { sequence_id, path }),
                None => {
                    tracing::warn!(path = %path.display(), "Ignoring unexpected file in staging directory");
                }
            }
        }

        chunks.sort_by_key(|chunk| chunk.sequence_id);
        Ok(chunks)
    }

    /// Concatenate every staged chunk for the key into the merged source.
    ///
    /// The output is written to a sibling temporary file and renamed into place,
    /// replacing the result of any earlier merge.
    #[tracing::instrument(skip(self))]
    pub async fn merge_chunks(&self, owner: &str, logical_name: &str) -> AppResult<PathBuf> {
        let guard = self.begin_finalize(owner, logical_name).await?;
        self.merge_guarded(&guard).await
    }

    /// Merge under a guard from [`ChunkStore::begin_finalize`].
    #[tracing::instrument(skip(self, guard), fields(key = %guard.key()))]
    pub async fn merge_guarded(&self, guard: &MergeGuard) -> AppResult<PathBuf> {
        let key = guard.key();
        let (owner, logical_name) = (key.owner.as_str(), key.logical_name.as_str());
        let start = Instant::now();

        let chunks = self.staged_chunks(owner, logical_name).await?;
        if chunks.is_empty() {
            return Err(AppError::NoChunks {
                owner: owner.to_string(),
                logical_name: logical_name.to_string(),
            });
        }
        warn_on_gaps(key, &chunks);

        let merged = self.layout.merged_path(owner, logical_name);
        let partial = partial_path(&merged);

        let total_bytes = match concatenate(&chunks, &partial).await {
            Ok(total) => total,
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&partial).await {
                    tracing::warn!(error = %cleanup, "Failed to remove partial merge output");
                }
                return Err(e);
            }
        };

        fs::rename(&partial, &merged)
            .await
            .map_err(|e| AppError::io(&merged, e))?;

        tracing::info!(
            path = %merged.display(),
            chunk_count = chunks.len(),
            size_bytes = total_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Chunks merged"
        );

        Ok(merged)
    }

    /// Remove the staging directory for a key. A missing directory is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn discard_staging(&self, owner: &str, logical_name: &str) -> AppResult<()> {
        let key = Self::key(owner, logical_name)?;
        let _guard = self.locks.lock(&key).await;
        self.remove_staging(&key).await
    }

    /// Like [`ChunkStore::discard_staging`], under a merge guard.
    pub async fn discard_staging_guarded(&self, guard: &MergeGuard) -> AppResult<()> {
        self.remove_staging(guard.key()).await
    }

    async fn remove_staging(&self, key: &UploadKey) -> AppResult<()> {
        let staging = self.layout.staging_dir(&key.owner, &key.logical_name);
        match fs::remove_dir_all(&staging).await {
            Ok(()) => {
                tracing::debug!(path = %staging.display(), "Staging directory removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::io(&staging, e)),
        }
    }
}

fn parse_sequence_id(path: &Path, chunk_extension: &str) -> Option<u64> {
    let extension = path.extension()?.to_str()?;
    if !extension.eq_ignore_ascii_case(chunk_extension) {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

fn partial_path(merged: &Path) -> PathBuf {
    let mut name = merged.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn warn_on_gaps(key: &UploadKey, chunks: &[StagedChunk]) {
    let first = chunks.first().map(|c| c.sequence_id).unwrap_or(0);
    let gaps = chunks
        .windows(2)
        .filter(|pair| pair[1].sequence_id != pair[0].sequence_id + 1)
        .count();

    if gaps > 0 || first > 1 {
        tracing::warn!(
            key = %key,
            first_sequence_id = first,
            gap_count = gaps,
            chunk_count = chunks.len(),
            "Merging non-contiguous chunk sequence"
        );
    }
}

async fn concatenate(chunks: &[StagedChunk], output: &Path) -> AppResult<u64> {
    let mut file = fs::File::create(output)
        .await
        .map_err(|e| AppError::io(output, e))?;

    let mut total = 0u64;
    for chunk in chunks {
        let mut input = fs::File::open(&chunk.path)
            .await
            .map_err(|e| AppError::io(&chunk.path, e))?;
        total += tokio::io::copy(&mut input, &mut file)
            .await
            .map_err(|e| AppError::io(&chunk.path, e))?;
    }

    file.flush().await.map_err(|e| AppError::io(output, e))?;
    file.sync_all().await.map_err(|e| AppError::io(output, e))?;
    Ok(total)
}
