//! Small filesystem helpers with path-carrying errors

use srce_core::{AppError, AppResult};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Create `dir` and its parents. An existing directory is not an error.
pub async fn ensure_dir(dir: &Path) -> AppResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::io(dir, e))
}

async fn ensure_parent_dir(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent).await?;
        }
    }
    Ok(())
}

/// Write `data` to `path`, replacing any existing file.
pub async fn write_file(path: &Path, data: &[u8]) -> AppResult<()> {
    ensure_parent_dir(path).await?;

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| AppError::io(path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| AppError::io(path, e))?;
    file.sync_all().await.map_err(|e| AppError::io(path, e))?;

    Ok(())
}

/// Copy `reader` to `path` until EOF, replacing any existing file.
pub async fn write_stream<R>(path: &Path, reader: &mut R) -> AppResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    ensure_parent_dir(path).await?;

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| AppError::io(path, e))?;
    let bytes_copied = tokio::io::copy(reader, &mut file)
        .await
        .map_err(|e| AppError::io(path, e))?;
    file.sync_all().await.map_err(|e| AppError::io(path, e))?;

    Ok(bytes_copied)
}

/// Remove a file, treating "already gone" as success. Returns whether a file was removed.
pub async fn remove_if_exists(path: &Path) -> AppResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_file_creates_parents_and_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c.bin");

        write_file(&path, b"first").await.unwrap();
        write_file(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_write_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.mp4");
        let mut reader: &[u8] = b"streamed bytes";

        let copied = write_stream(&path, &mut reader).await.unwrap();

        assert_eq!(copied, 14);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"streamed bytes");
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.mkv");
        write_file(&path, b"x").await.unwrap();

        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
    }
}
