use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use srce_cli::{chunk_plan, init_tracing, open_repository, print_json};
use srce_core::{validation::content_type_for_extension, SrceConfig, VideoId, VideoRecord};
use srce_services::{build_runtime, toolkit_from_config, ChunkReceipt, ChunkUpload, SrceRuntime};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

#[derive(Parser)]
#[command(name = "srce")]
#[command(about = "Upload, transcode and manage videos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a complete video file and wait for it to be transcoded
    Upload {
        #[arg(long)]
        owner: String,
        /// Content type to record (derived from the file extension by default)
        #[arg(long)]
        content_type: Option<String>,
        file: PathBuf,
    },
    /// Upload a video file in numbered chunks, then wait for it to be transcoded
    UploadChunked {
        #[arg(long)]
        owner: String,
        /// Logical upload name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 1024 * 1024)]
        chunk_size: u64,
        file: PathBuf,
    },
    /// List an owner's videos
    List { owner: String },
    /// Show one video record
    Get { id: VideoId },
    /// Delete a video record and its files
    Delete { id: VideoId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = SrceConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    let repository = open_repository(&config).await?;
    let toolkit = toolkit_from_config(&config).context("Failed to set up ffmpeg")?;
    let runtime = build_runtime(&config, repository, toolkit, None);

    let result = run(&runtime, cli.command).await;
    runtime.queue.shutdown().await;
    result
}

async fn run(runtime: &SrceRuntime, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload {
            owner,
            content_type,
            file,
        } => {
            let filename = file_name(&file)?;
            let content_type = content_type
                .unwrap_or_else(|| content_type_for_extension(&extension(&file)).to_string());

            let mut reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Open {}", file.display()))?;
            let record = runtime
                .ingest
                .upload_video_from_reader(&owner, &filename, &content_type, &mut reader)
                .await
                .context("Upload failed")?;

            let record = wait_for_transcode(runtime, record).await?;
            print_json(&record)?;
        }
        Commands::UploadChunked {
            owner,
            name,
            chunk_size,
            file,
        } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .context("File name is not valid UTF-8")?,
            };

            let record = upload_chunked(runtime, &owner, &name, chunk_size, &file).await?;
            let record = wait_for_transcode(runtime, record).await?;
            print_json(&record)?;
        }
        Commands::List { owner } => {
            let records = runtime
                .ingest
                .list_videos(&owner)
                .await
                .context("List videos")?;
            print_json(&records)?;
        }
        Commands::Get { id } => {
            let record = runtime.ingest.get_video(id).await.context("Get video")?;
            print_json(&record)?;
        }
        Commands::Delete { id } => {
            let record = runtime
                .lifecycle
                .delete_video(id)
                .await
                .context("Delete video")?;
            print_json(&record)?;
        }
    }
    Ok(())
}

async fn upload_chunked(
    runtime: &SrceRuntime,
    owner: &str,
    name: &str,
    chunk_size: u64,
    file: &Path,
) -> anyhow::Result<VideoRecord> {
    let mut reader = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Open {}", file.display()))?;
    let total = reader
        .metadata()
        .await
        .with_context(|| format!("Stat {}", file.display()))?
        .len();

    let plan = chunk_plan(total, chunk_size);
    let last_id = plan.len() as u64;

    for (blob_id, _offset, len) in plan {
        let mut buf = vec![0u8; len as usize];
        reader
            .read_exact(&mut buf)
            .await
            .with_context(|| format!("Read chunk {} of {}", blob_id, file.display()))?;

        let receipt = runtime
            .ingest
            .receive_chunk(ChunkUpload {
                owner: owner.to_string(),
                filename: name.to_string(),
                blob_id,
                payload: Bytes::from(buf),
                is_last: blob_id == last_id,
                content_type: None,
            })
            .await
            .with_context(|| format!("Upload chunk {}", blob_id))?;

        match receipt {
            ChunkReceipt::Stored { path } => {
                tracing::debug!(blob_id, path = %path.display(), "Chunk stored");
            }
            ChunkReceipt::Completed { record } => return Ok(record),
        }
    }

    anyhow::bail!("Upload of {} ended without a final chunk", file.display())
}

/// Drain the queue so the transcode finishes, then reload the record.
async fn wait_for_transcode(
    runtime: &SrceRuntime,
    record: VideoRecord,
) -> anyhow::Result<VideoRecord> {
    tracing::info!(video_id = record.id, "Waiting for transcode");
    runtime.queue.shutdown().await;
    runtime
        .ingest
        .get_video(record.id)
        .await
        .context("Reload video record")
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
