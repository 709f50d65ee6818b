//! Fixed values of the ingest and transcode pipeline.

use std::time::Duration;

/// Marker ffmpeg prints when it cannot demux or decode its input.
pub const INVALID_DATA_MARKER: &str = "Invalid data found when processing input";

/// Constant rate factor used for compression. Lower is better quality, larger output.
pub const DEFAULT_TRANSCODE_CRF: u8 = 28;

/// Highest CRF accepted by libx264.
pub const MAX_TRANSCODE_CRF: u8 = 51;

/// Codec used for compressed artifacts.
pub const TRANSCODE_VIDEO_CODEC: &str = "libx264";

/// Offset into the compressed stream at which the thumbnail frame is grabbed.
pub const DEFAULT_THUMBNAIL_OFFSET: Duration = Duration::from_secs(2);

/// Extension shared by every staged chunk and merged chunked upload.
pub const DEFAULT_CHUNK_EXTENSION: &str = "mkv";

pub const COMPRESSED_PREFIX: &str = "compressed_";
pub const COMPRESSED_EXTENSION: &str = "mp4";
pub const THUMBNAIL_PREFIX: &str = "thumbnail_";
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Timestamp layout embedded in single-shot upload filenames.
pub const UPLOAD_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Content type stored when nothing better is known.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
