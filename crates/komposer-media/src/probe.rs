//! ffprobe invocation and the on-disk sidecar cache over its results (spec
//! §4.B "Probe Cache").

use crate::subprocess::run_with_timeout;
use komposer_core::{Error, MediaInfo, StreamInfo};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Probes `path` with ffprobe, consulting and updating the sidecar cache
/// under `metadata_root/probe/`.
///
/// The cache key is `(path, size, mtime)`: any mismatch with the cached
/// entry forces a fresh probe and overwrites the sidecar (spec §4.B).
pub fn probe(path: &Path, metadata_root: &Path, timeout: Duration) -> Result<MediaInfo, Error> {
    let fs_meta = std::fs::metadata(path)?;
    let size = fs_meta.len();
    let mtime = fs_meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let sidecar_path = sidecar_path_for(path, metadata_root);
    if let Some(cached) = read_sidecar(&sidecar_path) {
        if cached.key.size == size && cached.key.mtime == mtime {
            return Ok(cached.info);
        }
    }

    let info = run_ffprobe(path, timeout)?;
    write_sidecar(&sidecar_path, &CacheEntry {
        key: CacheKey { size, mtime },
        info: info.clone(),
    });
    Ok(info)
}

fn sidecar_path_for(path: &Path, metadata_root: &Path) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    metadata_root.join("probe").join(format!("{digest}.json"))
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CacheKey {
    size: u64,
    mtime: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CacheEntry {
    key: CacheKey,
    info: MediaInfo,
}

fn read_sidecar(path: &Path) -> Option<CacheEntry> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_sidecar(path: &Path, entry: &CacheEntry) {
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    if let Ok(serialized) = serde_json::to_string(entry) {
        if let Err(e) = std::fs::write(path, serialized) {
            tracing::warn!(error = %e, path = %path.display(), "failed to write probe cache sidecar");
        }
    }
}

fn run_ffprobe(path: &Path, timeout: Duration) -> Result<MediaInfo, Error> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().into_owned(),
    ];

    let output = run_with_timeout("ffprobe", &args, timeout)?;
    if output.timed_out {
        return Err(Error::Timeout {
            operation: "probe".to_string(),
            elapsed_secs: timeout.as_secs(),
        });
    }
    if !output.success() {
        return Err(Error::Probe {
            path: path.to_path_buf(),
            reason: output.stderr_tail(4096),
        });
    }

    let raw: RawProbe = serde_json::from_slice(&output.stdout).map_err(|e| Error::Probe {
        path: path.to_path_buf(),
        reason: format!("malformed ffprobe JSON: {e}"),
    })?;

    let duration: f64 = raw
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Probe {
            path: path.to_path_buf(),
            reason: "ffprobe output has no parseable duration".to_string(),
        })?;

    let streams = raw
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            codec_type: s.codec_type,
            codec_name: s.codec_name,
            width: s.width,
            height: s.height,
            framerate: s.r_frame_rate.as_deref().and_then(parse_rational),
            sample_rate: s.sample_rate.as_deref().and_then(|s| s.parse().ok()),
            channels: s.channels,
        })
        .collect::<Vec<_>>();

    if streams.iter().any(StreamInfo::is_video)
        && streams
            .iter()
            .filter(StreamInfo::is_video)
            .any(|s| s.framerate.is_none())
    {
        return Err(Error::Probe {
            path: path.to_path_buf(),
            reason: "probed video stream missing framerate".to_string(),
        });
    }

    Ok(MediaInfo {
        format: raw.format.format_name,
        duration,
        streams,
        cached_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    })
}

/// Parses ffprobe's `"30/1"`-shaped rational framerate strings.
fn parse_rational(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    format: RawFormat,
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_name: String,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    sample_rate: Option<String>,
    channels: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_framerate() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert_eq!(parse_rational("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("garbage"), None);
    }

    #[test]
    fn cache_round_trips_through_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        let media_path = dir.path().join("clip.mp4");
        std::fs::write(&media_path, b"not real media").unwrap();

        let sidecar = sidecar_path_for(&media_path, dir.path());
        let info = MediaInfo {
            format: "mov,mp4,m4a".to_string(),
            duration: 12.5,
            streams: vec![],
            cached_at: 1000,
        };
        let fs_meta = std::fs::metadata(&media_path).unwrap();
        let entry = CacheEntry {
            key: CacheKey {
                size: fs_meta.len(),
                mtime: fs_meta
                    .modified()
                    .unwrap()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs(),
            },
            info: info.clone(),
        };
        write_sidecar(&sidecar, &entry);

        let read_back = read_sidecar(&sidecar).unwrap();
        assert_eq!(read_back.info, info);
    }
}
