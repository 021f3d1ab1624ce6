//! Content-addressed analysis cache (spec §3 "AnalysisCache").
//!
//! Keyed by `(path, size, mtime)`, written through to an on-disk sidecar
//! next to the path-hash scheme `komposer-media::probe` already uses, so a
//! re-run of `analyze_video_content`/`detect_speech_segments` on an
//! unchanged file is a cache hit without any explicit invalidation call.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
struct CacheKey {
    size: u64,
    mtime: u64,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
struct CacheEntry<T> {
    key: CacheKey,
    cached_at: u64,
    value: T,
}

/// Reads a cached value for `path` under `<metadata_root>/<kind>/`, if the
/// on-disk `(size, mtime)` key still matches and the entry is within the
/// soft TTL. A TTL miss is not treated as a hard invalidation by itself —
/// callers that force a refresh pass `force = true` instead — but a key
/// mismatch always forces a fresh analysis.
pub fn read<T: DeserializeOwned>(
    path: &Path,
    metadata_root: &Path,
    kind: &str,
    ttl: Duration,
    force: bool,
) -> Option<T> {
    if force {
        return None;
    }
    let sidecar = sidecar_path(path, metadata_root, kind);
    let contents = std::fs::read_to_string(&sidecar).ok()?;
    let entry: CacheEntry<T> = serde_json::from_str(&contents).ok()?;

    let fs_meta = std::fs::metadata(path).ok()?;
    let current_key = CacheKey {
        size: fs_meta.len(),
        mtime: mtime_secs(&fs_meta),
    };
    if current_key != entry.key {
        return None;
    }

    let now = now_secs();
    if now.saturating_sub(entry.cached_at) > ttl.as_secs() {
        return None;
    }
    Some(entry.value)
}

/// Writes `value` to the sidecar cache for `path`, overwriting any prior
/// entry for this `(path, kind)` pair regardless of its key — the new write
/// always wins (spec §5 "last-writer-wins on (path, mtime, size)").
pub fn write<T: Serialize>(path: &Path, metadata_root: &Path, kind: &str, value: &T) {
    let Ok(fs_meta) = std::fs::metadata(path) else {
        return;
    };
    let entry = CacheEntry {
        key: CacheKey {
            size: fs_meta.len(),
            mtime: mtime_secs(&fs_meta),
        },
        cached_at: now_secs(),
        value,
    };
    let sidecar = sidecar_path(path, metadata_root, kind);
    if let Some(parent) = sidecar.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    if let Ok(serialized) = serde_json::to_string(&entry) {
        if let Err(e) = std::fs::write(&sidecar, serialized) {
            tracing::warn!(error = %e, kind, path = %path.display(), "failed to write analysis cache sidecar");
        }
    }
}

fn sidecar_path(path: &Path, metadata_root: &Path, kind: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    metadata_root.join(kind).join(format!("{digest}.json"))
}

fn mtime_secs(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_value_for_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let media_path = dir.path().join("clip.mp4");
        std::fs::write(&media_path, b"fake media bytes").unwrap();

        write(&media_path, dir.path(), "scene", &vec![1, 2, 3]);
        let read_back: Option<Vec<i32>> = read(
            &media_path,
            dir.path(),
            "scene",
            Duration::from_secs(300),
            false,
        );
        assert_eq!(read_back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn force_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let media_path = dir.path().join("clip.mp4");
        std::fs::write(&media_path, b"fake media bytes").unwrap();

        write(&media_path, dir.path(), "scene", &vec![1]);
        let read_back: Option<Vec<i32>> =
            read(&media_path, dir.path(), "scene", Duration::from_secs(300), true);
        assert_eq!(read_back, None);
    }

    #[test]
    fn mtime_mismatch_invalidates_entry() {
        let dir = tempfile::tempdir().unwrap();
        let media_path = dir.path().join("clip.mp4");
        std::fs::write(&media_path, b"version one").unwrap();
        write(&media_path, dir.path(), "scene", &vec![9]);

        std::thread::sleep(Duration::from_millis(10));
        std::fs::write(&media_path, b"version two, different length").unwrap();

        let read_back: Option<Vec<i32>> = read(
            &media_path,
            dir.path(),
            "scene",
            Duration::from_secs(300),
            false,
        );
        assert_eq!(read_back, None);
    }
}
