//! Handle Registry: translates opaque [`FileHandle`]s to sandboxed
//! filesystem paths without ever exposing paths in the public operation
//! surface (spec §4.A).
//!
//! Registrations live in process memory only — there is no on-disk registry
//! file — but the same path always resolves to the same handle within one
//! process, via the `by_path` index.

use komposer_config::Config;
use komposer_core::{FileHandle, HandleClass, SandboxError};
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// A registered file's bookkeeping entry.
#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    class: HandleClass,
}

/// Summary of one registered/listed file, as returned by `list_*`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FileListing {
    /// The handle assigned to this file.
    pub handle: FileHandle,
    /// File name only (no directory components).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Lowercased extension, without the leading dot.
    pub extension: String,
}

/// The in-memory translation layer between [`FileHandle`]s and paths.
pub struct Registry {
    config: Config,
    by_handle: HashMap<FileHandle, Entry>,
    by_path: HashMap<PathBuf, FileHandle>,
}

impl Registry {
    /// Builds an empty registry over the given configuration.
    pub fn new(config: Config) -> Self {
        Registry {
            config,
            by_handle: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Scans the configured source roots and returns a listing for every
    /// allow-listed, within-size file found, registering a handle for each
    /// (or reusing one already assigned to that path).
    pub fn list_source_files(&mut self) -> std::io::Result<Vec<FileListing>> {
        let roots = self.config.source_roots.clone();
        self.list_roots(&roots, HandleClass::Source)
    }

    /// Scans the configured temp root and returns a listing of generated and
    /// temp files, registering handles as needed.
    pub fn list_generated_files(&mut self) -> std::io::Result<Vec<FileListing>> {
        let root = self.config.temp_root.clone();
        self.list_roots(&[root], HandleClass::Generated)
    }

    fn list_roots(
        &mut self,
        roots: &[PathBuf],
        class: HandleClass,
    ) -> std::io::Result<Vec<FileListing>> {
        let mut out = Vec::new();
        for root in roots {
            if !root.exists() {
                continue;
            }
            for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let Some(ext) = extension_of(path) else {
                    continue;
                };
                let class_key = class_key(class);
                if !self
                    .config
                    .allowed_extensions_for(class_key)
                    .contains(&ext)
                {
                    continue;
                }
                let metadata = entry.metadata()?;
                if metadata.len() > self.config.max_file_size {
                    continue;
                }
                let handle = self.register(path, class);
                out.push(FileListing {
                    handle,
                    name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    size: metadata.len(),
                    extension: ext,
                });
            }
        }
        Ok(out)
    }

    /// Registers `path` under `class`, returning its existing handle if one
    /// was already assigned, or allocating a fresh one otherwise.
    fn register(&mut self, path: &Path, class: HandleClass) -> FileHandle {
        let canonical = path.to_path_buf();
        if let Some(existing) = self.by_path.get(&canonical) {
            return *existing;
        }
        let handle = self.fresh_handle();
        self.by_path.insert(canonical.clone(), handle);
        self.by_handle.insert(
            handle,
            Entry {
                path: canonical,
                class,
            },
        );
        tracing::debug!(%handle, path = %path.display(), ?class, "registered file handle");
        handle
    }

    fn fresh_handle(&self) -> FileHandle {
        let mut rng = rand::rng();
        loop {
            let token: u32 = rng.random();
            let candidate = FileHandle::from_raw(token);
            if !self.by_handle.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Resolves a handle to a path, re-checking root-containment, existence,
    /// and size on every call — handles are not a cache of validity, only of
    /// identity (spec §3 "Invariants").
    pub fn resolve(&self, handle: FileHandle) -> Result<PathBuf, SandboxError> {
        let entry = self.by_handle.get(&handle).ok_or(SandboxError::NotFound)?;

        if !self.is_within_allowed_roots(&entry.path) {
            return Err(SandboxError::OutOfSandbox);
        }

        let metadata = std::fs::metadata(&entry.path).map_err(|_| SandboxError::Vanished)?;
        if metadata.len() > self.config.max_file_size {
            return Err(SandboxError::TooLarge {
                actual: metadata.len(),
                limit: self.config.max_file_size,
            });
        }

        let ext = extension_of(&entry.path).unwrap_or_default();
        if !self
            .config
            .allowed_extensions_for(class_key(entry.class))
            .contains(&ext)
        {
            return Err(SandboxError::ExtensionNotAllowed(ext));
        }

        Ok(entry.path.clone())
    }

    fn is_within_allowed_roots(&self, path: &Path) -> bool {
        let roots = self
            .config
            .source_roots
            .iter()
            .chain(std::iter::once(&self.config.temp_root))
            .chain(std::iter::once(&self.config.metadata_root))
            .chain(std::iter::once(&self.config.screenshots_root));
        roots.into_iter().any(|root| path.starts_with(root))
    }

    /// Allocates a fresh output path under the temp root with the given
    /// extension, registers it under `class` immediately, and returns its
    /// handle and path.
    pub fn allocate_output(
        &mut self,
        extension: &str,
        class: HandleClass,
    ) -> (FileHandle, PathBuf) {
        let ext = extension.trim_start_matches('.').to_lowercase();
        loop {
            let mut rng = rand::rng();
            let token: u32 = rng.random();
            let filename = format!("komposer_{token:08x}.{ext}");
            let path = self.config.temp_root.join(filename);
            if self.by_path.contains_key(&path) {
                continue;
            }
            let handle = self.register(&path, class);
            return (handle, path);
        }
    }

    /// Removes temp-class files older than `older_than` (default: all temp
    /// files) from both disk and the registry, returning the count removed.
    pub fn cleanup_temp(&mut self, older_than: Option<Duration>) -> std::io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0usize;
        let stale: Vec<FileHandle> = self
            .by_handle
            .iter()
            .filter(|(_, entry)| entry.class == HandleClass::Temp)
            .filter(|(_, entry)| match older_than {
                None => true,
                Some(threshold) => std::fs::metadata(&entry.path)
                    .and_then(|m| m.modified())
                    .map(|mtime| {
                        now.duration_since(mtime).unwrap_or(Duration::ZERO) >= threshold
                    })
                    .unwrap_or(true),
            })
            .map(|(handle, _)| *handle)
            .collect();

        for handle in stale {
            if let Some(entry) = self.by_handle.remove(&handle) {
                self.by_path.remove(&entry.path);
                if entry.path.exists() {
                    std::fs::remove_file(&entry.path)?;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn class_key(class: HandleClass) -> &'static str {
    match class {
        HandleClass::Source => "source",
        HandleClass::Generated => "generated",
        HandleClass::Temp => "temp",
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap as StdHashMap, HashSet};
    use std::time::Duration;

    fn test_config(source_root: PathBuf, temp_root: PathBuf) -> Config {
        let mut allowed = StdHashMap::new();
        let exts: HashSet<String> = ["mp4", "wav"].iter().map(|s| s.to_string()).collect();
        allowed.insert("source".to_string(), exts.clone());
        allowed.insert("generated".to_string(), exts.clone());
        allowed.insert("temp".to_string(), exts);

        Config {
            source_roots: vec![source_root],
            temp_root: temp_root.clone(),
            metadata_root: temp_root.join("metadata"),
            screenshots_root: temp_root.join("screenshots"),
            max_file_size: 1024 * 1024,
            process_timeout: Duration::from_secs(300),
            allowed_extensions: allowed,
            analysis_cache_ttl: Duration::from_secs(300),
            output_width: 1920,
            output_height: 1080,
        }
    }

    #[test]
    fn same_path_yields_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("clip.mp4");
        std::fs::write(&file_path, b"fake media").unwrap();

        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);

        let first = registry.list_source_files().unwrap();
        let second = registry.list_source_files().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].handle, second[0].handle);
    }

    #[test]
    fn resolve_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("clip.mp4");
        std::fs::write(&file_path, vec![0u8; 10]).unwrap();

        let mut config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        config.max_file_size = 1;
        let mut registry = Registry::new(config);

        let listing = registry.list_source_files().unwrap();
        assert!(listing.is_empty(), "oversized file should not even list");
    }

    #[test]
    fn exact_max_size_accepted_one_byte_over_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();

        let at_limit = dir.path().join("at_limit.mp4");
        std::fs::write(&at_limit, vec![0u8; 100]).unwrap();
        let mut config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        config.max_file_size = 100;
        let mut registry = Registry::new(config.clone());
        let handle = registry.register(&at_limit, HandleClass::Source);
        assert!(registry.resolve(handle).is_ok());

        let over_limit = dir.path().join("over_limit.mp4");
        std::fs::write(&over_limit, vec![0u8; 101]).unwrap();
        let mut registry = Registry::new(config);
        let handle = registry.register(&over_limit, HandleClass::Source);
        assert!(matches!(
            registry.resolve(handle),
            Err(SandboxError::TooLarge { .. })
        ));
    }

    #[test]
    fn resolve_rejects_path_outside_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let outside_file = outside_dir.path().join("escaped.mp4");
        std::fs::write(&outside_file, b"x").unwrap();

        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);
        let handle = registry.register(&outside_file, HandleClass::Source);

        assert_eq!(registry.resolve(handle), Err(SandboxError::OutOfSandbox));
    }

    #[test]
    fn resolve_reports_vanished_for_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let media_path = dir.path().join("clip.mp4");
        std::fs::write(&media_path, b"x").unwrap();

        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);
        let handle = registry.register(&media_path, HandleClass::Source);
        std::fs::remove_file(&media_path).unwrap();

        assert_eq!(registry.resolve(handle), Err(SandboxError::Vanished));
    }

    #[test]
    fn resolve_reports_not_found_for_unregistered_handle() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let registry = Registry::new(config);

        assert_eq!(
            registry.resolve(FileHandle::from_raw(0xDEADBEEF)),
            Err(SandboxError::NotFound)
        );
    }

    #[test]
    fn allocate_output_creates_unique_path_under_temp_root() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);

        let (handle_a, path_a) = registry.allocate_output("mp4", HandleClass::Generated);
        let (handle_b, path_b) = registry.allocate_output("mp4", HandleClass::Temp);

        assert_ne!(handle_a, handle_b);
        assert_ne!(path_a, path_b);
        assert!(path_a.starts_with(temp_dir.path()));
    }

    #[test]
    fn cleanup_temp_removes_only_temp_class() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);

        let (_gen_handle, gen_path) = registry.allocate_output("mp4", HandleClass::Generated);
        let (_temp_handle, temp_path) = registry.allocate_output("mp4", HandleClass::Temp);
        std::fs::write(&gen_path, b"keep").unwrap();
        std::fs::write(&temp_path, b"drop").unwrap();

        let removed = registry.cleanup_temp(None).unwrap();
        assert_eq!(removed, 1);
        assert!(gen_path.exists());
        assert!(!temp_path.exists());
    }

    #[test]
    fn cleanup_temp_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);

        let (_handle, temp_path) = registry.allocate_output("mp4", HandleClass::Temp);
        std::fs::write(&temp_path, b"drop").unwrap();

        let first = registry.cleanup_temp(None).unwrap();
        let second = registry.cleanup_temp(None).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }
}
