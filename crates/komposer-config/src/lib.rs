//! Environment/TOML configuration for the komposer workspace.
//!
//! Reads the sandbox roots, size/timeout limits, and extension allow-lists
//! spec'd in §6 ("Environment/config") from the process environment, with an
//! optional `komposer.toml` overlay for values an operator would rather keep
//! in a file than a shell profile.

mod error;
pub mod paths;

pub use error::ConfigError;

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;
const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 300;
const DEFAULT_ANALYSIS_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_OUTPUT_WIDTH: u32 = 1920;
const DEFAULT_OUTPUT_HEIGHT: u32 = 1080;

fn default_allowed_extensions() -> HashMap<String, HashSet<String>> {
    let media = ["mp4", "mov", "mkv", "avi", "webm", "mp3", "wav", "m4a", "aac", "flac", "jpg", "jpeg", "png"]
        .iter()
        .map(|s| s.to_string())
        .collect::<HashSet<_>>();
    let mut map = HashMap::new();
    map.insert("source".to_string(), media.clone());
    map.insert("generated".to_string(), media.clone());
    map.insert("temp".to_string(), media);
    map
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Read-only input roots, searched in order.
    pub source_roots: Vec<PathBuf>,
    /// Root for generated and temp outputs.
    pub temp_root: PathBuf,
    /// Root for probe/scene/speech JSON caches.
    pub metadata_root: PathBuf,
    /// Root for extracted keyframes.
    pub screenshots_root: PathBuf,
    /// Maximum accepted file size in bytes.
    pub max_file_size: u64,
    /// Per-invocation subprocess deadline.
    pub process_timeout: Duration,
    /// Allowed lowercased extensions, keyed by handle class name
    /// (`"source"`, `"generated"`, `"temp"`).
    pub allowed_extensions: HashMap<String, HashSet<String>>,
    /// Time-to-live for analysis cache entries (scene/speech).
    pub analysis_cache_ttl: Duration,
    /// Target output frame width for composition rendering (spec §4.F step
    /// 5's `config.width`). Not one of §6's named environment variables;
    /// supplemented here because the planner's orientation-normalizing
    /// resize step needs a concrete target.
    pub output_width: u32,
    /// Target output frame height (spec §4.F step 5's `config.height`).
    pub output_height: u32,
}

/// TOML overlay shape; every field optional, missing fields keep the
/// environment-derived (or built-in default) value.
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct Overlay {
    source_roots: Option<Vec<PathBuf>>,
    temp_root: Option<PathBuf>,
    metadata_root: Option<PathBuf>,
    screenshots_root: Option<PathBuf>,
    max_file_size: Option<u64>,
    process_timeout_secs: Option<u64>,
    allowed_extensions: Option<HashMap<String, HashSet<String>>>,
    analysis_cache_ttl_secs: Option<u64>,
    output_width: Option<u32>,
    output_height: Option<u32>,
}

impl Config {
    /// Builds configuration from the process environment, falling back to
    /// spec defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let source_roots = match env::var("SOURCE_ROOTS") {
            Ok(v) if !v.trim().is_empty() => {
                env::split_paths(&v).collect::<Vec<_>>()
            }
            _ => vec![paths::default_source_root()],
        };

        let temp_root = env::var("TEMP_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| paths::default_temp_root());
        let metadata_root = env::var("METADATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| paths::default_metadata_root());
        let screenshots_root = env::var("SCREENSHOTS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| paths::default_screenshots_root());

        let max_file_size = parse_env_u64("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let process_timeout_secs = parse_env_u64("PROCESS_TIMEOUT", DEFAULT_PROCESS_TIMEOUT_SECS)?;
        let analysis_cache_ttl_secs =
            parse_env_u64("ANALYSIS_CACHE_TTL", DEFAULT_ANALYSIS_CACHE_TTL_SECS)?;

        let allowed_extensions = match env::var("ALLOWED_EXTENSIONS") {
            Ok(v) if !v.trim().is_empty() => parse_allowed_extensions(&v)?,
            _ => default_allowed_extensions(),
        };

        let output_width = match env::var("OUTPUT_WIDTH") {
            Ok(v) if !v.trim().is_empty() => v
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::invalid_env("OUTPUT_WIDTH", v, e.to_string()))?,
            _ => DEFAULT_OUTPUT_WIDTH,
        };
        let output_height = match env::var("OUTPUT_HEIGHT") {
            Ok(v) if !v.trim().is_empty() => v
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::invalid_env("OUTPUT_HEIGHT", v, e.to_string()))?,
            _ => DEFAULT_OUTPUT_HEIGHT,
        };

        Ok(Config {
            source_roots,
            temp_root,
            metadata_root,
            screenshots_root,
            max_file_size,
            process_timeout: Duration::from_secs(process_timeout_secs),
            allowed_extensions,
            analysis_cache_ttl: Duration::from_secs(analysis_cache_ttl_secs),
            output_width,
            output_height,
        })
    }

    /// Layers a `komposer.toml` overlay file on top of an already-built
    /// config; present fields replace, absent fields are left untouched.
    pub fn with_overlay_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: Overlay = toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(v) = overlay.source_roots {
            self.source_roots = v;
        }
        if let Some(v) = overlay.temp_root {
            self.temp_root = v;
        }
        if let Some(v) = overlay.metadata_root {
            self.metadata_root = v;
        }
        if let Some(v) = overlay.screenshots_root {
            self.screenshots_root = v;
        }
        if let Some(v) = overlay.max_file_size {
            self.max_file_size = v;
        }
        if let Some(v) = overlay.process_timeout_secs {
            self.process_timeout = Duration::from_secs(v);
        }
        if let Some(v) = overlay.allowed_extensions {
            self.allowed_extensions = v;
        }
        if let Some(v) = overlay.analysis_cache_ttl_secs {
            self.analysis_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = overlay.output_width {
            self.output_width = v;
        }
        if let Some(v) = overlay.output_height {
            self.output_height = v;
        }

        if self.source_roots.is_empty() {
            return Err(ConfigError::NoSourceRoots);
        }

        tracing::debug!(roots = ?self.source_roots, "applied config overlay");
        Ok(self)
    }

    /// Allowed extensions for a given handle class name, or an empty set if
    /// the class is unrecognized.
    pub fn allowed_extensions_for(&self, class: &str) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        self.allowed_extensions
            .get(class)
            .unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }
}

fn parse_env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::invalid_env(var, v, e.to_string())),
        _ => Ok(default),
    }
}

fn parse_allowed_extensions(raw: &str) -> Result<HashMap<String, HashSet<String>>, ConfigError> {
    // Shape: "source:mp4,mov;generated:mp4,wav;temp:mp4,wav"
    let mut map = HashMap::new();
    for class_spec in raw.split(';').filter(|s| !s.trim().is_empty()) {
        let (class, list) = class_spec.split_once(':').ok_or_else(|| {
            ConfigError::invalid_env(
                "ALLOWED_EXTENSIONS",
                class_spec,
                "expected 'class:ext,ext' segments separated by ';'",
            )
        })?;
        let exts = list
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        map.insert(class.trim().to_lowercase(), exts);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_class_keyed_extension_list() {
        let map = parse_allowed_extensions("source:mp4,MOV;temp:wav").unwrap();
        assert!(map["source"].contains("mp4"));
        assert!(map["source"].contains("mov"));
        assert!(map["temp"].contains("wav"));
    }

    #[test]
    fn rejects_malformed_extension_spec() {
        assert!(parse_allowed_extensions("garbage").is_err());
    }

    fn base_config() -> Config {
        Config {
            source_roots: vec![PathBuf::from("/tmp/source")],
            temp_root: PathBuf::from("/tmp/temp"),
            metadata_root: PathBuf::from("/tmp/meta"),
            screenshots_root: PathBuf::from("/tmp/shots"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            process_timeout: Duration::from_secs(DEFAULT_PROCESS_TIMEOUT_SECS),
            allowed_extensions: default_allowed_extensions(),
            analysis_cache_ttl: Duration::from_secs(DEFAULT_ANALYSIS_CACHE_TTL_SECS),
            output_width: DEFAULT_OUTPUT_WIDTH,
            output_height: DEFAULT_OUTPUT_HEIGHT,
        }
    }

    #[test]
    fn overlay_rejects_empty_source_roots() {
        let dir = tempfile::tempdir().unwrap();
        let overlay_path = dir.path().join("komposer.toml");
        std::fs::write(&overlay_path, "source_roots = []\n").unwrap();

        assert!(matches!(
            base_config().with_overlay_file(&overlay_path),
            Err(ConfigError::NoSourceRoots)
        ));
    }

    #[test]
    fn overlay_replaces_only_present_fields() {
        let dir = tempfile::tempdir().unwrap();
        let overlay_path = dir.path().join("komposer.toml");
        std::fs::write(&overlay_path, "max_file_size = 1024\n").unwrap();

        let merged = base_config().with_overlay_file(&overlay_path).unwrap();
        assert_eq!(merged.max_file_size, 1024);
        assert_eq!(merged.temp_root, PathBuf::from("/tmp/temp"));
    }
}
