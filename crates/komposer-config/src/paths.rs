//! Fallback filesystem locations used when an environment variable is unset.
//!
//! The four configured roots (`SOURCE_ROOTS`, `TEMP_ROOT`, `METADATA_ROOT`,
//! `SCREENSHOTS_ROOT`) are normally set explicitly by the deployment; these
//! fall back to platform-appropriate cache directories so the service still
//! starts in a bare environment (e.g. running the test suite).

use std::path::PathBuf;

const APP_NAME: &str = "komposer";

/// Base cache directory: `~/.cache/komposer/` on Linux, the platform
/// equivalent elsewhere.
pub fn cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Fallback source root: `<cache_root>/source`.
pub fn default_source_root() -> PathBuf {
    cache_root().join("source")
}

/// Fallback temp root: `<cache_root>/temp`.
pub fn default_temp_root() -> PathBuf {
    cache_root().join("temp")
}

/// Fallback metadata root: `<cache_root>/metadata`.
pub fn default_metadata_root() -> PathBuf {
    cache_root().join("metadata")
}

/// Fallback screenshots root: `<cache_root>/screenshots`.
pub fn default_screenshots_root() -> PathBuf {
    cache_root().join("screenshots")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_roots_nest_under_cache_root() {
        assert!(default_source_root().starts_with(cache_root()));
        assert!(default_temp_root().starts_with(cache_root()));
        assert!(default_metadata_root().starts_with(cache_root()));
        assert!(default_screenshots_root().starts_with(cache_root()));
    }
}
