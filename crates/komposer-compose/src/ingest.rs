//! Converts the external wire-format komposition document (spec §6: each
//! source's `url` is `file://<basename>`, resolved against the configured
//! source roots) into the internal [`Komposition`] type, whose [`Source`]
//! already carries a resolved [`FileHandle`] rather than a path string.
//!
//! This is the only place a bare filename ever turns into a handle from
//! document content — everywhere else in the workspace, a handle is either
//! minted by [`komposer_registry::Registry::allocate_output`] or looked up
//! by [`komposer_registry::Registry::list_source_files`].

use komposer_core::{BackgroundAudioSpec, BeatPattern, Error, Komposition, MediaType, Segment, Source};
use komposer_registry::Registry;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct WireKomposition {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    bpm: f64,
    beats_per_measure: u32,
    segments: Vec<Segment>,
    sources: Vec<WireSource>,
    #[serde(default)]
    beat_pattern: Option<BeatPattern>,
    #[serde(default)]
    background_audio: Option<BackgroundAudioSpec>,
    #[serde(default)]
    effects_tree: Option<komposer_core::EffectsTree>,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Deserialize)]
struct WireSource {
    source_id: String,
    url: String,
    media_type: MediaType,
}

/// Parses a komposition document's raw JSON and resolves every source's
/// `file://<basename>` url against the registry's source listing, producing
/// a ready-to-plan [`Komposition`].
pub fn parse_and_resolve(json: &str, registry: &mut Registry) -> Result<Komposition, Error> {
    let wire: WireKomposition = serde_json::from_str(json)?;
    let listing = registry.list_source_files()?;

    let mut sources = Vec::with_capacity(wire.sources.len());
    for wire_source in wire.sources {
        let basename = wire_source
            .url
            .strip_prefix("file://")
            .unwrap_or(&wire_source.url);
        let handle = listing
            .iter()
            .find(|f| f.name == basename)
            .map(|f| f.handle)
            .ok_or_else(|| {
                Error::validation(format!(
                    "source '{}': url '{}' does not match any file under a source root",
                    wire_source.source_id, wire_source.url
                ))
            })?;
        sources.push(Source {
            source_id: wire_source.source_id,
            handle,
            media_type: wire_source.media_type,
        });
    }

    Ok(Komposition {
        schema_version: wire.schema_version,
        bpm: wire.bpm,
        beats_per_measure: wire.beats_per_measure,
        segments: wire.segments,
        sources,
        beat_pattern: wire.beat_pattern,
        background_audio: wire.background_audio,
        effects_tree: wire.effects_tree,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use komposer_config::Config;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    fn test_config(source_root: std::path::PathBuf, temp_root: std::path::PathBuf) -> Config {
        let mut allowed = HashMap::new();
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
    fn resolves_file_url_against_source_root() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"fake").unwrap();

        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);

        let doc = serde_json::json!({
            "bpm": 120.0,
            "beats_per_measure": 4,
            "segments": [],
            "sources": [
                {"source_id": "s1", "url": "file://clip.mp4", "media_type": "video"}
            ]
        })
        .to_string();

        let komposition = parse_and_resolve(&doc, &mut registry).unwrap();
        assert_eq!(komposition.sources.len(), 1);
        assert_eq!(komposition.sources[0].source_id, "s1");
    }

    #[test]
    fn rejects_url_with_no_matching_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        let mut registry = Registry::new(config);

        let doc = serde_json::json!({
            "bpm": 120.0,
            "beats_per_measure": 4,
            "segments": [],
            "sources": [
                {"source_id": "s1", "url": "file://missing.mp4", "media_type": "video"}
            ]
        })
        .to_string();

        assert!(parse_and_resolve(&doc, &mut registry).is_err());
    }
}
