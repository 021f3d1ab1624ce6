//! `analyze_video_content`, `get_video_insights`, `get_scene_screenshots`,
//! `detect_speech_segments` (spec §6).

use super::common::respond;
use clap::Args;
use komposer_analysis::{ContentAnalyzer, SpeechAnalyzer};
use komposer_config::Config;
use komposer_core::{Error, FileHandle, SceneInsights};
use komposer_registry::Registry;
use serde_json::json;
use std::str::FromStr;

/// Detect scenes and derive highlight/suggestion insights for a video.
#[derive(Args)]
pub struct AnalyzeVideoContentArgs {
    /// Handle of the video to analyze.
    pub id: String,
    /// Re-run detection even if a fresh cache entry exists.
    #[arg(long)]
    pub force: bool,
}

/// Return cached highlight/suggestion insights for a video.
#[derive(Args)]
pub struct VideoInsightsArgs {
    pub id: String,
}

/// Extract (or return cached) representative screenshots per scene.
#[derive(Args)]
pub struct SceneScreenshotsArgs {
    pub id: String,
}

/// Detect speech segments and total speech duration for a source.
#[derive(Args)]
pub struct DetectSpeechSegmentsArgs {
    pub id: String,
    #[arg(long)]
    pub force: bool,
}

fn resolve(config: &Config, id: &str) -> Result<std::path::PathBuf, Error> {
    let mut registry = Registry::new(config.clone());
    registry.list_source_files()?;
    registry.list_generated_files()?;
    let handle = FileHandle::from_str(id)
        .map_err(|_| Error::validation(format!("'{id}' is not a valid file handle")))?;
    Ok(registry.resolve(handle)?)
}

fn content_analyzer(config: &Config) -> ContentAnalyzer {
    ContentAnalyzer::new(
        config.metadata_root.clone(),
        config.screenshots_root.clone(),
        config.analysis_cache_ttl,
        config.process_timeout,
    )
}

fn speech_analyzer(config: &Config) -> SpeechAnalyzer {
    SpeechAnalyzer::new(
        config.metadata_root.clone(),
        config.analysis_cache_ttl,
        config.process_timeout,
    )
}

/// `analyze_video_content(id, force) → { scenes, highlights, suggestions }`.
pub fn analyze_video_content(config: &Config, args: AnalyzeVideoContentArgs) {
    respond(analyze_video_content_inner(config, &args));
}

fn analyze_video_content_inner(
    config: &Config,
    args: &AnalyzeVideoContentArgs,
) -> Result<serde_json::Value, Error> {
    let path = resolve(config, &args.id)?;
    let analysis = content_analyzer(config).analyze(&path, args.force)?;
    Ok(json!({
        "scenes": analysis.scenes,
        "highlights": analysis.highlights,
        "suggestions": analysis.suggestions,
    }))
}

/// `get_video_insights(id) → { scene_insights, speech_insights }`.
///
/// Both the scene-derived and speech-derived insight sets are returned
/// together since neither alone matches spec §4.E's `{highlights,
/// suggestions}` shape without the other's scenes/segments on hand.
pub fn video_insights(config: &Config, args: VideoInsightsArgs) {
    respond(video_insights_inner(config, &args));
}

fn video_insights_inner(config: &Config, args: &VideoInsightsArgs) -> Result<serde_json::Value, Error> {
    let path = resolve(config, &args.id)?;
    let analysis = content_analyzer(config).analyze(&path, false)?;
    let scene_insights = SceneInsights::from_scenes(&analysis.scenes);

    let info = komposer_media::probe(&path, &config.metadata_root, config.process_timeout)?;
    let speech_segments = speech_analyzer(config).detect_speech(&path, false)?;
    let speech_insights = komposer_analysis::speech_insights(&speech_segments, info.duration);

    Ok(json!({
        "highlights": analysis.highlights,
        "suggestions": analysis.suggestions,
        "scene_insights": scene_insights,
        "speech_insights": speech_insights,
    }))
}

/// `get_scene_screenshots(id) → { screenshots: [{scene_id, start, end, screenshot_url}] }`.
pub fn scene_screenshots(config: &Config, args: SceneScreenshotsArgs) {
    respond(scene_screenshots_inner(config, &args));
}

fn scene_screenshots_inner(
    config: &Config,
    args: &SceneScreenshotsArgs,
) -> Result<serde_json::Value, Error> {
    let path = resolve(config, &args.id)?;
    let scenes = content_analyzer(config).scene_screenshots(&path)?;
    let screenshots: Vec<serde_json::Value> = scenes
        .iter()
        .map(|scene| {
            json!({
                "scene_id": scene.scene_id,
                "start": scene.start,
                "end": scene.end,
                "screenshot_url": scene.screenshot.as_ref().map(|p| p.to_string_lossy().into_owned()),
            })
        })
        .collect();
    Ok(json!({ "screenshots": screenshots }))
}

/// `detect_speech_segments(id, force) → { speech_segments, total_speech_duration }`.
pub fn detect_speech_segments(config: &Config, args: DetectSpeechSegmentsArgs) {
    respond(detect_speech_segments_inner(config, &args));
}

fn detect_speech_segments_inner(
    config: &Config,
    args: &DetectSpeechSegmentsArgs,
) -> Result<serde_json::Value, Error> {
    let path = resolve(config, &args.id)?;
    let segments = speech_analyzer(config).detect_speech(&path, args.force)?;
    let total: f64 = segments.iter().map(komposer_core::SpeechSegment::duration).sum();
    Ok(json!({
        "speech_segments": segments,
        "total_speech_duration": total,
    }))
}
