//! Content Analyzer: scene segmentation, representative screenshots, and
//! highlight scoring (spec §4.D).

use crate::backend::{try_scene_backends, SceneBackend};
use crate::{cache, scene_backends};
use komposer_core::{Error, SceneRecord};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level result of [`ContentAnalyzer::analyze`].
#[derive(Debug, Clone)]
pub struct ContentAnalysis {
    /// Every detected scene, in timeline order, covering `[0, duration)`.
    pub scenes: Vec<SceneRecord>,
    /// The highest-scoring scenes, duration-diversity-penalized, used as
    /// smart-trim/highlight suggestions.
    pub highlights: Vec<SceneRecord>,
    /// Human-readable suggestions derived from the scene set.
    pub suggestions: Vec<String>,
}

/// Produces [`SceneRecord`]s and highlight scoring for a video path, backed
/// by an ordered list of [`SceneBackend`]s and the shared analysis cache.
pub struct ContentAnalyzer {
    backends: Vec<Box<dyn SceneBackend>>,
    metadata_root: PathBuf,
    screenshots_root: PathBuf,
    cache_ttl: Duration,
    process_timeout: Duration,
}

impl ContentAnalyzer {
    /// Builds an analyzer with the default primary/fallback ffmpeg-filter
    /// backend pair (spec §4.E pluggability language applies equally here).
    pub fn new(
        metadata_root: PathBuf,
        screenshots_root: PathBuf,
        cache_ttl: Duration,
        process_timeout: Duration,
    ) -> Self {
        ContentAnalyzer {
            backends: vec![
                Box::new(scene_backends::PrimarySceneDetectBackend),
                Box::new(scene_backends::FallbackSceneDetectBackend),
            ],
            metadata_root,
            screenshots_root,
            cache_ttl,
            process_timeout,
        }
    }

    /// Detects scenes and highlight/suggestion insights for `path`,
    /// consulting the cache unless `force` is set.
    pub fn analyze(&self, path: &Path, force: bool) -> Result<ContentAnalysis, Error> {
        let scenes: Vec<SceneRecord> =
            match cache::read(path, &self.metadata_root, "scene", self.cache_ttl, force) {
                Some(cached) => cached,
                None => {
                    let fresh = self.detect_scenes(path)?;
                    cache::write(path, &self.metadata_root, "scene", &fresh);
                    fresh
                }
            };

        let highlights = select_highlights(&scenes, 5);
        let suggestions = komposer_core::SceneInsights::from_scenes(&scenes)
            .map(|insights| insights.suggestions)
            .unwrap_or_default();

        Ok(ContentAnalysis {
            scenes,
            highlights,
            suggestions,
        })
    }

    /// Returns the analyzer's scenes with `screenshot` populated, extracting
    /// a representative frame near each scene's midpoint if one is not
    /// already present on disk.
    pub fn scene_screenshots(&self, path: &Path) -> Result<Vec<SceneRecord>, Error> {
        let analysis = self.analyze(path, false)?;
        let mut out = Vec::with_capacity(analysis.scenes.len());
        for mut scene in analysis.scenes {
            if scene.screenshot.is_none() {
                scene.screenshot = self.extract_screenshot(path, &scene).ok();
            }
            out.push(scene);
        }
        Ok(out)
    }

    fn detect_scenes(&self, path: &Path) -> Result<Vec<SceneRecord>, Error> {
        let info = komposer_media::probe(path, &self.metadata_root, self.process_timeout)?;
        let (mut boundaries, _backend) =
            try_scene_backends(&self.backends, path, self.process_timeout)?;
        boundaries.retain(|b| *b > 0.0 && *b < info.duration);
        boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap());
        boundaries.dedup_by(|a, b| (*a - *b).abs() < 0.05);

        let mut bounds = vec![0.0];
        bounds.extend(boundaries);
        bounds.push(info.duration);

        let scenes: Vec<SceneRecord> = bounds
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let (start, end) = (w[0], w[1]);
                let mid = (start + end) / 2.0;
                let luminance = scene_backends::mean_luminance_at(path, mid, self.process_timeout);
                let edge_density = scene_backends::edge_density_at(path, mid, self.process_timeout);
                SceneRecord {
                    scene_id: format!("scene_{i}"),
                    start,
                    end,
                    score: content_score(end - start, luminance, edge_density),
                    characteristics: characteristics(end - start, luminance, edge_density),
                    screenshot: None,
                }
            })
            .collect();

        Ok(scenes)
    }

    fn extract_screenshot(&self, path: &Path, scene: &SceneRecord) -> Result<PathBuf, Error> {
        let mid = (scene.start + scene.end) / 2.0;
        std::fs::create_dir_all(&self.screenshots_root)?;
        let filename = format!(
            "{}_{:06}.jpg",
            stem(path),
            (scene.start * 1000.0).round() as i64
        );
        let out_path = self.screenshots_root.join(filename);
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{mid}"),
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
            "-frames:v".to_string(),
            "1".to_string(),
            out_path.to_string_lossy().into_owned(),
        ];
        let output = komposer_media::run_with_timeout("ffmpeg", &args, self.process_timeout)?;
        if output.timed_out {
            return Err(Error::Timeout {
                operation: "scene_screenshot".to_string(),
                elapsed_secs: self.process_timeout.as_secs(),
            });
        }
        if !output.success() {
            return Err(Error::ToolFailure {
                operation: "scene_screenshot".to_string(),
                exit_code: output.exit_code,
                stderr_tail: output.stderr_tail(4096),
            });
        }
        Ok(out_path)
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string())
}

/// Combines spec §4.D's three implementable signals (face/eye presence is
/// omitted — no detector is wired; see module docs) into `[0, 1]`:
/// duration closeness to `[3s, 8s]`, luminance (penalizing under/over
/// exposure), and edge-density (visual detail).
fn content_score(duration: f64, luminance: Option<f64>, edge_density: Option<f64>) -> f64 {
    let duration_score = if (3.0..=8.0).contains(&duration) {
        1.0
    } else if duration < 3.0 {
        (duration / 3.0).clamp(0.0, 1.0)
    } else {
        (8.0 / duration).clamp(0.0, 1.0)
    };

    let luminance_score = luminance.map_or(0.5, |y| {
        1.0 - ((y - 128.0).abs() / 128.0).clamp(0.0, 1.0)
    });

    let edge_score = edge_density.map_or(0.5, |y| (y / 255.0).clamp(0.0, 1.0));

    (duration_score * 0.4 + luminance_score * 0.3 + edge_score * 0.3).clamp(0.0, 1.0)
}

/// Human-readable tags summarizing the same signals `content_score` scores
/// numerically (spec §3 "SceneRecord" `characteristics`).
fn characteristics(duration: f64, luminance: Option<f64>, edge_density: Option<f64>) -> Vec<String> {
    let mut tags = Vec::new();

    if (3.0..=8.0).contains(&duration) {
        tags.push("ideal_length".to_string());
    } else if duration < 3.0 {
        tags.push("short".to_string());
    } else {
        tags.push("long".to_string());
    }

    match luminance {
        Some(y) if y < 64.0 => tags.push("under_exposed".to_string()),
        Some(y) if y > 192.0 => tags.push("over_exposed".to_string()),
        Some(_) => tags.push("well_exposed".to_string()),
        None => {}
    }

    match edge_density {
        Some(y) if y > 96.0 => tags.push("high_detail".to_string()),
        Some(_) => tags.push("low_detail".to_string()),
        None => {}
    }

    tags
}

/// Top-k scenes by `content_score`, penalizing scenes whose duration is
/// close to an already-selected one (spec §4.D "duration-diversity
/// penalty"), ties broken by earlier start time.
fn select_highlights(scenes: &[SceneRecord], k: usize) -> Vec<SceneRecord> {
    let mut candidates: Vec<SceneRecord> = scenes.to_vec();
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap()
            .then_with(|| a.start.partial_cmp(&b.start).unwrap())
    });

    let mut chosen: Vec<SceneRecord> = Vec::new();
    let mut skipped: Vec<SceneRecord> = Vec::new();
    for candidate in candidates {
        if chosen.len() >= k {
            break;
        }
        let duration = candidate.duration();
        let too_similar = chosen
            .iter()
            .any(|c| (c.duration() - duration).abs() < 0.5);
        if too_similar {
            skipped.push(candidate);
        } else {
            chosen.push(candidate);
        }
    }
    // Fill any remaining slots from the skipped (duration-similar) pool,
    // still in score order, rather than returning fewer than k.
    for candidate in skipped {
        if chosen.len() >= k {
            break;
        }
        chosen.push(candidate);
    }
    chosen
}
