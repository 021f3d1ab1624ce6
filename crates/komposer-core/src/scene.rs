//! Scene-detection records (spec §3 "SceneRecord").

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single detected scene boundary and its representative screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    /// Stable identifier within the source's scene list, e.g. `scene_0`.
    /// Assigned by timeline position at detection time.
    pub scene_id: String,
    /// Start time of the scene, in source-local seconds.
    pub start: f64,
    /// End time of the scene, in source-local seconds.
    pub end: f64,
    /// ffmpeg's scene-change score in `[0, 1]` that triggered this boundary.
    pub score: f64,
    /// Human-readable tags describing the scene's exposure, detail, and
    /// length (e.g. "well_exposed", "high_detail", "ideal_length").
    #[serde(default)]
    pub characteristics: Vec<String>,
    /// Path to the extracted representative frame, if screenshots were
    /// requested for this analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl SceneRecord {
    /// Duration of the scene, in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Aggregate statistics over a source's detected scenes (spec §4.E
/// `get_video_insights`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInsights {
    /// Total number of detected scenes.
    pub scene_count: usize,
    /// Mean scene duration, in seconds.
    pub avg_scene_duration: f64,
    /// Duration of the single longest scene, in seconds.
    pub longest_scene: f64,
    /// Duration of the single shortest scene, in seconds.
    pub shortest_scene: f64,
    /// Human-readable suggestions (e.g. "fast-cut source; prefer smart_cut
    /// at scene boundaries").
    pub suggestions: Vec<String>,
}

impl SceneInsights {
    /// Derives insights from a set of scene records. Returns `None` if
    /// `scenes` is empty (there is nothing to aggregate).
    pub fn from_scenes(scenes: &[SceneRecord]) -> Option<Self> {
        if scenes.is_empty() {
            return None;
        }
        let durations: Vec<f64> = scenes.iter().map(SceneRecord::duration).collect();
        let total: f64 = durations.iter().sum();
        let avg = total / durations.len() as f64;
        let longest = durations.iter().cloned().fold(f64::MIN, f64::max);
        let shortest = durations.iter().cloned().fold(f64::MAX, f64::min);
        let mut suggestions = Vec::new();
        if avg < 2.0 {
            suggestions.push(
                "fast-cut source; prefer smart_cut at scene boundaries".to_string(),
            );
        }
        Some(SceneInsights {
            scene_count: scenes.len(),
            avg_scene_duration: avg,
            longest_scene: longest,
            shortest_scene: shortest,
            suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scenes_yields_no_insights() {
        assert!(SceneInsights::from_scenes(&[]).is_none());
    }

    #[test]
    fn aggregates_durations() {
        let scenes = vec![
            SceneRecord {
                scene_id: "scene_0".to_string(),
                start: 0.0,
                end: 1.0,
                score: 0.9,
                characteristics: Vec::new(),
                screenshot: None,
            },
            SceneRecord {
                scene_id: "scene_1".to_string(),
                start: 1.0,
                end: 4.0,
                score: 0.8,
                characteristics: Vec::new(),
                screenshot: None,
            },
        ];
        let insights = SceneInsights::from_scenes(&scenes).unwrap();
        assert_eq!(insights.scene_count, 2);
        assert!((insights.avg_scene_duration - 2.0).abs() < 1e-9);
        assert!((insights.longest_scene - 3.0).abs() < 1e-9);
        assert!((insights.shortest_scene - 1.0).abs() < 1e-9);
    }
}
