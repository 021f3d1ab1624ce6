//! ffmpeg-filter-based scene-boundary-detection backends.
//!
//! Boundaries come from ffmpeg's `select='gt(scene,THRESH)'` filter (the
//! same content-change metric `ffmpeg -vf "select='gt(scene,0.4)'"` exposes
//! on the command line), read back from `showinfo`'s `pts_time` annotations
//! on stderr. No bundled face/eye detector is available here, so the
//! face-presence term of the content-score is omitted rather than faked;
//! luminance and edge-density both come from
//! ffmpeg's `signalstats` filter (`YAVG` directly for luminance, `YAVG` of
//! an `edgedetect`-prefiltered frame as an edge-density proxy, since edges
//! render as bright pixels on a black field).

use crate::backend::SceneBackend;
use komposer_media::run_with_timeout;
use std::path::Path;
use std::time::Duration;

fn detect_scene_boundaries(
    path: &Path,
    threshold: f64,
    timeout: Duration,
) -> Result<Vec<f64>, String> {
    let filter = format!("select='gt(scene,{threshold})',showinfo");
    let args = vec![
        "-v".to_string(),
        "info".to_string(),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-vf".to_string(),
        filter,
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    let output = run_with_timeout("ffmpeg", &args, timeout).map_err(|e| e.to_string())?;
    if output.timed_out {
        return Err("ffmpeg scene detect timed out".to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(parse_showinfo_pts(&stderr))
}

fn parse_showinfo_pts(stderr: &str) -> Vec<f64> {
    let mut out = Vec::new();
    for line in stderr.lines() {
        if !line.contains("Parsed_showinfo") {
            continue;
        }
        if let Some(rest) = line.split("pts_time:").nth(1) {
            if let Some(value) = rest.split_whitespace().next() {
                if let Ok(pts) = value.parse::<f64>() {
                    out.push(pts);
                }
            }
        }
    }
    out
}

/// Parses the mean luminance (`YAVG`) from a `signalstats`-annotated
/// stderr, over the single frame nearest `at_time`.
pub fn mean_luminance_at(path: &Path, at_time: f64, timeout: Duration) -> Option<f64> {
    luminance_with_filter(path, at_time, "signalstats", timeout)
}

/// Edge-density proxy: mean luminance of an edge-detected frame near
/// `at_time` (brighter on average == busier frame).
pub fn edge_density_at(path: &Path, at_time: f64, timeout: Duration) -> Option<f64> {
    luminance_with_filter(path, at_time, "edgedetect,signalstats", timeout)
}

fn luminance_with_filter(
    path: &Path,
    at_time: f64,
    filter_chain: &str,
    timeout: Duration,
) -> Option<f64> {
    let args = vec![
        "-v".to_string(),
        "info".to_string(),
        "-ss".to_string(),
        format!("{at_time}"),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        filter_chain.to_string(),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    let output = run_with_timeout("ffmpeg", &args, timeout).ok()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_yavg(&stderr)
}

fn parse_yavg(stderr: &str) -> Option<f64> {
    for line in stderr.lines() {
        if let Some(rest) = line.split("YAVG:").nth(1) {
            if let Some(value) = rest.split_whitespace().next() {
                if let Ok(v) = value.parse::<f64>() {
                    return Some(v);
                }
            }
        }
    }
    None
}

/// Primary scene-detection backend: threshold `0.4`, tuned for hard cuts.
pub struct PrimarySceneDetectBackend;

impl SceneBackend for PrimarySceneDetectBackend {
    fn name(&self) -> &'static str {
        "primary_scene_detect"
    }

    fn detect_boundaries(&self, path: &Path, timeout: Duration) -> Result<Vec<f64>, String> {
        detect_scene_boundaries(path, 0.4, timeout)
    }
}

/// Fallback scene-detection backend: threshold `0.2`, more sensitive, for
/// sources with gradual/soft transitions the primary misses entirely.
pub struct FallbackSceneDetectBackend;

impl SceneBackend for FallbackSceneDetectBackend {
    fn name(&self) -> &'static str {
        "fallback_scene_detect"
    }

    fn detect_boundaries(&self, path: &Path, timeout: Duration) -> Result<Vec<f64>, String> {
        detect_scene_boundaries(path, 0.2, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_showinfo_pts_times() {
        let stderr = "\
[Parsed_showinfo_1 @ 0x1] n:0 pts:0 pts_time:0.000000
[Parsed_showinfo_1 @ 0x1] n:1 pts:120 pts_time:4.800000
";
        let pts = parse_showinfo_pts(stderr);
        assert_eq!(pts, vec![0.0, 4.8]);
    }

    #[test]
    fn parses_yavg_from_signalstats() {
        let stderr = "[Parsed_signalstats_1 @ 0x1] YMIN:10 YMAX:250 YAVG:128.500000\n";
        assert_eq!(parse_yavg(stderr), Some(128.5));
    }

    #[test]
    fn missing_yavg_yields_none() {
        assert_eq!(parse_yavg("nothing interesting here"), None);
    }
}
