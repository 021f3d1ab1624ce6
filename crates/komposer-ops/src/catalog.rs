//! The static Operation Catalog (spec §4.C table).
//!
//! Every operation is data: a name, an argv template, declared parameters,
//! and an output extension policy. A handful of operations (`resize`,
//! `concatenate_simple`, the transition filters) need an ffmpeg filter
//! string assembled from more than one parameter — those use a synthetic
//! `{..._filter}` placeholder the Executor fills in itself rather than by
//! generic substitution; every other placeholder maps directly to a
//! declared parameter.

/// One argv token in an [`OperationSpec`]'s template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgToken {
    /// Inserted verbatim.
    Literal(&'static str),
    /// Replaced with the resolved value of the named parameter.
    Param(&'static str),
}

/// The declared type of an [`OperationSpec`] parameter, used for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// A non-negative floating-point seconds value.
    Duration,
    /// A non-negative integer.
    Integer,
    /// A `file_<8hex>` handle, resolved to a path via the registry.
    FileHandle,
    /// One of a fixed set of literal values.
    Enum(&'static [&'static str]),
    /// Free text (restricted: no shell metacharacters are ever interpreted,
    /// since argv is never passed through a shell).
    FreeString,
}

/// A declared parameter of an [`OperationSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDecl {
    /// Parameter name as it appears in `{name}` template placeholders.
    pub name: &'static str,
    /// Its declared type.
    pub ty: ParamType,
    /// Whether omitting it is a validation error.
    pub required: bool,
}

/// How the caller's requested output extension is constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputExtensionPolicy {
    /// The operation always produces this extension, regardless of request.
    Fixed(&'static str),
    /// The caller may choose any of these extensions.
    CallerChoiceFrom(&'static [&'static str]),
}

/// A catalog entry: everything needed to validate and run one operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationSpec {
    /// Unique name, as used by `process_file`/`batch_process`.
    pub name: &'static str,
    /// Argv tokens inserted before the primary `-i <input>` (e.g. `-y`,
    /// loop flags for `image_to_video`).
    pub pre_input_args: &'static [ArgToken],
    /// Argv tokens inserted after `-i <input>` and before the output path.
    pub args_template: &'static [ArgToken],
    /// Declared parameters; a template placeholder not listed here, or a
    /// caller-supplied parameter not listed here, is a validation error.
    pub params: &'static [ParamDecl],
    /// Output extension policy.
    pub output_extension_policy: OutputExtensionPolicy,
    /// Number of additional file-handle inputs beyond the primary one (e.g.
    /// `concatenate_simple`'s `second_video`). Used to decide how many `-i`
    /// flags the argv needs.
    pub extra_inputs: &'static [&'static str],
    /// One-line human-readable summary, surfaced by `get_available_operations`.
    pub description: &'static str,
}

use ArgToken::{Literal as L, Param as P};
use ParamType::*;

const VIDEO_EXT: &[&str] = &["mp4", "mov", "mkv", "webm"];
const AUDIO_EXT: &[&str] = &["mp3", "wav", "m4a", "aac", "flac"];

/// The full catalog, in the order spec.md §4.C lists them.
pub const CATALOG: &[OperationSpec] = &[
    OperationSpec {
        name: "convert",
        description: "Transcode a video to a different container/codec.",
        pre_input_args: &[L("-y")],
        args_template: &[],
        params: &[],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "extract_audio",
        description: "Pull the audio stream out of a video, copying it without re-encoding.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-vn"), L("-acodec"), L("copy")],
        params: &[],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(AUDIO_EXT),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "trim",
        description: "Cut a sub-range of a video starting at `start` for `duration` seconds.",
        pre_input_args: &[L("-y"), L("-ss"), P("start")],
        args_template: &[L("-t"), P("duration"), L("-c"), L("copy")],
        params: &[
            ParamDecl { name: "start", ty: Duration, required: true },
            ParamDecl { name: "duration", ty: Duration, required: true },
        ],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "resize",
        description: "Scale a video to `width`x`height`.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-vf"), P("scale_filter")],
        params: &[
            ParamDecl { name: "width", ty: Integer, required: true },
            ParamDecl { name: "height", ty: Integer, required: true },
        ],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "reverse",
        description: "Play a video's picture and sound backwards.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-vf"), L("reverse"), L("-af"), L("areverse")],
        params: &[],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "normalize_audio",
        description: "Apply loudness normalization to an audio track.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-af"), L("loudnorm")],
        params: &[],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(AUDIO_EXT),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "to_mp3",
        description: "Transcode audio to MP3.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-codec:a"), L("libmp3lame")],
        params: &[],
        output_extension_policy: OutputExtensionPolicy::Fixed("mp3"),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "replace_audio",
        description: "Swap a video's audio track for a different file's audio.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-map"), L("0:v:0"), L("-map"), L("1:a:0"), L("-c:v"), L("copy"), L("-shortest")],
        params: &[ParamDecl { name: "audio_file", ty: FileHandle, required: true }],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &["audio_file"],
    },
    OperationSpec {
        name: "concatenate_simple",
        description: "Join two videos end to end.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-filter_complex"), P("concat_filter"), L("-map"), L("[outv]"), L("-map"), L("[outa]")],
        params: &[ParamDecl { name: "second_video", ty: FileHandle, required: true }],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &["second_video"],
    },
    OperationSpec {
        name: "image_to_video",
        description: "Hold a still image for `duration` seconds to produce a video.",
        pre_input_args: &[L("-y"), L("-loop"), L("1")],
        args_template: &[L("-t"), P("duration"), L("-pix_fmt"), L("yuv420p")],
        params: &[ParamDecl { name: "duration", ty: Duration, required: true }],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    OperationSpec {
        name: "gradient_wipe",
        description: "Transition between two videos with an ffmpeg xfade wipe.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-filter_complex"), P("xfade_filter")],
        params: &[
            ParamDecl { name: "duration", ty: Duration, required: true },
            ParamDecl { name: "offset", ty: Duration, required: true },
            ParamDecl { name: "second_video", ty: FileHandle, required: true },
        ],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &["second_video"],
    },
    OperationSpec {
        name: "crossfade_transition",
        description: "Transition between two videos with an ffmpeg xfade crossfade.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-filter_complex"), P("xfade_filter")],
        params: &[
            ParamDecl { name: "duration", ty: Duration, required: true },
            ParamDecl { name: "offset", ty: Duration, required: true },
            ParamDecl { name: "second_video", ty: FileHandle, required: true },
        ],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &["second_video"],
    },
    OperationSpec {
        name: "opacity_transition",
        description: "Fade a video's opacity from `opacity_start` to `opacity_end`.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-vf"), P("opacity_filter")],
        params: &[
            ParamDecl { name: "opacity_start", ty: FreeString, required: true },
            ParamDecl { name: "opacity_end", ty: FreeString, required: true },
            ParamDecl { name: "duration", ty: Duration, required: true },
        ],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    // Not in spec.md's minimum table, but required by the `Strategy::TimeStretch`
    // planner decision (§4.F) and the effects tree's `TimeStretch` node (§4.H) —
    // both need a pitch-preserving-video / uniform-audio-tempo stretch operation.
    OperationSpec {
        name: "time_stretch",
        description: "Change a video's playback speed by `factor`, preserving audio pitch.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-vf"), P("stretch_vf"), L("-af"), P("stretch_af")],
        params: &[ParamDecl { name: "factor", ty: FreeString, required: true }],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    // Not in spec.md's minimum table; required by §4.F step 4's "remainder is
    // filled with silence/visual held frame" behavior when a smart_cut/hybrid
    // segment comes up shorter than its time slot under `center`/`left`/
    // `right` fitting. Clones the last frame for video, inserts silence for
    // audio; `pad_before`/`pad_after` let the planner express all three
    // anchor positions with one operation.
    OperationSpec {
        name: "pad_to_duration",
        description: "Pad a clip with held frames/silence before and/or after its content.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-vf"), P("pad_vf"), L("-af"), P("pad_af")],
        params: &[
            ParamDecl { name: "pad_before", ty: Duration, required: true },
            ParamDecl { name: "pad_after", ty: Duration, required: true },
        ],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &[],
    },
    // Not in spec.md's minimum table; required by §4.F step 7's background +
    // overlay mixing and by the effects tree's `Mix` node (§4.H). Mixes exactly
    // two audio-bearing inputs at independent linear gains; the Evaluator folds
    // more than two by chaining this operation pairwise.
    OperationSpec {
        name: "audio_mix",
        description: "Mix two audio-bearing inputs at independent linear gains.",
        pre_input_args: &[L("-y")],
        args_template: &[L("-filter_complex"), P("amix_filter"), L("-map"), L("0:v?"), L("-map"), L("[outa]")],
        params: &[
            ParamDecl { name: "second_audio", ty: FileHandle, required: true },
            ParamDecl { name: "gain_a", ty: FreeString, required: false },
            ParamDecl { name: "gain_b", ty: FreeString, required: false },
        ],
        output_extension_policy: OutputExtensionPolicy::CallerChoiceFrom(VIDEO_EXT),
        extra_inputs: &["second_audio"],
    },
];

/// Looks up a catalog entry by name.
pub fn find(name: &str) -> Option<&'static OperationSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_placeholder_is_declared() {
        for spec in CATALOG {
            for token in spec.pre_input_args.iter().chain(spec.args_template.iter()) {
                if let ArgToken::Param(name) = token {
                    if *name == "scale_filter"
                        || *name == "concat_filter"
                        || *name == "xfade_filter"
                        || *name == "opacity_filter"
                        || *name == "stretch_vf"
                        || *name == "stretch_af"
                        || *name == "amix_filter"
                        || *name == "pad_vf"
                        || *name == "pad_af"
                    {
                        continue;
                    }
                    assert!(
                        spec.params.iter().any(|p| p.name == *name),
                        "{}: placeholder '{}' has no declared param",
                        spec.name,
                        name
                    );
                }
            }
        }
    }

    #[test]
    fn find_returns_known_operation() {
        assert!(find("trim").is_some());
        assert!(find("not_an_operation").is_none());
    }
}
