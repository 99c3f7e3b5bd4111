//! Filter graph generation for multi-input concatenation.
//!
//! Every input is scaled into a common frame (letterboxed, never stretched),
//! its timestamps reset, and, when the output carries audio, given an audio
//! stream: the real one resampled, or generated silence for inputs without
//! audio. A single `concat` node joins everything in input order.

use crate::params::{parse_resolution, EncodeParams, InputSpec};

/// Frame size used when neither the parameters nor any input provide one.
pub const FALLBACK_RESOLUTION: (u32, u32) = (1920, 1080);

/// Sample rate of generated silence when the parameters don't set one.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Output label of the concatenated video stream.
pub const VIDEO_OUT: &str = "[vout]";

/// Output label of the concatenated audio stream.
pub const AUDIO_OUT: &str = "[aout]";

/// A generated `-filter_complex` graph and the labels to map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatGraph {
    pub graph: String,
    pub video_label: &'static str,
    pub audio_label: Option<&'static str>,
}

/// Pick the shared output frame size.
///
/// An explicit, well-formed `WxH` in the parameters wins; then the first input
/// with both dimensions; then [`FALLBACK_RESOLUTION`].
pub fn resolve_target_resolution(inputs: &[InputSpec], params: &EncodeParams) -> (u32, u32) {
    params
        .video
        .explicit_resolution()
        .and_then(parse_resolution)
        .or_else(|| inputs.iter().find_map(InputSpec::dimensions))
        .unwrap_or(FALLBACK_RESOLUTION)
}

/// Build the concatenation graph for `inputs` at the given frame size.
pub fn build_concat_graph(
    inputs: &[InputSpec],
    (width, height): (u32, u32),
    sample_rate: u32,
) -> ConcatGraph {
    let audio_enabled = inputs.iter().any(InputSpec::has_audio);

    let mut clauses = Vec::with_capacity(inputs.len() * 2 + 1);
    let mut video_labels = String::new();
    let mut audio_labels = String::new();

    for (idx, input) in inputs.iter().enumerate() {
        let v_label = format!("[v{idx}]");
        clauses.push(format!(
            "[{idx}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,setpts=PTS-STARTPTS{v_label}"
        ));
        video_labels.push_str(&v_label);

        if audio_enabled {
            let a_label = format!("[a{idx}]");
            if input.has_audio() {
                clauses.push(format!("[{idx}:a]aresample=async=1:first_pts=0{a_label}"));
            } else {
                clauses.push(format!(
                    "anullsrc=channel_layout=stereo:sample_rate={sample_rate},\
                     asetpts=PTS-STARTPTS{a_label}"
                ));
            }
            audio_labels.push_str(&a_label);
        }
    }

    clauses.push(format!(
        "{video_labels}{audio_labels}concat=n={}:v=1:a={}{VIDEO_OUT}{}",
        inputs.len(),
        u8::from(audio_enabled),
        if audio_enabled { AUDIO_OUT } else { "" }
    ));

    ConcatGraph {
        graph: clauses.join(";"),
        video_label: VIDEO_OUT,
        audio_label: audio_enabled.then_some(AUDIO_OUT),
    }
}
