//! `-vf` / `-af` filter expressions for single-input encodes.

use crate::params::{AudioParams, VideoParams};

/// Loudness range passed to `loudnorm`, in LU.
const LOUDNORM_RANGE: u32 = 11;

/// Build the comma-joined video filter chain: crop, rotation, then color.
///
/// Returns `None` when no video filter field is set.
pub fn video_filters(video: &VideoParams) -> Option<String> {
    let mut filters = Vec::new();

    if let Some(crop) = &video.crop {
        if let (Some(w), Some(h)) = (crop.w, crop.h) {
            filters.push(format!(
                "crop={w}:{h}:{}:{}",
                crop.x.unwrap_or(0),
                crop.y.unwrap_or(0)
            ));
        }
    }

    if let Some(rotation) = video.rotate.and_then(rotation_filter) {
        filters.push(rotation);
    }

    if let Some(color) = video.color.filter(|c| !c.is_empty()) {
        let brightness = color.brightness.unwrap_or(0.0) / 100.0;
        let contrast = color.contrast.unwrap_or(0.0) / 100.0 + 1.0;
        let saturation = color.saturation.unwrap_or(0.0) / 100.0 + 1.0;
        filters.push(format!(
            "eq=brightness={brightness}:contrast={contrast}:saturation={saturation}"
        ));
    }

    join(filters)
}

/// Map a clockwise rotation in degrees to a filter.
///
/// Right angles use lossless transposes; other angles go through `rotate`,
/// which takes radians. Zero and whole turns produce no filter.
pub fn rotation_filter(degrees: f64) -> Option<String> {
    if degrees == 90.0 {
        Some("transpose=1".to_string())
    } else if degrees == 180.0 {
        Some("transpose=2,transpose=2".to_string())
    } else if degrees == 270.0 {
        Some("transpose=2".to_string())
    } else if degrees == 0.0 || degrees % 360.0 == 0.0 {
        None
    } else {
        Some(format!("rotate={degrees}*PI/180"))
    }
}

/// Build the audio filter chain: loudness normalization, then denoise.
pub fn audio_filters(audio: &AudioParams) -> Option<String> {
    let mut filters = Vec::new();

    if let Some(loudnorm) = &audio.loudnorm {
        filters.push(format!(
            "loudnorm=I={}:TP={}:LRA={LOUDNORM_RANGE}",
            loudnorm.target(),
            loudnorm.true_peak()
        ));
    }
    if let Some(denoise) = &audio.denoise {
        filters.push(format!("afftdn=nr={}", denoise.strength()));
    }

    join(filters)
}

fn join(filters: Vec<String>) -> Option<String> {
    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}
