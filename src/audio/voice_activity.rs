//! Energy-based voice activity segmentation.

use serde::{Deserialize, Serialize};

const LEVEL_FLOOR: f64 = 1e-10;

/// A contiguous voiced interval, in samples of the analysed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicedSpan {
    pub start: usize,
    pub end: usize,
}

impl VoicedSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The same interval expressed in seconds, for diagnostics output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoicedSegment {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Parameters for [`split_voiced`].
#[derive(Debug, Clone, Copy)]
pub struct SegmentationParams {
    pub frame_len: usize,
    pub hop_len: usize,
    /// Frames quieter than the loudest frame by more than this are silent.
    pub top_db: f64,
    /// Absolute level in dBFS below which a frame is always silent.
    pub floor_db: f64,
}

/// Split `samples` into voiced spans.
///
/// A frame is voiced when its RMS level exceeds both `peak - top_db` and
/// the absolute floor, so all-zero and near-silent input yields no spans.
pub fn split_voiced(samples: &[f32], params: &SegmentationParams) -> Vec<VoicedSpan> {
    let frame_len = params.frame_len.max(1);
    let hop_len = params.hop_len.max(1);
    if samples.is_empty() {
        return Vec::new();
    }

    let levels = frame_levels_db(samples, frame_len, hop_len);
    let peak = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = (peak - params.top_db).max(params.floor_db);

    let mut spans = Vec::new();
    let mut run_start: Option<usize> = None;
    for (frame, &level) in levels.iter().enumerate() {
        if level > threshold {
            run_start.get_or_insert(frame);
        } else if let Some(first) = run_start.take() {
            spans.push(frames_to_span(first, frame - 1, samples.len(), frame_len, hop_len));
        }
    }
    if let Some(first) = run_start {
        spans.push(frames_to_span(
            first,
            levels.len() - 1,
            samples.len(),
            frame_len,
            hop_len,
        ));
    }
    merge_overlapping(spans)
}

/// Per-frame RMS level in dBFS. The final frame is zero-padded.
fn frame_levels_db(samples: &[f32], frame_len: usize, hop_len: usize) -> Vec<f64> {
    let frames = if samples.len() <= frame_len {
        1
    } else {
        1 + (samples.len() - frame_len).div_ceil(hop_len)
    };
    (0..frames)
        .map(|frame| {
            let start = frame * hop_len;
            let end = (start + frame_len).min(samples.len());
            let window = &samples[start.min(end)..end];
            let energy: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
            let rms = (energy / frame_len as f64).sqrt();
            20.0 * rms.max(LEVEL_FLOOR).log10()
        })
        .collect()
}

fn frames_to_span(
    first: usize,
    last: usize,
    total: usize,
    frame_len: usize,
    hop_len: usize,
) -> VoicedSpan {
    VoicedSpan {
        start: (first * hop_len).min(total),
        end: (last * hop_len + frame_len).min(total),
    }
}

/// Adjacent runs separated by a single quiet frame can overlap once frames
/// are widened back to samples; fold them together.
fn merge_overlapping(spans: Vec<VoicedSpan>) -> Vec<VoicedSpan> {
    let mut merged: Vec<VoicedSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(previous) if span.start <= previous.end => {
                previous.end = previous.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}
