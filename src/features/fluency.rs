use super::prosody::mean_std;
use crate::audio::voice_activity::VoicedSpan;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct FluencyBlock {
    pub num_pauses: f32,
    pub pause_mean: f32,
    pub pause_std: f32,
    pub pause_total: f32,
    pub speech_rate: f32,
    pub speech_duration_mean: f32,
    pub articulation_rate: f32,
}

impl FluencyBlock {
    pub fn append_to(&self, out: &mut Vec<f32>) {
        out.extend([
            self.num_pauses,
            self.pause_mean,
            self.pause_std,
            self.pause_total,
            self.speech_rate,
            self.speech_duration_mean,
            self.articulation_rate,
        ]);
    }
}

/// Derive pause and rate statistics from voiced spans.
///
/// No spans means zero pauses, zero rates; zero duration means zero speech rate.
pub(crate) fn summarize_fluency(
    spans: &[VoicedSpan],
    sample_rate: u32,
    duration_secs: f64,
) -> FluencyBlock {
    let rate = sample_rate.max(1) as f64;
    let pauses: Vec<f64> = spans
        .windows(2)
        .map(|pair| pair[1].start.saturating_sub(pair[0].end) as f64 / rate)
        .collect();
    let speech: Vec<f64> = spans.iter().map(|span| span.len() as f64 / rate).collect();

    let (pause_mean, pause_std) = mean_std(&pauses);
    let voiced_total: f64 = speech.iter().sum();
    let segments = spans.len() as f64;
    let speech_rate = if duration_secs > 0.0 {
        segments / duration_secs
    } else {
        0.0
    };
    let articulation_denominator = if speech.is_empty() { 1.0 } else { voiced_total };
    let articulation_rate = if articulation_denominator > 0.0 {
        segments / articulation_denominator
    } else {
        0.0
    };

    FluencyBlock {
        num_pauses: pauses.len() as f32,
        pause_mean: pause_mean as f32,
        pause_std: pause_std as f32,
        pause_total: pauses.iter().sum::<f64>() as f32,
        speech_rate: speech_rate as f32,
        speech_duration_mean: mean_std(&speech).0 as f32,
        articulation_rate: articulation_rate as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn two_segments_make_one_pause() {
        let spans = [
            VoicedSpan { start: 0, end: 8_000 },
            VoicedSpan {
                start: 16_000,
                end: 32_000,
            },
        ];
        let block = summarize_fluency(&spans, 16_000, 2.0);
        assert_eq!(block.num_pauses, 1.0);
        assert_abs_diff_eq!(block.pause_mean, 0.5);
        assert_abs_diff_eq!(block.pause_std, 0.0);
        assert_abs_diff_eq!(block.pause_total, 0.5);
        assert_abs_diff_eq!(block.speech_rate, 1.0);
        assert_abs_diff_eq!(block.speech_duration_mean, 0.75);
        assert_abs_diff_eq!(block.articulation_rate, 2.0 / 1.5);
    }

    #[test]
    fn no_segments_resolve_to_zero() {
        let block = summarize_fluency(&[], 16_000, 3.0);
        assert_eq!(block, FluencyBlock::default());
        assert_eq!(summarize_fluency(&[], 16_000, 0.0), FluencyBlock::default());
    }
}
