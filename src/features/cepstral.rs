use ndarray::{Array1, Array2, Axis};

const DELTA_WINDOW: usize = 2;

/// Utterance-level MFCC statistics, each `n_mfcc` long.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CepstralBlock {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
    pub delta_mean: Array1<f32>,
    pub delta2_mean: Array1<f32>,
}

impl CepstralBlock {
    pub fn append_to(&self, out: &mut Vec<f32>) {
        for stat in [&self.mean, &self.std, &self.delta_mean, &self.delta2_mean] {
            out.extend(stat.iter().copied());
        }
    }
}

pub(crate) fn summarize_mfcc(mfcc: &[Vec<f64>], n_mfcc: usize) -> CepstralBlock {
    let matrix = array_from_frames(mfcc, n_mfcc);
    let deltas = compute_delta_matrix(&matrix, DELTA_WINDOW);
    let delta_deltas = compute_delta_matrix(&deltas, DELTA_WINDOW);
    CepstralBlock {
        mean: column_mean(&matrix),
        std: column_std(&matrix),
        delta_mean: column_mean(&deltas),
        delta2_mean: column_mean(&delta_deltas),
    }
}

fn array_from_frames(frames: &[Vec<f64>], columns: usize) -> Array2<f32> {
    let mut matrix = Array2::zeros((frames.len(), columns));
    for (mut row, frame) in matrix.outer_iter_mut().zip(frames) {
        for (cell, value) in row.iter_mut().zip(frame) {
            *cell = *value as f32;
        }
    }
    matrix
}

/// Regression deltas over a `±window` frame neighbourhood, edges replicated.
fn compute_delta_matrix(input: &Array2<f32>, window: usize) -> Array2<f32> {
    let frames = input.len_of(Axis(0));
    let coeffs = input.len_of(Axis(1));
    let mut output = Array2::zeros((frames, coeffs));
    if frames == 0 {
        return output;
    }
    let denominator = 2.0_f32 * (1..=window).map(|n| (n * n) as f32).sum::<f32>();

    for t in 0..frames {
        let mut numerator = Array1::<f32>::zeros(coeffs);
        for n in 1..=window {
            let prev = input.row(t.saturating_sub(n));
            let next = input.row((t + n).min(frames - 1));
            numerator.scaled_add(n as f32, &(&next - &prev));
        }
        output.row_mut(t).assign(&(numerator / denominator));
    }
    output
}

fn column_mean(matrix: &Array2<f32>) -> Array1<f32> {
    matrix
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(matrix.len_of(Axis(1))))
}

/// Population standard deviation per column.
fn column_std(matrix: &Array2<f32>) -> Array1<f32> {
    if matrix.len_of(Axis(0)) == 0 {
        return Array1::zeros(matrix.len_of(Axis(1)));
    }
    matrix.std_axis(Axis(0), 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn delta_of_linear_ramp_is_its_slope() {
        let frames: Vec<Vec<f64>> = (0..20).map(|t| vec![t as f64 * 0.5, 1.0]).collect();
        let block = summarize_mfcc(&frames, 2);
        // Interior frames see the exact slope; replicated edges pull the mean down slightly.
        assert!(block.delta_mean[0] > 0.4 && block.delta_mean[0] <= 0.5);
        assert_abs_diff_eq!(block.delta_mean[1], 0.0);
        assert_abs_diff_eq!(block.std[1], 0.0);
        assert_abs_diff_eq!(block.mean[0], 4.75, epsilon = 1e-5);
    }

    #[test]
    fn empty_input_yields_zero_blocks() {
        let block = summarize_mfcc(&[], 13);
        let mut out = Vec::new();
        block.append_to(&mut out);
        assert_eq!(out, vec![0.0; 52]);
    }
}
