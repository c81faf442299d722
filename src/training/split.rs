use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};

/// Indices into the corpus for each side of the split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Seeded random split; validation takes the first `ceil(n * fraction)`
/// shuffled indices, kept between 1 and `n - 1`.
pub fn split_indices(count: usize, fraction: f64, rng: &mut StdRng) -> Result<DataSplit> {
    if count < 2 {
        return Err(ScoringError::data(format!(
            "need at least 2 usable examples to split, found {count}"
        )));
    }
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(ScoringError::configuration(format!(
            "validation_fraction must lie in (0, 1), got {fraction}"
        )));
    }
    let mut indices: Vec<usize> = (0..count).collect();
    indices.shuffle(rng);
    let validation_len = ((count as f64 * fraction).ceil() as usize).clamp(1, count - 1);
    let train = indices.split_off(validation_len);
    Ok(DataSplit {
        train,
        validation: indices,
    })
}
