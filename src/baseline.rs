//! Baseline correction over a sub-interval of each epoch.
//!
//! Matches `mne.Epochs(..., baseline=(bmin, bmax))`:
//!   for each channel: epoch[ch, :] -= mean(epoch[ch, b0..=b1])
use std::ops::RangeInclusive;

use ndarray::{s, Array3, ArrayViewMut2};

/// Subtract each channel's mean over `range` (sample indices within the
/// epoch) from the whole channel.
pub fn baseline_correct_inplace(mut epoch: ArrayViewMut2<'_, f64>, range: RangeInclusive<usize>) {
    for mut ch in epoch.rows_mut() {
        let m = ch
            .slice(s![*range.start()..=*range.end()])
            .mean()
            .unwrap_or(0.0);
        ch -= m;
    }
}

/// Per-epoch, per-channel baseline correction of `[E, C, T]`.
pub fn baseline_correct_all(epochs: &mut Array3<f64>, range: RangeInclusive<usize>) {
    for e in 0..epochs.dim().0 {
        baseline_correct_inplace(epochs.slice_mut(s![e, .., ..]), range.clone());
    }
}
