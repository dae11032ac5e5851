//! Average reference: subtract the mean across electrodes at each time point.
//!
//! Matches `raw.set_eeg_reference('average')` with the projector applied.
//! The status channel is never part of the reference and is left untouched.
//!
//! `data`: [C, T]  →  `data[c, t] -= mean(data[rows, t])` for `c` in `rows`
use ndarray::{Array1, Array2};

use crate::recording::ContinuousRecording;

/// Re-reference `rows` of `data` to their per-timepoint mean.
pub fn average_reference_rows(data: &mut Array2<f64>, rows: &[usize]) {
    if rows.is_empty() {
        return;
    }
    let n_t = data.ncols();
    let mut means = Array1::<f64>::zeros(n_t);
    for &r in rows {
        means += &data.row(r);
    }
    means /= rows.len() as f64;
    for &r in rows {
        let mut row = data.row_mut(r);
        row -= &means;
    }
}

/// Average-reference every electrode of the recording.
pub fn average_reference(mut rec: ContinuousRecording) -> ContinuousRecording {
    let rows = rec.electrode_rows();
    average_reference_rows(&mut rec.data, &rows);
    tracing::debug!(n_channels = rows.len(), "applied average reference");
    rec
}
