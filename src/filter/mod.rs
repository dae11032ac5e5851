//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc band-pass design, matching
//!   `mne.filter.create_filter(fir_window='hamming', phase='zero')`.
//! - [`apply`]: Overlap-add zero-phase convolution, matching MNE's
//!   `_overlap_add_filter` / `_1d_overlap_filter`.
//!
//! The pipeline only sees the [`SignalFilter`] trait; [`FirBandpass`] is the
//! default implementation.

pub mod apply;
pub mod design;

pub use apply::{apply_fir_zero_phase, filter_1d};
pub use design::{auto_filter_length, auto_trans_bandwidth, auto_trans_bandwidth_upper, design_bandpass};

use anyhow::Result;

use crate::recording::ContinuousRecording;

/// A linear filter applied to electrode channels of a recording.
///
/// Implementations must leave the stim channel untouched and preserve shape.
pub trait SignalFilter {
    fn apply(&self, rec: ContinuousRecording) -> Result<ContinuousRecording>;
}

/// Zero-phase FIR band-pass between `l_freq` and `h_freq`.
#[derive(Debug, Clone)]
pub struct FirBandpass {
    pub l_freq: f64,
    pub h_freq: f64,
    pub sfreq: f64,
    taps: Vec<f64>,
}

impl FirBandpass {
    pub fn design(l_freq: f64, h_freq: f64, sfreq: f64) -> Self {
        let taps = design_bandpass(l_freq, h_freq, sfreq);
        Self { l_freq, h_freq, sfreq, taps }
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }
}

impl SignalFilter for FirBandpass {
    fn apply(&self, mut rec: ContinuousRecording) -> Result<ContinuousRecording> {
        anyhow::ensure!(
            (rec.sfreq - self.sfreq).abs() < 1e-6,
            "filter designed for {} Hz applied to {} Hz recording",
            self.sfreq,
            rec.sfreq
        );
        let rows = rec.electrode_rows();
        tracing::info!(
            l_freq = self.l_freq,
            h_freq = self.h_freq,
            taps = self.taps.len(),
            channels = rows.len(),
            "band-pass filtering"
        );
        apply_fir_zero_phase(&mut rec.data, &self.taps, &rows)?;
        Ok(rec)
    }
}
