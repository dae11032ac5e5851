//! Trial-onset reconstruction from the raw status channel.
//!
//! The BioSemi status channel here carries offset-coded, negative-polarity
//! pulses that generic trigger detectors misread (they report the pulse
//! offset as the onset).  Onsets are therefore rebuilt directly from the
//! sample values:
//!
//! ```text
//! s      = status - min(status)
//! d[i]   = s[i] - s[i+1]            i in 0..len-1
//! onset  = { i + 1 | d[i] == step }  (step = -2 by default)
//! ```
//!
//! The result replaces any library-detected events.
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default transition value marking a trial onset.
pub const DEFAULT_STEP: f64 = -2.0;

/// One trial onset: MNE-style `(sample, previous, new)` event triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// Sample index of the onset in the continuous recording.
    pub sample: usize,
    /// Normalised status level just before the onset.
    pub previous_code: i64,
    /// Condition code; 0 until labeled.
    pub new_code: u8,
}

/// Which onsets to keep when the status channel yields more than expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationPolicy {
    /// Keep the first `N` onsets, drop trailing ones.
    #[default]
    KeepFirst,
    /// Keep the last `N` onsets, drop leading ones.
    KeepLast,
}

/// Ordered trial onsets, strictly increasing in sample index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkerSet {
    markers: Vec<Marker>,
}

impl MarkerSet {
    /// Build from explicit markers, checking that samples strictly increase.
    pub fn from_markers(markers: Vec<Marker>) -> Result<Self> {
        if let Some(w) = markers.windows(2).find(|w| w[1].sample <= w[0].sample) {
            return Err(PipelineError::Malformed {
                what: "marker set".into(),
                reason: format!("sample {} follows {}", w[1].sample, w[0].sample),
            });
        }
        Ok(Self { markers })
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Marker> {
        self.markers.iter()
    }

    pub fn samples(&self) -> Vec<usize> {
        self.markers.iter().map(|m| m.sample).collect()
    }

    pub fn codes(&self) -> Vec<u8> {
        self.markers.iter().map(|m| m.new_code).collect()
    }

    pub(crate) fn set_code(&mut self, i: usize, code: u8) {
        self.markers[i].new_code = code;
    }
}

impl std::ops::Index<usize> for MarkerSet {
    type Output = Marker;
    fn index(&self, i: usize) -> &Marker {
        &self.markers[i]
    }
}

/// Every sample index where the normalised status channel changes by exactly
/// `step` between consecutive samples, plus one.
///
/// Pure function of its input.
pub fn detect_onsets(status: &[f64], step: f64) -> Vec<usize> {
    if status.len() < 2 {
        return vec![];
    }
    let min = status.iter().copied().fold(f64::INFINITY, f64::min);
    status
        .windows(2)
        .enumerate()
        .filter(|(_, w)| {
            let d = (w[0] - min) - (w[1] - min);
            (d - step).abs() < 1e-9
        })
        .map(|(i, _)| i + 1)
        .collect()
}

/// Reconstruct exactly `expected` trial onsets from the status channel.
///
/// Fewer detected onsets than `expected` is fatal. Surplus onsets are dropped
/// according to `policy` and reported at `warn` level.
pub fn reconstruct(
    status: &[f64],
    expected: usize,
    step: f64,
    policy: TruncationPolicy,
) -> Result<MarkerSet> {
    let onsets = detect_onsets(status, step);
    let found = onsets.len();
    if found < expected {
        return Err(PipelineError::InsufficientMarkers { found, expected });
    }

    let kept: &[usize] = if found > expected {
        let (kept, dropped) = match policy {
            TruncationPolicy::KeepFirst => (&onsets[..expected], &onsets[expected..]),
            TruncationPolicy::KeepLast => (&onsets[found - expected..], &onsets[..found - expected]),
        };
        tracing::warn!(
            found,
            expected,
            ?policy,
            dropped = ?dropped,
            "status channel produced surplus onsets; truncating"
        );
        kept
    } else {
        &onsets
    };

    let min = status.iter().copied().fold(f64::INFINITY, f64::min);
    let markers = kept
        .iter()
        .map(|&sample| Marker {
            sample,
            previous_code: (status[sample - 1] - min).round() as i64,
            new_code: 0,
        })
        .collect();

    tracing::info!(found, expected, "reconstructed trial onsets");
    MarkerSet::from_markers(markers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rise_of_two_marks_following_sample() {
        // d[i] = s[i] - s[i+1]: the 3 → 5 transition between 5 and 6 gives -2.
        let st = [5.0, 5.0, 5.0, 3.0, 3.0, 3.0, 5.0, 5.0];
        assert_eq!(detect_onsets(&st, -2.0), vec![6]);
    }

    #[test]
    fn only_exact_steps_count() {
        let st = [0.0, 1.0, 1.0, 4.0, 4.0, 6.0, 6.0];
        // +1 and +3 ignored, +2 at 4→5 detected.
        assert_eq!(detect_onsets(&st, -2.0), vec![5]);
    }

    #[test]
    fn multiple_onsets_detected() {
        let st = [0.0, 2.0, 0.0, 2.0, 0.0, 2.0];
        assert_eq!(detect_onsets(&st, -2.0), vec![1, 3, 5]);
    }

    #[test]
    fn offset_removed_before_differencing() {
        let st: Vec<f64> = [0.0, 2.0, 0.0, 2.0].iter().map(|v| v + 65_280.0).collect();
        assert_eq!(detect_onsets(&st, -2.0), vec![1, 3]);
    }

    #[test]
    fn short_inputs_yield_nothing() {
        assert!(detect_onsets(&[], -2.0).is_empty());
        assert!(detect_onsets(&[3.0], -2.0).is_empty());
    }

    #[test]
    fn transition_into_last_sample_counts_but_nothing_beyond() {
        let st = [0.0, 0.0, 2.0];
        assert_eq!(detect_onsets(&st, -2.0), vec![2]);
    }

    #[test]
    fn insufficient_onsets_is_fatal() {
        let st = [0.0, 2.0, 0.0, 2.0];
        let err = reconstruct(&st, 3, -2.0, TruncationPolicy::KeepFirst).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientMarkers { found: 2, expected: 3 }
        ));
    }

    #[test]
    fn surplus_truncated_per_policy() {
        let st = [0.0, 2.0, 0.0, 2.0, 0.0, 2.0];
        let first = reconstruct(&st, 2, -2.0, TruncationPolicy::KeepFirst).unwrap();
        assert_eq!(first.samples(), vec![1, 3]);
        let last = reconstruct(&st, 2, -2.0, TruncationPolicy::KeepLast).unwrap();
        assert_eq!(last.samples(), vec![3, 5]);
    }

    #[test]
    fn markers_start_unlabeled_with_previous_level() {
        let st = [7.0, 7.0, 9.0, 7.0];
        let m = reconstruct(&st, 1, -2.0, TruncationPolicy::KeepFirst).unwrap();
        assert_eq!(m[0], Marker { sample: 2, previous_code: 0, new_code: 0 });
    }

    #[test]
    fn from_markers_rejects_unordered() {
        let m = vec![
            Marker { sample: 10, previous_code: 0, new_code: 0 },
            Marker { sample: 10, previous_code: 0, new_code: 0 },
        ];
        assert!(MarkerSet::from_markers(m).is_err());
    }
}
