//! Event-locked epoching.
//!
//! Cuts `[onset + pre, onset + post]` (both ends inclusive, as MNE does) around
//! each trial's marker, optionally shifted to the behavioural response,
//! subtracts the baseline mean and applies amplitude rejection.
//!
//! Every trial in the analysis range gets a slot in the output, in trial
//! order.  Trials that are rejected, match no condition, run off either end
//! of the recording, or have no response to re-anchor to are kept as all-NaN
//! placeholders so that slot `i` always corresponds to behavioural row
//! `trial_index[i]`.  Rejection looks at every extracted channel, EOG included.
use std::ops::Range;

use ndarray::{s, Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::baseline::baseline_correct_inplace;
use crate::error::{PipelineError, Result};
use crate::labeling::UNLABELED;
use crate::markers::MarkerSet;
use crate::recording::ContinuousRecording;

/// Epoch window and baseline, in seconds relative to the (shifted) onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochWindow {
    pub tmin: f64,
    pub tmax: f64,
    pub baseline: (f64, f64),
}

impl Default for EpochWindow {
    fn default() -> Self {
        Self { tmin: -0.2, tmax: 0.8, baseline: (-0.2, 0.0) }
    }
}

impl EpochWindow {
    /// First and last sample offsets relative to the onset.
    pub fn offsets(&self, sfreq: f64) -> (i64, i64) {
        ((self.tmin * sfreq).round() as i64, (self.tmax * sfreq).round() as i64)
    }

    /// Samples per epoch. At the defaults and 1024 Hz: **1025**.
    pub fn n_samples(&self, sfreq: f64) -> usize {
        let (pre, post) = self.offsets(sfreq);
        (post - pre + 1).max(0) as usize
    }

    /// Baseline as inclusive sample indices into the epoch.
    pub fn baseline_range(&self, sfreq: f64) -> Result<std::ops::RangeInclusive<usize>> {
        let (pre, post) = self.offsets(sfreq);
        if post < pre {
            return Err(PipelineError::invalid_config(
                "epoch.tmax",
                format!("tmax {} precedes tmin {}", self.tmax, self.tmin),
            ));
        }
        let b0 = (self.baseline.0 * sfreq).round() as i64;
        let b1 = (self.baseline.1 * sfreq).round() as i64;
        if b0 > b1 || b0 < pre || b1 > post {
            return Err(PipelineError::invalid_config(
                "epoch.baseline",
                format!(
                    "({}, {}) s is not inside the window ({}, {}) s",
                    self.baseline.0, self.baseline.1, self.tmin, self.tmax
                ),
            ));
        }
        Ok((b0 - pre) as usize..=(b1 - pre) as usize)
    }

    pub fn times(&self, sfreq: f64) -> Array1<f64> {
        let (pre, post) = self.offsets(sfreq);
        Array1::from_iter((pre..=post).map(|k| k as f64 / sfreq))
    }
}

/// How a window's amplitude is measured against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectCriterion {
    /// `max |x|` over the window.
    #[default]
    Absolute,
    /// `max x − min x` over the window (MNE's `reject=` convention).
    PeakToPeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Volts; `100e-6` for 100 µV.
    pub threshold: f64,
    #[serde(default)]
    pub criterion: RejectCriterion,
}

impl Rejection {
    pub fn absolute(threshold: f64) -> Self {
        Self { threshold, criterion: RejectCriterion::Absolute }
    }

    /// First channel that exceeds the threshold, with its amplitude.
    fn check(&self, epoch: &Array2<f64>) -> Option<(usize, f64)> {
        epoch.rows().into_iter().enumerate().find_map(|(c, row)| {
            let amp = match self.criterion {
                RejectCriterion::Absolute => row.iter().fold(0.0_f64, |m, v| m.max(v.abs())),
                RejectCriterion::PeakToPeak => {
                    let (lo, hi) = row
                        .iter()
                        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                    hi - lo
                }
            };
            (amp > self.threshold).then_some((c, amp))
        })
    }
}

/// Outcome of one trial's window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialStatus {
    Retained,
    /// Amplitude above threshold on `channel` (index into the epoch channels).
    Rejected { channel: usize, amplitude: f64 },
    /// Behavioural row matched no condition rule; code stays 0.
    Unlabeled,
    /// Window extends past the start or end of the recording.
    OutOfBounds,
    /// Re-anchoring requested but the trial has no response latency.
    NoResponse,
}

impl TrialStatus {
    pub fn is_retained(&self) -> bool {
        matches!(self, TrialStatus::Retained)
    }
}

/// Counts of each trial outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochSummary {
    pub retained: usize,
    pub rejected: usize,
    pub out_of_bounds: usize,
    pub no_response: usize,
    pub unlabeled: usize,
}

impl EpochSummary {
    /// Placeholders for any reason other than rejection.
    pub fn missing(&self) -> usize {
        self.out_of_bounds + self.no_response + self.unlabeled
    }

    pub fn total(&self) -> usize {
        self.retained + self.rejected + self.out_of_bounds + self.no_response + self.unlabeled
    }
}

/// Epoched data for one participant.
#[derive(Debug, Clone)]
pub struct Epochs {
    /// `[N, C, S]`; non-retained trials are NaN.
    pub data: Array3<f64>,
    pub status: Vec<TrialStatus>,
    pub codes: Vec<u8>,
    /// Behavioural-log row of each trial slot.
    pub trial_index: Vec<usize>,
    pub ch_names: Vec<String>,
    pub times: Array1<f64>,
}

impl Epochs {
    pub fn n_trials(&self) -> usize {
        self.data.dim().0
    }

    pub fn n_channels(&self) -> usize {
        self.data.dim().1
    }

    pub fn n_samples(&self) -> usize {
        self.data.dim().2
    }

    pub fn summary(&self) -> EpochSummary {
        let mut s = EpochSummary::default();
        for st in &self.status {
            match st {
                TrialStatus::Retained => s.retained += 1,
                TrialStatus::Rejected { .. } => s.rejected += 1,
                TrialStatus::OutOfBounds => s.out_of_bounds += 1,
                TrialStatus::NoResponse => s.no_response += 1,
                TrialStatus::Unlabeled => s.unlabeled += 1,
            }
        }
        s
    }

    /// Trials labeled `code`, in trial order, placeholders included.
    pub fn select_condition(&self, code: u8) -> Epochs {
        let keep: Vec<usize> = (0..self.n_trials()).filter(|&i| self.codes[i] == code).collect();
        Epochs {
            data: self.data.select(ndarray::Axis(0), &keep),
            status: keep.iter().map(|&i| self.status[i]).collect(),
            codes: keep.iter().map(|&i| self.codes[i]).collect(),
            trial_index: keep.iter().map(|&i| self.trial_index[i]).collect(),
            ch_names: self.ch_names.clone(),
            times: self.times.clone(),
        }
    }
}

/// Everything that decides where and how each trial is cut.
#[derive(Debug, Clone)]
pub struct EpochRequest<'a> {
    pub markers: &'a MarkerSet,
    /// Trials to epoch (indices into `markers`); others are ignored.
    pub trials: Range<usize>,
    /// Per-trial onset shift in samples; `None` entries mean no response.
    pub rt_offsets: Option<&'a [Option<i64>]>,
    pub window: EpochWindow,
    pub reject: Option<Rejection>,
}

/// Cut epochs of channels `rows` from `rec`.
pub fn extract_epochs(rec: &ContinuousRecording, rows: &[usize], req: &EpochRequest<'_>) -> Result<Epochs> {
    let n_markers = req.markers.len();
    if req.trials.start > req.trials.end || req.trials.end > n_markers {
        return Err(PipelineError::invalid_config(
            "paradigm.analysis_range",
            format!("{:?} is outside the {n_markers} markers", req.trials),
        ));
    }
    if let Some(rts) = req.rt_offsets {
        if rts.len() != n_markers {
            return Err(PipelineError::TrialCountMismatch { markers: n_markers, log_rows: rts.len() });
        }
    }
    if let Some(r) = req.reject {
        if !(r.threshold > 0.0) {
            return Err(PipelineError::invalid_config("epoch.reject", "threshold must be positive"));
        }
    }

    let sfreq = rec.sfreq;
    let (pre, post) = req.window.offsets(sfreq);
    let baseline = req.window.baseline_range(sfreq)?;
    let n_s = req.window.n_samples(sfreq);
    let n_c = rows.len();
    let n_tr = req.trials.len();
    let n_t = rec.n_times() as i64;

    let mut data = Array3::<f64>::from_elem((n_tr, n_c, n_s), f64::NAN);
    let mut status = Vec::with_capacity(n_tr);
    let mut codes = Vec::with_capacity(n_tr);

    for (slot, trial) in req.trials.clone().enumerate() {
        let marker = req.markers[trial];
        codes.push(marker.new_code);
        if marker.new_code == UNLABELED {
            tracing::warn!(trial, "trial matches no condition rule, leaving a placeholder");
            status.push(TrialStatus::Unlabeled);
            continue;
        }

        let onset = match req.rt_offsets {
            Some(rts) => match rts[trial] {
                Some(shift) => marker.sample as i64 + shift,
                None => {
                    status.push(TrialStatus::NoResponse);
                    continue;
                }
            },
            None => marker.sample as i64,
        };

        let (start, stop) = (onset + pre, onset + post);
        if start < 0 || stop >= n_t {
            status.push(TrialStatus::OutOfBounds);
            continue;
        }
        let (start, stop) = (start as usize, stop as usize);

        let mut epoch =
            Array2::from_shape_fn((n_c, n_s), |(c, k)| rec.data[[rows[c], start + k]]);
        debug_assert_eq!(stop - start + 1, n_s);
        baseline_correct_inplace(epoch.view_mut(), baseline.clone());

        if let Some((channel, amplitude)) = req.reject.and_then(|r| r.check(&epoch)) {
            tracing::debug!(trial, channel = %rec.channels[rows[channel]].name, amplitude, "rejected epoch");
            status.push(TrialStatus::Rejected { channel, amplitude });
            continue;
        }

        data.slice_mut(s![slot, .., ..]).assign(&epoch);
        status.push(TrialStatus::Retained);
    }

    let epochs = Epochs {
        data,
        status,
        codes,
        trial_index: req.trials.clone().collect(),
        ch_names: rows.iter().map(|&r| rec.channels[r].name.clone()).collect(),
        times: req.window.times(sfreq),
    };
    let summary = epochs.summary();
    tracing::info!(
        trials = summary.total(),
        retained = summary.retained,
        rejected = summary.rejected,
        out_of_bounds = summary.out_of_bounds,
        no_response = summary.no_response,
        unlabeled = summary.unlabeled,
        "extracted epochs"
    );
    Ok(epochs)
}
