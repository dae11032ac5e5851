//! # erpbatch — batch ERP preprocessing for BioSemi recordings
//!
//! Turns a raw BDF recording plus its behavioural log into cleaned,
//! trial-segmented voltage matrices, one `(samples × trials)` matrix per
//! channel, for the Eriksen flanker, Go/NoGo and smoking-cue Go/NoGo
//! studies.  The DSP steps follow [MNE-Python](https://mne.tools) conventions.
//!
//! ## Pipeline overview
//!
//! ```text
//! <stem>.csv  +  <stem>.bdf
//!   │
//!   ├─ bdf::read_recording()    24-bit BDF reader, Status kept as trigger words
//!   ├─ markers::reconstruct()   onsets where s[i] − s[i+1] == −2, first N kept
//!   ├─ labeling::label_trials() condition code per trial from the log
//!   ├─ channel typing           EXG1 → EOG, EXG2..EXG8 → misc
//!   ├─ reference                average of all electrodes
//!   ├─ filter (FIR band-pass)   0.15–30 Hz, zero phase
//!   ├─ artifact (FastICA)       fit on EEG+EOG, decim 3, seed 23;
//!   │                           excluded components from the registry or prompt
//!   └─ epoch                    −0.2..0.8 s around (response-shifted) onsets,
//!        │                      baseline −0.2..0 s, 100 µV rejection
//!        └─→ export             <out>/<stem>.mat  or  <out>/<Cond>/<stem>_<Cond>.mat
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use erpbatch::{process_recording, BehavioralLog, Paradigm, PipelineConfig};
//! use erpbatch::exclusion::FixedExclusions;
//!
//! let cfg = PipelineConfig::for_paradigm(Paradigm::GoNoGo);
//! let rec = erpbatch::bdf::read_recording("p01.bdf", &cfg.channels.status, cfg.channels.status_mask).unwrap();
//! let log = BehavioralLog::load("p01.csv".as_ref()).unwrap();
//!
//! let mut resolver = FixedExclusions([0, 8].into_iter().collect());
//! let out = process_recording(rec, &log, "p01", &cfg, &mut resolver).unwrap();
//! println!("{:?}", out.epochs.summary());
//! ```

pub mod artifact;
pub mod baseline;
pub mod batch;
pub mod bdf;
pub mod behavior;
pub mod config;
pub mod epoch;
pub mod error;
pub mod exclusion;
pub mod export;
pub mod filter;
pub mod ica;
pub mod labeling;
pub mod logging;
pub mod markers;
pub mod recording;
pub mod reference;

use anyhow::{Context, Result};

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use artifact::{ArtifactRemover, ArtifactReport};
pub use behavior::BehavioralLog;
pub use config::{Paradigm, PipelineConfig};
pub use epoch::{extract_epochs, EpochRequest, EpochSummary, EpochWindow, Epochs, Rejection, TrialStatus};
pub use error::{classify, ErrorKind, PipelineError};
pub use exclusion::{ExclusionRegistry, ExclusionResolver, ExclusionSet};
pub use export::{ExportLayout, ExportTensor, OutputFormat, TensorWriter};
pub use filter::{FirBandpass, SignalFilter};
pub use ica::{Decomposer, FastIca, IcaModel};
pub use labeling::{label_trials, ConditionRule, Criterion};
pub use markers::{reconstruct, Marker, MarkerSet, TruncationPolicy};
pub use recording::{Channel, ChannelKind, ContinuousRecording};

/// Everything one participant run produced.
#[derive(Debug, Clone)]
pub struct ProcessedRecording {
    pub markers: MarkerSet,
    pub artifact: ArtifactReport,
    pub epochs: Epochs,
}

/// Run every processing stage on one recording.
///
/// # Pipeline steps
///
/// 1. Check the sampling rate against [`PipelineConfig::sfreq`].
/// 2. Reconstruct `expected_trials` onsets from the status channel.
/// 3. Label each trial from `log` with the paradigm's condition rules.
/// 4. Type the EOG and auxiliary electrodes.
/// 5. Average-reference every electrode.
/// 6. Band-pass filter.
/// 7. Fit ICA on EEG+EOG, resolve exclusions via `resolver`, subtract them.
/// 8. Cut epochs over the analysis range, re-anchored to the response when
///    the paradigm asks for it.
///
/// Alignment problems (steps 2–3) surface before any filtering or ICA work,
/// and before `resolver` is consulted.
pub fn process_recording<R>(
    mut rec: ContinuousRecording,
    log: &BehavioralLog,
    recording_id: &str,
    cfg: &PipelineConfig,
    resolver: &mut R,
) -> Result<ProcessedRecording>
where
    R: ExclusionResolver + ?Sized,
{
    // 1. Sampling rate.
    if (rec.sfreq - cfg.sfreq).abs() > 1e-6 {
        return Err(error::PipelineError::invalid_config(
            "sfreq",
            format!("recording is {} Hz, paradigm expects {} Hz", rec.sfreq, cfg.sfreq),
        )
        .into());
    }

    // 2. Markers.
    let status = rec.status()?.to_vec();
    let mut markers = markers::reconstruct(
        &status,
        cfg.trials.expected_trials,
        cfg.markers.step,
        cfg.markers.truncation,
    )?;
    drop(status);
    tracing::info!(recording = recording_id, trials = markers.len(), "reconstructed markers");

    // 3. Labels.
    labeling::label_trials(&mut markers, log, &cfg.trials.conditions)?;

    // 4. Channel types.
    for name in &cfg.channels.eog {
        rec.set_channel_kind(name, ChannelKind::Eog)?;
    }
    for name in &cfg.channels.misc {
        rec.set_channel_kind(name, ChannelKind::Misc)?;
    }

    // 5–6. Reference, filter.
    let rec = reference::average_reference(rec);
    let filter = FirBandpass::design(cfg.filter.l_freq, cfg.filter.h_freq, rec.sfreq);
    let rec = filter.apply(rec).context("band-pass filtering")?;

    // 7. Artifacts.
    let analysis_rows = rec.pick(&[ChannelKind::Eeg, ChannelKind::Eog], &[]);
    let ica = FastIca {
        n_components: cfg.ica.n_components,
        max_iter: cfg.ica.max_iter,
        tol: cfg.ica.tol,
        random_state: cfg.ica.random_state,
    };
    let (rec, artifact) =
        ArtifactRemover::new(&ica, resolver, cfg.ica.decim).run(rec, &analysis_rows, recording_id)?;

    // 8. Epochs.
    let rt_offsets = if cfg.trials.realign_to_response {
        Some(log.reaction_time_samples(&cfg.trials.response_column, rec.sfreq)?)
    } else {
        None
    };
    let req = EpochRequest {
        markers: &markers,
        trials: cfg.analysis_range(),
        rt_offsets: rt_offsets.as_deref(),
        window: cfg.epoch.window,
        reject: cfg.epoch.reject,
    };
    let epochs = extract_epochs(&rec, &analysis_rows, &req)?;

    Ok(ProcessedRecording { markers, artifact, epochs })
}
